//! The transactional metadata store.
//!
//! Names resolve by walking segments from the root namespace; each segment
//! lookup uses the parent's row id so tree integrity cannot be bypassed.
//! Deleted rows stay behind as tombstones to enforce name non-reuse.
//!
//! Concurrent update ordering follows the version row serial: the highest
//! live version id is the current version of an object. Version rows are
//! created invisible while bytes stream to the storage backend and become
//! visible only when completed, so a crashed transfer never surfaces a
//! half-written version.
//!
//! Every write runs in a transaction. Retryable database conflicts (SQLite
//! busy/locked) replay the operation with exponential backoff up to
//! `database_max_retries`; they never surface to clients.

use std::collections::BTreeMap;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, trace};

use hatrac_core::digest::ContentDigests;
use hatrac_core::{ClientContext, HatracError, HatracResult};
use hatrac_model::acl::{Access, AclSet};
use hatrac_model::meta::{ContentMetadata, MetadataField};
use hatrac_model::name::NamePath;
use hatrac_model::resource::{
    AuxRecord, NameKind, NamespaceRecord, ObjectRecord, UploadRecord, VersionRecord,
};

use crate::authz::{Action, Authz};

/// Embedded schema, applied idempotently at connect time.
const SCHEMA: &str = include_str!("schema.sql");

/// Initial backoff before replaying a conflicted transaction.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(20);

type Tx = sqlx::Transaction<'static, sqlx::Sqlite>;

// ---------------------------------------------------------------------------
// Resolution results
// ---------------------------------------------------------------------------

/// The node a name resolved to.
#[derive(Debug, Clone)]
pub enum ResolvedNode {
    /// An interior namespace.
    Namespace(NamespaceRecord),
    /// An object leaf.
    Object(ObjectRecord),
}

/// A resolved name: the node plus the ACLs of its live ancestors,
/// root-first, for the authorization engine.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// The resolved node, possibly a tombstone.
    pub node: ResolvedNode,
    /// ACL documents of the ancestor namespaces, root first.
    pub ancestors: Vec<AclSet>,
}

impl Resolved {
    /// Whether the node is live (not tombstoned).
    #[must_use]
    pub fn is_live(&self) -> bool {
        match &self.node {
            ResolvedNode::Namespace(ns) => ns.is_live(),
            ResolvedNode::Object(obj) => obj.is_live(),
        }
    }

    /// The kind of the bound name.
    #[must_use]
    pub fn kind(&self) -> NameKind {
        match &self.node {
            ResolvedNode::Namespace(_) => NameKind::Namespace,
            ResolvedNode::Object(_) => NameKind::Object,
        }
    }

    /// The node's own ACL document.
    #[must_use]
    pub fn acls(&self) -> &AclSet {
        match &self.node {
            ResolvedNode::Namespace(ns) => &ns.acls,
            ResolvedNode::Object(obj) => &obj.acls,
        }
    }

    /// The node's full path.
    #[must_use]
    pub fn path(&self) -> &NamePath {
        match &self.node {
            ResolvedNode::Namespace(ns) => &ns.path,
            ResolvedNode::Object(obj) => &obj.path,
        }
    }

    /// The object record, when the name is bound as an object.
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRecord> {
        match &self.node {
            ResolvedNode::Object(obj) => Some(obj),
            ResolvedNode::Namespace(_) => None,
        }
    }

    /// The namespace record, when the name is bound as a namespace.
    #[must_use]
    pub fn as_namespace(&self) -> Option<&NamespaceRecord> {
        match &self.node {
            ResolvedNode::Namespace(ns) => Some(ns),
            ResolvedNode::Object(_) => None,
        }
    }

    /// Ancestor chain for authorizing a version under this object: the
    /// namespace chain plus the object's own ACLs.
    #[must_use]
    pub fn version_chain(&self) -> Vec<AclSet> {
        let mut chain = self.ancestors.clone();
        chain.push(self.acls().clone());
        chain
    }
}

/// Rows affected by a name deletion, for storage cleanup after commit.
#[derive(Debug, Default)]
pub struct NameDeletion {
    /// Live versions that were tombstoned.
    pub versions: Vec<VersionRecord>,
    /// Backend handles of upload jobs that were implicitly cancelled.
    pub upload_handles: Vec<String>,
}

/// Addressing for ACL updates.
#[derive(Debug, Clone, Copy)]
pub enum AclTarget {
    /// A namespace row id.
    Namespace(i64),
    /// An object row id.
    Object(i64),
    /// A version row id.
    Version(i64),
}

impl AclTarget {
    fn table(self) -> &'static str {
        match self {
            Self::Namespace(_) => "namespace",
            Self::Object(_) => "object",
            Self::Version(_) => "version",
        }
    }

    fn id(self) -> i64 {
        match self {
            Self::Namespace(id) | Self::Object(id) | Self::Version(id) => id,
        }
    }
}

/// An ACL mutation.
#[derive(Debug, Clone)]
pub enum AclUpdate<'a> {
    /// Replace the whole role list.
    Replace(Vec<String>),
    /// Clear the role list.
    Clear,
    /// Insert one role.
    AddEntry(&'a str),
    /// Remove one role; absent entries are a 404.
    RemoveEntry(&'a str),
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// The stateful Hatrac directory over a SQLite database.
#[derive(Debug, Clone)]
pub struct Directory {
    pool: SqlitePool,
    max_retries: u32,
}

impl Directory {
    /// Open the database, apply the schema, and make sure the root
    /// namespace exists.
    pub async fn connect(dsn: &str, max_retries: u32) -> HatracResult<Self> {
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(|e| db_err(e, "parse database dsn"))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        // In-memory databases exist per connection; pin the pool to a
        // single persistent connection so state survives.
        let in_memory = dsn.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| db_err(e, "connect database"))?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| db_err(e, "apply schema"))?;

        let directory = Self { pool, max_retries };
        directory.ensure_root().await?;
        debug!(dsn, "directory ready");
        Ok(directory)
    }

    /// Seed the root namespace row if missing.
    async fn ensure_root(&self) -> HatracResult<()> {
        let existing = sqlx::query("SELECT id FROM namespace WHERE parent_id IS NULL")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err(e, "lookup root"))?;
        if existing.is_none() {
            sqlx::query(
                "INSERT INTO namespace (parent_id, name, created_at, acls) VALUES (NULL, '/', ?, '{}')",
            )
            .bind(now())
            .execute(&self.pool)
            .await
            .map_err(|e| db_err(e, "seed root"))?;
        }
        Ok(())
    }

    /// Grant root-namespace ownership to the given administrative roles.
    /// This is the `deploy` step; it is idempotent.
    pub async fn deploy(&self, admin_roles: &[String]) -> HatracResult<()> {
        self.with_retry("deploy", || self.try_deploy(admin_roles)).await
    }

    async fn try_deploy(&self, admin_roles: &[String]) -> HatracResult<()> {
        let mut tx = self.begin().await?;
        let root = self.root_row_in(&mut tx).await?;
        let mut acls = root.acls;
        for role in admin_roles {
            acls.add_role(Access::Owner, role.clone());
        }
        write_acls(&mut tx, AclTarget::Namespace(root.id), &acls).await?;
        tx.commit().await.map_err(|e| db_err(e, "commit deploy"))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Resolve a path to its bound node, collecting ancestor ACLs on the
    /// way. Returns `None` for undefined names; tombstoned nodes resolve
    /// with their `deleted_at` set so callers can distinguish reuse
    /// conflicts from plain absence.
    pub async fn resolve(&self, path: &NamePath) -> HatracResult<Option<Resolved>> {
        let mut conn = self.acquire().await?;
        resolve_in(&mut conn, path).await
    }

    // -----------------------------------------------------------------------
    // Name lifecycle
    // -----------------------------------------------------------------------

    /// Bind a new name. With `parents`, missing ancestor namespaces are
    /// created too; authorization is evaluated at the nearest existing
    /// ancestor. Existing bindings and tombstones are conflicts.
    pub async fn create_name(
        &self,
        path: &NamePath,
        kind: NameKind,
        parents: bool,
        authz: &Authz<'_>,
        ctx: &ClientContext,
    ) -> HatracResult<Resolved> {
        if path.is_root() {
            return Err(HatracError::conflict("the root namespace already exists"));
        }
        self.with_retry("create_name", || {
            self.try_create_name(path, kind, parents, authz, ctx)
        })
        .await
    }

    async fn try_create_name(
        &self,
        path: &NamePath,
        kind: NameKind,
        parents: bool,
        authz: &Authz<'_>,
        ctx: &ClientContext,
    ) -> HatracResult<Resolved> {
        let mut tx = self.begin().await?;
        let root = self.root_row_in(&mut tx).await?;

        let segments = path.segments();
        let mut chain = vec![root.acls.clone()];
        let mut parent_id = root.id;
        let mut index = 0;

        // Descend through existing live namespaces.
        while index + 1 < segments.len() {
            let prefix = NamePath::from_segments(segments[..=index].to_vec());
            match lookup_namespace(&mut tx, parent_id, &segments[index], &prefix).await? {
                Some(ns) if ns.is_live() => {
                    parent_id = ns.id;
                    chain.push(ns.acls);
                    index += 1;
                }
                Some(_) => {
                    return Err(HatracError::conflict(format!(
                        "parent namespace {prefix} not available"
                    )));
                }
                None => {
                    if lookup_object(&mut tx, parent_id, &segments[index], &prefix)
                        .await?
                        .is_some()
                    {
                        return Err(HatracError::conflict(format!(
                            "parent {prefix} is not a namespace"
                        )));
                    }
                    if !parents {
                        return Err(HatracError::conflict(format!(
                            "parent namespace {prefix} not available"
                        )));
                    }
                    break;
                }
            }
        }

        // Authorize creation at the nearest existing ancestor.
        let (own, above) = chain.split_last().expect("chain contains the root");
        authz.enforce(Action::CreateName, own, above, ctx)?;

        let owner_acl = initial_acls(ctx);

        // Create any missing intermediate namespaces.
        while index + 1 < segments.len() {
            let prefix = NamePath::from_segments(segments[..=index].to_vec());
            check_name_free(&mut tx, parent_id, &segments[index], &prefix).await?;
            parent_id = insert_namespace(&mut tx, parent_id, &segments[index], &owner_acl).await?;
            chain.push(owner_acl.clone());
            index += 1;
        }

        // Bind the final segment.
        let leaf = &segments[segments.len() - 1];
        check_name_free(&mut tx, parent_id, leaf, path).await?;

        let node = match kind {
            NameKind::Namespace => {
                let id = insert_namespace(&mut tx, parent_id, leaf, &owner_acl).await?;
                ResolvedNode::Namespace(NamespaceRecord {
                    id,
                    parent_id: Some(parent_id),
                    path: path.clone(),
                    created_at: now(),
                    deleted_at: None,
                    acls: owner_acl.clone(),
                })
            }
            NameKind::Object => {
                let result = sqlx::query(
                    "INSERT INTO object (namespace_id, name, created_at, acls) VALUES (?, ?, ?, ?)",
                )
                .bind(parent_id)
                .bind(leaf)
                .bind(now())
                .bind(acls_json(&owner_acl)?)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_err(e, "insert object"))?;
                ResolvedNode::Object(ObjectRecord {
                    id: result.last_insert_rowid(),
                    namespace_id: parent_id,
                    path: path.clone(),
                    current_version_id: None,
                    created_at: now(),
                    deleted_at: None,
                    acls: owner_acl.clone(),
                })
            }
        };

        tx.commit().await.map_err(|e| db_err(e, "commit create"))?;
        debug!(path = %path, kind = kind.as_str(), "created name");
        Ok(Resolved {
            node,
            ancestors: chain,
        })
    }

    /// Tombstone a name. Namespaces must be empty; objects take all of
    /// their versions along and implicitly cancel open upload jobs.
    /// Returns what storage cleanup is owed after commit.
    pub async fn delete_name(
        &self,
        path: &NamePath,
        authz: &Authz<'_>,
        ctx: &ClientContext,
    ) -> HatracResult<NameDeletion> {
        if path.is_root() {
            return Err(HatracError::conflict("the root namespace cannot be deleted"));
        }
        self.with_retry("delete_name", || self.try_delete_name(path, authz, ctx))
            .await
    }

    async fn try_delete_name(
        &self,
        path: &NamePath,
        authz: &Authz<'_>,
        ctx: &ClientContext,
    ) -> HatracResult<NameDeletion> {
        let mut tx = self.begin().await?;
        let resolved = resolve_in(&mut tx, path)
            .await?
            .filter(Resolved::is_live)
            .ok_or_else(|| HatracError::not_found(format!("resource {path} not found")))?;

        authz.enforce(Action::Delete, resolved.acls(), &resolved.ancestors, ctx)?;

        let mut deletion = NameDeletion::default();
        match &resolved.node {
            ResolvedNode::Namespace(ns) => {
                let children: i64 = sqlx::query_scalar(
                    "SELECT (SELECT COUNT(*) FROM namespace WHERE parent_id = ? AND deleted_at IS NULL)
                          + (SELECT COUNT(*) FROM object WHERE namespace_id = ? AND deleted_at IS NULL)",
                )
                .bind(ns.id)
                .bind(ns.id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| db_err(e, "count children"))?;
                if children > 0 {
                    return Err(HatracError::conflict(format!(
                        "namespace {path} is not empty"
                    )));
                }
                sqlx::query("UPDATE namespace SET deleted_at = ? WHERE id = ?")
                    .bind(now())
                    .bind(ns.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| db_err(e, "delete namespace"))?;
            }
            ResolvedNode::Object(obj) => {
                let versions = fetch_versions(&mut tx, obj).await?;
                let version_chain = resolved.version_chain();
                for version in &versions {
                    authz.enforce(Action::Delete, &version.acls, &version_chain, ctx)?;
                }

                deletion.upload_handles =
                    sqlx::query("SELECT backend_handle FROM upload WHERE object_id = ?")
                        .bind(obj.id)
                        .fetch_all(&mut *tx)
                        .await
                        .map_err(|e| db_err(e, "list uploads"))?
                        .into_iter()
                        .map(|row| row.get::<String, _>("backend_handle"))
                        .collect();

                sqlx::query("DELETE FROM upload WHERE object_id = ?")
                    .bind(obj.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| db_err(e, "cancel uploads"))?;
                // Pending invisible versions never published a key; drop
                // them outright.
                sqlx::query("DELETE FROM version WHERE object_id = ? AND version_key IS NULL")
                    .bind(obj.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| db_err(e, "drop pending versions"))?;
                sqlx::query(
                    "UPDATE version SET deleted_at = ? WHERE object_id = ? AND deleted_at IS NULL",
                )
                .bind(now())
                .bind(obj.id)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_err(e, "delete versions"))?;
                sqlx::query(
                    "UPDATE object SET deleted_at = ?, current_version_id = NULL WHERE id = ?",
                )
                .bind(now())
                .bind(obj.id)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_err(e, "delete object"))?;

                deletion.versions = versions;
            }
        }

        tx.commit().await.map_err(|e| db_err(e, "commit delete"))?;
        debug!(path = %path, "deleted name");
        Ok(deletion)
    }

    /// List the live direct children of a namespace.
    pub async fn enumerate_children(
        &self,
        namespace: &NamespaceRecord,
    ) -> HatracResult<Vec<(NameKind, String)>> {
        let mut conn = self.acquire().await?;
        let mut children = Vec::new();
        let rows = sqlx::query(
            "SELECT name FROM namespace WHERE parent_id = ? AND deleted_at IS NULL ORDER BY name",
        )
        .bind(namespace.id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| db_err(e, "list namespaces"))?;
        for row in rows {
            children.push((NameKind::Namespace, row.get::<String, _>("name")));
        }
        let rows = sqlx::query(
            "SELECT name FROM object WHERE namespace_id = ? AND deleted_at IS NULL ORDER BY name",
        )
        .bind(namespace.id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| db_err(e, "list objects"))?;
        for row in rows {
            children.push((NameKind::Object, row.get::<String, _>("name")));
        }
        Ok(children)
    }

    // -----------------------------------------------------------------------
    // Version lifecycle
    // -----------------------------------------------------------------------

    /// Create an invisible version row recording an in-flight transfer.
    ///
    /// New versions of an existing object copy the previous current
    /// version's ACL grants (`previous_acls`); the requesting client
    /// joins the owners either way, which is also the whole document for
    /// an object's first version.
    pub async fn create_pending_version(
        &self,
        object: &ObjectRecord,
        metadata: &ContentMetadata,
        previous_acls: Option<&AclSet>,
        ctx: &ClientContext,
    ) -> HatracResult<i64> {
        self.with_retry("create_pending_version", || {
            self.try_create_pending_version(object, metadata, previous_acls, ctx)
        })
        .await
    }

    async fn try_create_pending_version(
        &self,
        object: &ObjectRecord,
        metadata: &ContentMetadata,
        previous_acls: Option<&AclSet>,
        ctx: &ClientContext,
    ) -> HatracResult<i64> {
        let mut tx = self.begin().await?;
        let mut acls = previous_acls.cloned().unwrap_or_default();
        if let Some(client) = &ctx.client {
            acls.add_role(Access::Owner, client.clone());
        }
        let id = insert_version(
            &mut tx,
            object.id,
            None,
            None,
            metadata,
            Some(now()),
            &acls,
            &AuxRecord::default(),
        )
        .await?;
        tx.commit().await.map_err(|e| db_err(e, "commit pending"))?;
        Ok(id)
    }

    /// Complete a pending version: publish its key, record size, digests,
    /// and aux, and advance the object's current pointer.
    pub async fn complete_version(
        &self,
        object: &ObjectRecord,
        version_id: i64,
        version_key: &str,
        nbytes: i64,
        digests: Option<&ContentDigests>,
        aux: &AuxRecord,
    ) -> HatracResult<VersionRecord> {
        self.with_retry("complete_version", || {
            self.try_complete_version(object, version_id, version_key, nbytes, digests, aux)
        })
        .await
    }

    async fn try_complete_version(
        &self,
        object: &ObjectRecord,
        version_id: i64,
        version_key: &str,
        nbytes: i64,
        digests: Option<&ContentDigests>,
        aux: &AuxRecord,
    ) -> HatracResult<VersionRecord> {
        let mut tx = self.begin().await?;
        sqlx::query(
            "UPDATE version SET version_key = ?, nbytes = ?,
                    content_md5 = COALESCE(content_md5, ?),
                    content_sha256 = COALESCE(content_sha256, ?),
                    aux = ?, deleted_at = NULL
             WHERE id = ?",
        )
        .bind(version_key)
        .bind(nbytes)
        .bind(digests.map(|d| d.md5_b64.clone()))
        .bind(digests.map(|d| d.sha256_b64.clone()))
        .bind(aux.to_column().map_err(json_err)?)
        .bind(version_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err(e, "complete version"))?;

        sqlx::query("UPDATE object SET current_version_id = ? WHERE id = ?")
            .bind(version_id)
            .bind(object.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(e, "advance current pointer"))?;

        let record = fetch_version_by_id(&mut tx, version_id, &object.path)
            .await?
            .ok_or_else(|| internal("completed version row vanished"))?;
        tx.commit().await.map_err(|e| db_err(e, "commit complete"))?;
        trace!(path = %object.path, version = version_key, "completed version");
        Ok(record)
    }

    /// Drop an invisible version row after a failed transfer. The key was
    /// never published, so no tombstone is needed.
    pub async fn abort_pending_version(&self, version_id: i64) -> HatracResult<()> {
        self.with_retry("abort_pending_version", || {
            self.try_abort_pending_version(version_id)
        })
        .await
    }

    async fn try_abort_pending_version(&self, version_id: i64) -> HatracResult<()> {
        sqlx::query("DELETE FROM version WHERE id = ? AND version_key IS NULL")
            .bind(version_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err(e, "abort pending version"))?;
        Ok(())
    }

    /// The current (highest live serial) version of an object.
    pub async fn get_current_version(
        &self,
        object: &ObjectRecord,
    ) -> HatracResult<Option<VersionRecord>> {
        let mut conn = self.acquire().await?;
        let row = sqlx::query(
            "SELECT * FROM version
             WHERE object_id = ? AND deleted_at IS NULL AND version_key IS NOT NULL
             ORDER BY id DESC LIMIT 1",
        )
        .bind(object.id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_err(e, "current version"))?;
        row.map(|row| version_from_row(&row, &object.path)).transpose()
    }

    /// Resolve a specific version of an object by its client-visible key.
    pub async fn version_resolve(
        &self,
        object: &ObjectRecord,
        version_key: &str,
    ) -> HatracResult<Option<VersionRecord>> {
        let mut conn = self.acquire().await?;
        let row = sqlx::query("SELECT * FROM version WHERE object_id = ? AND version_key = ?")
            .bind(object.id)
            .bind(version_key)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| db_err(e, "version lookup"))?;
        row.map(|row| version_from_row(&row, &object.path)).transpose()
    }

    /// List the live versions of an object, oldest first.
    pub async fn enumerate_versions(
        &self,
        object: &ObjectRecord,
    ) -> HatracResult<Vec<VersionRecord>> {
        let mut conn = self.acquire().await?;
        fetch_versions(&mut conn, object).await
    }

    /// Tombstone one version. If it was current, the most recent remaining
    /// live version becomes current.
    pub async fn delete_version(&self, version: &VersionRecord) -> HatracResult<()> {
        self.with_retry("delete_version", || self.try_delete_version(version))
            .await
    }

    async fn try_delete_version(&self, version: &VersionRecord) -> HatracResult<()> {
        let mut tx = self.begin().await?;
        sqlx::query("UPDATE version SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(now())
            .bind(version.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(e, "delete version"))?;
        sqlx::query(
            "UPDATE object SET current_version_id =
                 (SELECT id FROM version
                  WHERE object_id = ? AND deleted_at IS NULL AND version_key IS NOT NULL
                  ORDER BY id DESC LIMIT 1)
             WHERE id = ?",
        )
        .bind(version.object_id)
        .bind(version.object_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err(e, "retarget current pointer"))?;
        tx.commit()
            .await
            .map_err(|e| db_err(e, "commit version delete"))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // ACLs
    // -----------------------------------------------------------------------

    /// Apply an ACL mutation and return the resource's new ACL document.
    pub async fn update_acl(
        &self,
        target: AclTarget,
        access: Access,
        update: AclUpdate<'_>,
    ) -> HatracResult<AclSet> {
        self.with_retry("update_acl", || {
            self.try_update_acl(target, access, update.clone())
        })
        .await
    }

    async fn try_update_acl(
        &self,
        target: AclTarget,
        access: Access,
        update: AclUpdate<'_>,
    ) -> HatracResult<AclSet> {
        let mut tx = self.begin().await?;
        let mut acls = read_acls(&mut tx, target).await?;

        match &update {
            AclUpdate::Replace(roles) => acls.set(access, roles.iter().cloned()),
            AclUpdate::Clear => acls.clear(access),
            AclUpdate::AddEntry(role) => acls.add_role(access, (*role).to_owned()),
            AclUpdate::RemoveEntry(role) => {
                if !acls.remove_role(access, role) {
                    return Err(HatracError::not_found(format!(
                        "ACL member {access}/{role} not found"
                    )));
                }
            }
        }

        write_acls(&mut tx, target, &acls).await?;
        tx.commit().await.map_err(|e| db_err(e, "commit acl"))?;
        Ok(acls)
    }

    // -----------------------------------------------------------------------
    // Metadata
    // -----------------------------------------------------------------------

    /// Set or clear one metadata field of a version. Digest fields are
    /// immutable once set; conflicting rewrites and deletions fail.
    pub async fn set_metadata_field(
        &self,
        version_id: i64,
        field: MetadataField,
        value: Option<String>,
    ) -> HatracResult<ContentMetadata> {
        self.with_retry("set_metadata_field", || {
            self.try_set_metadata_field(version_id, field, value.clone())
        })
        .await
    }

    async fn try_set_metadata_field(
        &self,
        version_id: i64,
        field: MetadataField,
        value: Option<String>,
    ) -> HatracResult<ContentMetadata> {
        let mut tx = self.begin().await?;
        let row = sqlx::query(
            "SELECT content_type, content_md5, content_sha256, content_disposition
             FROM version WHERE id = ?",
        )
        .bind(version_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_err(e, "read metadata"))?
        .ok_or_else(|| HatracError::not_found("version not found"))?;

        let mut metadata = metadata_from_row(&row)?;
        if !field.is_mutable() {
            match (metadata.get(field), value.as_deref()) {
                (Some(existing), Some(new)) if existing != new => {
                    return Err(HatracError::conflict(format!(
                        "metadata field {field} is immutable once set"
                    )));
                }
                (Some(_), None) => {
                    return Err(HatracError::conflict(format!(
                        "metadata field {field} cannot be removed"
                    )));
                }
                _ => {}
            }
        }
        metadata.set(field, value.clone());

        let sql = match field {
            MetadataField::ContentType => "UPDATE version SET content_type = ? WHERE id = ?",
            MetadataField::ContentMd5 => "UPDATE version SET content_md5 = ? WHERE id = ?",
            MetadataField::ContentSha256 => "UPDATE version SET content_sha256 = ? WHERE id = ?",
            MetadataField::ContentDisposition => {
                "UPDATE version SET content_disposition = ? WHERE id = ?"
            }
        };
        sqlx::query(sql)
            .bind(value)
            .bind(version_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(e, "write metadata"))?;
        tx.commit().await.map_err(|e| db_err(e, "commit metadata"))?;
        Ok(metadata)
    }

    // -----------------------------------------------------------------------
    // Upload jobs
    // -----------------------------------------------------------------------

    /// Record a new chunked-upload job.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_upload(
        &self,
        object: &ObjectRecord,
        job_key: &str,
        chunk_length: i64,
        content_length: i64,
        metadata: &ContentMetadata,
        backend_handle: &str,
        ctx: &ClientContext,
    ) -> HatracResult<UploadRecord> {
        let owner = initial_acls(ctx);
        self.with_retry("create_upload", || {
            self.try_create_upload(
                object,
                job_key,
                chunk_length,
                content_length,
                metadata,
                backend_handle,
                owner.clone(),
            )
        })
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn try_create_upload(
        &self,
        object: &ObjectRecord,
        job_key: &str,
        chunk_length: i64,
        content_length: i64,
        metadata: &ContentMetadata,
        backend_handle: &str,
        owner: AclSet,
    ) -> HatracResult<UploadRecord> {
        let mut tx = self.begin().await?;
        let created_at = now();
        let result = sqlx::query(
            "INSERT INTO upload
             (object_id, job_key, chunk_length, content_length, metadata, created_at, owner, backend_handle)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(object.id)
        .bind(job_key)
        .bind(chunk_length)
        .bind(content_length)
        .bind(serde_json::to_string(metadata).map_err(json_err)?)
        .bind(&created_at)
        .bind(acls_json(&owner)?)
        .bind(backend_handle)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err(e, "insert upload"))?;
        tx.commit().await.map_err(|e| db_err(e, "commit upload"))?;

        Ok(UploadRecord {
            id: result.last_insert_rowid(),
            object_id: object.id,
            path: object.path.clone(),
            job_key: job_key.to_owned(),
            chunk_length,
            content_length,
            metadata: metadata.clone(),
            created_at,
            owner,
            backend_handle: backend_handle.to_owned(),
            chunk_aux: BTreeMap::new(),
        })
    }

    /// Resolve an open upload job by its key.
    pub async fn upload_resolve(
        &self,
        object: &ObjectRecord,
        job_key: &str,
    ) -> HatracResult<Option<UploadRecord>> {
        let mut conn = self.acquire().await?;
        let row = sqlx::query("SELECT * FROM upload WHERE object_id = ? AND job_key = ?")
            .bind(object.id)
            .bind(job_key)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| db_err(e, "upload lookup"))?;
        row.map(|row| upload_from_row(&row, &object.path)).transpose()
    }

    /// List the open upload jobs of an object.
    pub async fn enumerate_uploads(
        &self,
        object: &ObjectRecord,
    ) -> HatracResult<Vec<UploadRecord>> {
        let mut conn = self.acquire().await?;
        let rows = sqlx::query("SELECT * FROM upload WHERE object_id = ? ORDER BY id")
            .bind(object.id)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| db_err(e, "list uploads"))?;
        rows.iter()
            .map(|row| upload_from_row(row, &object.path))
            .collect()
    }

    /// Record the backend aux for one uploaded chunk. Retransmissions
    /// replace the previous record.
    pub async fn record_chunk(
        &self,
        upload_id: i64,
        position: i64,
        aux: serde_json::Value,
    ) -> HatracResult<()> {
        self.with_retry("record_chunk", || {
            self.try_record_chunk(upload_id, position, aux.clone())
        })
        .await
    }

    async fn try_record_chunk(
        &self,
        upload_id: i64,
        position: i64,
        aux: serde_json::Value,
    ) -> HatracResult<()> {
        let mut tx = self.begin().await?;
        let row = sqlx::query("SELECT chunk_aux FROM upload WHERE id = ?")
            .bind(upload_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_err(e, "read chunk aux"))?
            .ok_or_else(|| HatracError::not_found("upload not available"))?;

        let mut chunk_aux: BTreeMap<i64, serde_json::Value> =
            serde_json::from_str(&row.get::<String, _>("chunk_aux")).map_err(json_err)?;
        chunk_aux.insert(position, aux);

        sqlx::query("UPDATE upload SET chunk_aux = ? WHERE id = ?")
            .bind(serde_json::to_string(&chunk_aux).map_err(json_err)?)
            .bind(upload_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(e, "write chunk aux"))?;
        tx.commit().await.map_err(|e| db_err(e, "commit chunk"))?;
        Ok(())
    }

    /// Finalize an upload job: atomically create the new visible version,
    /// advance the current pointer, and remove the job row. A second
    /// finalization finds no job and reports 404.
    pub async fn finalize_upload(
        &self,
        upload: &UploadRecord,
        version_key: &str,
        digests: Option<&ContentDigests>,
        aux: &AuxRecord,
    ) -> HatracResult<VersionRecord> {
        self.with_retry("finalize_upload", || {
            self.try_finalize_upload(upload, version_key, digests, aux)
        })
        .await
    }

    async fn try_finalize_upload(
        &self,
        upload: &UploadRecord,
        version_key: &str,
        digests: Option<&ContentDigests>,
        aux: &AuxRecord,
    ) -> HatracResult<VersionRecord> {
        let mut tx = self.begin().await?;

        // Re-test under the transaction: exactly one finalization wins.
        let still_open: Option<SqliteRow> = sqlx::query("SELECT id FROM upload WHERE id = ?")
            .bind(upload.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_err(e, "upload recheck"))?;
        if still_open.is_none() {
            return Err(HatracError::not_found(format!(
                "upload {} not available",
                upload.job_key
            )));
        }

        let mut metadata = upload.metadata.clone();
        if let Some(digests) = digests {
            if metadata.content_md5.is_none() {
                metadata.content_md5 = Some(digests.md5_b64.clone());
            }
            if metadata.content_sha256.is_none() {
                metadata.content_sha256 = Some(digests.sha256_b64.clone());
            }
        }

        let version_id = insert_version(
            &mut tx,
            upload.object_id,
            Some(version_key),
            Some(upload.content_length),
            &metadata,
            None,
            &upload.owner,
            aux,
        )
        .await?;

        sqlx::query("UPDATE object SET current_version_id = ? WHERE id = ?")
            .bind(version_id)
            .bind(upload.object_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(e, "advance current pointer"))?;

        sqlx::query("DELETE FROM upload WHERE id = ?")
            .bind(upload.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(e, "remove upload"))?;

        let record = fetch_version_by_id(&mut tx, version_id, &upload.path)
            .await?
            .ok_or_else(|| internal("finalized version row vanished"))?;
        tx.commit().await.map_err(|e| db_err(e, "commit finalize"))?;
        debug!(path = %upload.path, job = %upload.job_key, version = version_key, "finalized upload");
        Ok(record)
    }

    /// Remove a cancelled upload job row.
    pub async fn cancel_upload(&self, upload_id: i64) -> HatracResult<()> {
        self.with_retry("cancel_upload", || self.try_cancel_upload(upload_id))
            .await
    }

    async fn try_cancel_upload(&self, upload_id: i64) -> HatracResult<()> {
        sqlx::query("DELETE FROM upload WHERE id = ?")
            .bind(upload_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err(e, "cancel upload"))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Migration support
    // -----------------------------------------------------------------------

    /// Every live version in the directory, with reconstructed paths.
    /// Used by the migration tool to traverse link targets.
    pub async fn list_live_versions(&self) -> HatracResult<Vec<VersionRecord>> {
        let mut conn = self.acquire().await?;
        let rows = sqlx::query(
            "SELECT * FROM version WHERE deleted_at IS NULL AND version_key IS NOT NULL ORDER BY id",
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| db_err(e, "list versions"))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let object_id: i64 = row.get("object_id");
            let path = object_path(&mut conn, object_id).await?;
            records.push(version_from_row(&row, &path)?);
        }
        Ok(records)
    }

    /// Replace the aux record of a version.
    pub async fn update_version_aux(&self, version_id: i64, aux: &AuxRecord) -> HatracResult<()> {
        self.with_retry("update_version_aux", || {
            self.try_update_version_aux(version_id, aux)
        })
        .await
    }

    async fn try_update_version_aux(&self, version_id: i64, aux: &AuxRecord) -> HatracResult<()> {
        sqlx::query("UPDATE version SET aux = ? WHERE id = ?")
            .bind(aux.to_column().map_err(json_err)?)
            .bind(version_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err(e, "update aux"))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    async fn begin(&self) -> HatracResult<Tx> {
        self.pool.begin().await.map_err(|e| db_err(e, "begin"))
    }

    async fn acquire(&self) -> HatracResult<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.pool.acquire().await.map_err(|e| db_err(e, "acquire"))
    }

    async fn root_row_in(&self, tx: &mut Tx) -> HatracResult<NamespaceRecord> {
        root_row(&mut *tx).await
    }

    /// Replay `f` on retryable database conflicts with exponential
    /// backoff.
    async fn with_retry<T, Fut, F>(&self, op: &'static str, mut f: F) -> HatracResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = HatracResult<T>>,
    {
        let mut delay = RETRY_BASE_DELAY;
        let mut attempt = 0u32;
        loop {
            match f().await {
                Err(err) if attempt < self.max_retries && is_retryable(&err) => {
                    attempt += 1;
                    debug!(op, attempt, "retrying after database conflict");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                other => return other,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Free helpers
// ---------------------------------------------------------------------------

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn db_err(err: sqlx::Error, what: &'static str) -> HatracError {
    HatracError::Internal(anyhow::Error::new(err).context(what))
}

fn json_err(err: serde_json::Error) -> HatracError {
    HatracError::Internal(anyhow::Error::new(err).context("corrupt column"))
}

fn internal(message: &'static str) -> HatracError {
    HatracError::Internal(anyhow::anyhow!(message))
}

/// Whether an error is a transient database conflict worth replaying.
fn is_retryable(err: &HatracError) -> bool {
    let HatracError::Internal(inner) = err else {
        return false;
    };
    let Some(db) = inner.downcast_ref::<sqlx::Error>() else {
        return false;
    };
    match db {
        sqlx::Error::Database(e) => {
            // SQLITE_BUSY (5) / SQLITE_LOCKED (6) and their extended codes.
            matches!(e.code().as_deref(), Some("5" | "6" | "261" | "262" | "517"))
                || e.message().contains("database is locked")
                || e.message().contains("database table is locked")
        }
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

fn initial_acls(ctx: &ClientContext) -> AclSet {
    match &ctx.client {
        Some(client) => AclSet::owned_by(client.clone()),
        None => AclSet::new(),
    }
}

fn acls_json(acls: &AclSet) -> HatracResult<String> {
    serde_json::to_string(acls).map_err(json_err)
}

fn parse_acls(text: &str) -> HatracResult<AclSet> {
    serde_json::from_str(text).map_err(json_err)
}

fn namespace_from_row(row: &SqliteRow, path: &NamePath) -> HatracResult<NamespaceRecord> {
    Ok(NamespaceRecord {
        id: row.get("id"),
        parent_id: row.get("parent_id"),
        path: path.clone(),
        created_at: row.get("created_at"),
        deleted_at: row.get("deleted_at"),
        acls: parse_acls(&row.get::<String, _>("acls"))?,
    })
}

fn object_from_row(row: &SqliteRow, path: &NamePath) -> HatracResult<ObjectRecord> {
    Ok(ObjectRecord {
        id: row.get("id"),
        namespace_id: row.get("namespace_id"),
        path: path.clone(),
        current_version_id: row.get("current_version_id"),
        created_at: row.get("created_at"),
        deleted_at: row.get("deleted_at"),
        acls: parse_acls(&row.get::<String, _>("acls"))?,
    })
}

fn metadata_from_row(row: &SqliteRow) -> HatracResult<ContentMetadata> {
    Ok(ContentMetadata {
        content_type: row.get("content_type"),
        content_md5: row.get("content_md5"),
        content_sha256: row.get("content_sha256"),
        content_disposition: row.get("content_disposition"),
    })
}

fn version_from_row(row: &SqliteRow, path: &NamePath) -> HatracResult<VersionRecord> {
    Ok(VersionRecord {
        id: row.get("id"),
        object_id: row.get("object_id"),
        path: path.clone(),
        version_key: row.get("version_key"),
        nbytes: row.get("nbytes"),
        metadata: metadata_from_row(row)?,
        created_at: row.get("created_at"),
        deleted_at: row.get("deleted_at"),
        acls: parse_acls(&row.get::<String, _>("acls"))?,
        aux: AuxRecord::from_column(row.get::<Option<String>, _>("aux").as_deref())
            .map_err(json_err)?,
    })
}

fn upload_from_row(row: &SqliteRow, path: &NamePath) -> HatracResult<UploadRecord> {
    Ok(UploadRecord {
        id: row.get("id"),
        object_id: row.get("object_id"),
        path: path.clone(),
        job_key: row.get("job_key"),
        chunk_length: row.get("chunk_length"),
        content_length: row.get("content_length"),
        metadata: serde_json::from_str(&row.get::<String, _>("metadata")).map_err(json_err)?,
        created_at: row.get("created_at"),
        owner: parse_acls(&row.get::<String, _>("owner"))?,
        backend_handle: row.get("backend_handle"),
        chunk_aux: serde_json::from_str(&row.get::<String, _>("chunk_aux")).map_err(json_err)?,
    })
}

async fn root_row(conn: &mut SqliteConnection) -> HatracResult<NamespaceRecord> {
    let row = sqlx::query("SELECT * FROM namespace WHERE parent_id IS NULL")
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_err(e, "root lookup"))?
        .ok_or_else(|| internal("root namespace missing; run deploy"))?;
    namespace_from_row(&row, &NamePath::root())
}

async fn resolve_in(
    conn: &mut SqliteConnection,
    path: &NamePath,
) -> HatracResult<Option<Resolved>> {
    let root = root_row(&mut *conn).await?;
    if path.is_root() {
        return Ok(Some(Resolved {
            node: ResolvedNode::Namespace(root),
            ancestors: Vec::new(),
        }));
    }

    let segments = path.segments();
    let mut ancestors = vec![root.acls.clone()];
    let mut parent_id = root.id;

    for (index, segment) in segments.iter().enumerate() {
        let last = index + 1 == segments.len();
        let prefix = NamePath::from_segments(segments[..=index].to_vec());

        if let Some(ns) = lookup_namespace(&mut *conn, parent_id, segment, &prefix).await? {
            if last {
                return Ok(Some(Resolved {
                    node: ResolvedNode::Namespace(ns),
                    ancestors,
                }));
            }
            if !ns.is_live() {
                return Ok(None);
            }
            parent_id = ns.id;
            ancestors.push(ns.acls);
            continue;
        }

        if last {
            if let Some(obj) = lookup_object(&mut *conn, parent_id, segment, &prefix).await? {
                return Ok(Some(Resolved {
                    node: ResolvedNode::Object(obj),
                    ancestors,
                }));
            }
        }
        return Ok(None);
    }

    unreachable!("segment loop returns for the final segment")
}

async fn lookup_namespace(
    conn: &mut SqliteConnection,
    parent_id: i64,
    name: &str,
    path: &NamePath,
) -> HatracResult<Option<NamespaceRecord>> {
    let row = sqlx::query("SELECT * FROM namespace WHERE parent_id = ? AND name = ?")
        .bind(parent_id)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_err(e, "namespace lookup"))?;
    row.map(|row| namespace_from_row(&row, path)).transpose()
}

async fn lookup_object(
    conn: &mut SqliteConnection,
    namespace_id: i64,
    name: &str,
    path: &NamePath,
) -> HatracResult<Option<ObjectRecord>> {
    let row = sqlx::query("SELECT * FROM object WHERE namespace_id = ? AND name = ?")
        .bind(namespace_id)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_err(e, "object lookup"))?;
    row.map(|row| object_from_row(&row, path)).transpose()
}

/// A name may be bound once, ever: live bindings and tombstones of either
/// kind block re-creation.
async fn check_name_free(
    conn: &mut SqliteConnection,
    parent_id: i64,
    name: &str,
    path: &NamePath,
) -> HatracResult<()> {
    if let Some(ns) = lookup_namespace(&mut *conn, parent_id, name, path).await? {
        return Err(if ns.is_live() {
            HatracError::conflict(format!("name {path} already in use"))
        } else {
            HatracError::conflict(format!("name {path} was deleted and cannot be reused"))
        });
    }
    if let Some(obj) = lookup_object(&mut *conn, parent_id, name, path).await? {
        return Err(if obj.is_live() {
            HatracError::conflict(format!("name {path} already in use"))
        } else {
            HatracError::conflict(format!("name {path} was deleted and cannot be reused"))
        });
    }
    Ok(())
}

async fn insert_namespace(
    conn: &mut SqliteConnection,
    parent_id: i64,
    name: &str,
    acls: &AclSet,
) -> HatracResult<i64> {
    let result =
        sqlx::query("INSERT INTO namespace (parent_id, name, created_at, acls) VALUES (?, ?, ?, ?)")
            .bind(parent_id)
            .bind(name)
            .bind(now())
            .bind(acls_json(acls)?)
            .execute(&mut *conn)
            .await
            .map_err(|e| db_err(e, "insert namespace"))?;
    Ok(result.last_insert_rowid())
}

#[allow(clippy::too_many_arguments)]
async fn insert_version(
    conn: &mut SqliteConnection,
    object_id: i64,
    version_key: Option<&str>,
    nbytes: Option<i64>,
    metadata: &ContentMetadata,
    deleted_at: Option<String>,
    acls: &AclSet,
    aux: &AuxRecord,
) -> HatracResult<i64> {
    let result = sqlx::query(
        "INSERT INTO version
         (object_id, version_key, nbytes, content_type, content_md5, content_sha256,
          content_disposition, created_at, deleted_at, acls, aux)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(object_id)
    .bind(version_key)
    .bind(nbytes)
    .bind(&metadata.content_type)
    .bind(&metadata.content_md5)
    .bind(&metadata.content_sha256)
    .bind(&metadata.content_disposition)
    .bind(now())
    .bind(deleted_at)
    .bind(acls_json(acls)?)
    .bind(aux.to_column().map_err(json_err)?)
    .execute(&mut *conn)
    .await
    .map_err(|e| db_err(e, "insert version"))?;
    Ok(result.last_insert_rowid())
}

async fn fetch_version_by_id(
    conn: &mut SqliteConnection,
    version_id: i64,
    path: &NamePath,
) -> HatracResult<Option<VersionRecord>> {
    let row = sqlx::query("SELECT * FROM version WHERE id = ?")
        .bind(version_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_err(e, "version by id"))?;
    row.map(|row| version_from_row(&row, path)).transpose()
}

async fn fetch_versions(
    conn: &mut SqliteConnection,
    object: &ObjectRecord,
) -> HatracResult<Vec<VersionRecord>> {
    let rows = sqlx::query(
        "SELECT * FROM version
         WHERE object_id = ? AND deleted_at IS NULL AND version_key IS NOT NULL
         ORDER BY id",
    )
    .bind(object.id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| db_err(e, "list versions"))?;
    rows.iter()
        .map(|row| version_from_row(row, &object.path))
        .collect()
}

async fn read_acls(conn: &mut SqliteConnection, target: AclTarget) -> HatracResult<AclSet> {
    let sql = format!("SELECT acls FROM {} WHERE id = ?", target.table());
    let row = sqlx::query(&sql)
        .bind(target.id())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_err(e, "read acls"))?
        .ok_or_else(|| HatracError::not_found("resource not found"))?;
    parse_acls(&row.get::<String, _>("acls"))
}

async fn write_acls(
    conn: &mut SqliteConnection,
    target: AclTarget,
    acls: &AclSet,
) -> HatracResult<()> {
    let sql = format!("UPDATE {} SET acls = ? WHERE id = ?", target.table());
    sqlx::query(&sql)
        .bind(acls_json(acls)?)
        .bind(target.id())
        .execute(&mut *conn)
        .await
        .map_err(|e| db_err(e, "write acls"))?;
    Ok(())
}

/// Reconstruct the full path of an object by climbing the namespace tree.
async fn object_path(conn: &mut SqliteConnection, object_id: i64) -> HatracResult<NamePath> {
    let row = sqlx::query("SELECT name, namespace_id FROM object WHERE id = ?")
        .bind(object_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_err(e, "object by id"))?
        .ok_or_else(|| internal("version references missing object"))?;

    let mut segments = vec![row.get::<String, _>("name")];
    let mut cursor: Option<i64> = Some(row.get("namespace_id"));
    while let Some(id) = cursor {
        let row = sqlx::query("SELECT name, parent_id FROM namespace WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| db_err(e, "namespace by id"))?
            .ok_or_else(|| internal("broken namespace chain"))?;
        cursor = row.get("parent_id");
        if cursor.is_some() {
            segments.push(row.get::<String, _>("name"));
        }
    }
    segments.reverse();
    Ok(NamePath::from_segments(segments))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
