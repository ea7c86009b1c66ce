//! Shared state and helpers for the request handlers.

use std::sync::Arc;

use hatrac_core::digest::md5_hex;
use hatrac_core::{ClientContext, HatracConfig, HatracError, HatracResult};
use hatrac_directory::authz::{Action, Authz};
use hatrac_directory::store::{Directory, NameDeletion, Resolved};
use hatrac_model::acl::AclSet;
use hatrac_model::name::NamePath;
use hatrac_model::resource::{ObjectRecord, VersionRecord};
use hatrac_storage::StorageBackend;
use tracing::warn;

/// The service provider: configuration, directory, and storage, shared by
/// every handler.
pub struct HatracProvider {
    config: Arc<HatracConfig>,
    directory: Directory,
    storage: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for HatracProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HatracProvider")
            .field("service_prefix", &self.config.service_prefix)
            .finish_non_exhaustive()
    }
}

impl HatracProvider {
    /// Assemble the provider.
    #[must_use]
    pub fn new(
        config: Arc<HatracConfig>,
        directory: Directory,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            config,
            directory,
            storage,
        }
    }

    /// Service configuration.
    #[must_use]
    pub fn config(&self) -> &HatracConfig {
        &self.config
    }

    /// The metadata directory.
    #[must_use]
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// The bulk storage backend.
    #[must_use]
    pub fn storage(&self) -> &dyn StorageBackend {
        self.storage.as_ref()
    }

    /// The authorization engine over this configuration.
    #[must_use]
    pub(crate) fn authz(&self) -> Authz<'_> {
        Authz::new(&self.config)
    }

    /// Absolute service location for a wire reference like `/ns/obj:V1`.
    #[must_use]
    pub(crate) fn location(&self, wire_ref: &str) -> String {
        let prefix = self.config.service_prefix.trim_end_matches('/');
        format!("{prefix}{wire_ref}")
    }

    /// Resolve a path that must be live; undefined and tombstoned names
    /// are both 404.
    pub(crate) async fn resolve_live(&self, path: &NamePath) -> HatracResult<Resolved> {
        self.directory
            .resolve(path)
            .await?
            .filter(Resolved::is_live)
            .ok_or_else(|| HatracError::not_found(format!("resource {path} not found")))
    }

    /// The current version of an object; an object with no live versions
    /// has no content, which is a conflict.
    pub(crate) async fn require_current_version(
        &self,
        object: &ObjectRecord,
    ) -> HatracResult<VersionRecord> {
        self.directory
            .get_current_version(object)
            .await?
            .ok_or_else(|| {
                HatracError::conflict(format!("object {} currently has no content", object.path))
            })
    }

    /// Resolve a specific live version of an object.
    pub(crate) async fn require_version(
        &self,
        object: &ObjectRecord,
        version_key: &str,
    ) -> HatracResult<VersionRecord> {
        self.directory
            .version_resolve(object, version_key)
            .await?
            .filter(VersionRecord::is_live)
            .ok_or_else(|| {
                HatracError::not_found(format!(
                    "object version {}:{version_key} not found",
                    object.path
                ))
            })
    }

    /// Best-effort storage cleanup after a committed name deletion.
    /// Versions backed by a rename target or a remote URL own no local
    /// bytes and are skipped.
    pub(crate) async fn cleanup_deletion(&self, path: &NamePath, deletion: &NameDeletion) {
        for version in &deletion.versions {
            self.cleanup_version(version).await;
        }
        self.cleanup_upload_handles(path, &deletion.upload_handles)
            .await;
    }

    /// Best-effort storage cleanup for one tombstoned version, honoring
    /// the aux addressing overrides the bytes were stored under.
    pub(crate) async fn cleanup_version(&self, version: &VersionRecord) {
        if version.aux.rename_to.is_some() || version.aux.url.is_some() {
            return;
        }
        let Some(key) = version.version_key.as_deref() else {
            return;
        };
        let name = match &version.aux.hname {
            Some(hname) => match NamePath::parse(hname) {
                Ok(name) => name,
                Err(e) => {
                    warn!(path = %version.path, error = %e, "corrupt hname aux; skipping cleanup");
                    return;
                }
            },
            None => version.path.clone(),
        };
        let backend_version = version.aux.hversion.as_deref().unwrap_or(key);
        match self.storage.delete(&name, backend_version, &version.aux).await {
            Ok(()) | Err(HatracError::NotFound(_)) => {}
            Err(e) => {
                warn!(path = %version.path, version = key, error = %e, "storage cleanup failed");
            }
        }
    }

    /// Best-effort backend cancellation for implicitly cancelled upload
    /// jobs.
    pub(crate) async fn cleanup_upload_handles(&self, path: &NamePath, handles: &[String]) {
        for handle in handles {
            if let Err(e) = self.storage.cancel_upload(path, handle).await {
                warn!(path = %path, handle, error = %e, "upload cancellation failed");
            }
        }
    }
}

/// The unquoted ETag value of an ACL document: a content hash over its
/// canonical JSON form.
#[must_use]
pub(crate) fn acl_tag(acls: &AclSet) -> String {
    let canonical = serde_json::to_string(acls).unwrap_or_default();
    md5_hex(canonical.as_bytes())
}

/// Sort-of-ETag for a listing body: a content hash of the rendered form.
#[must_use]
pub(crate) fn listing_tag(lines: &[String]) -> String {
    md5_hex(lines.join("\n").as_bytes())
}

/// Map an action denial onto a resource plus ancestor chain, as a
/// convenience for handlers.
pub(crate) fn enforce(
    provider: &HatracProvider,
    action: Action,
    resource: &AclSet,
    chain: &[AclSet],
    ctx: &ClientContext,
) -> HatracResult<()> {
    provider.authz().enforce(action, resource, chain, ctx)
}
