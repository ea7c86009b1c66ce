//! Resource records: namespaces, objects, versions, upload jobs.
//!
//! These mirror the rows of the metadata database. Timestamps are kept as
//! RFC 3339 text, the database column format.

use serde::{Deserialize, Serialize};

use crate::acl::AclSet;
use crate::meta::ContentMetadata;
use crate::name::NamePath;

/// The kind a bound name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameKind {
    /// Interior node: container of child names.
    Namespace,
    /// Leaf node: holder of versions.
    Object,
}

impl NameKind {
    /// Lowercase label used in diagnostics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Object => "object",
        }
    }
}

// ---------------------------------------------------------------------------
// Namespace / Object
// ---------------------------------------------------------------------------

/// A namespace row.
#[derive(Debug, Clone)]
pub struct NamespaceRecord {
    /// Primary key.
    pub id: i64,
    /// Parent namespace id; `None` only for the root.
    pub parent_id: Option<i64>,
    /// Full resolved path.
    pub path: NamePath,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Tombstone timestamp; a deleted name is permanently reserved.
    pub deleted_at: Option<String>,
    /// ACL document.
    pub acls: AclSet,
}

impl NamespaceRecord {
    /// Whether this row is live (not tombstoned).
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// An object row.
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    /// Primary key.
    pub id: i64,
    /// Owning namespace id.
    pub namespace_id: i64,
    /// Full resolved path.
    pub path: NamePath,
    /// Current version row id, if the object has live content.
    pub current_version_id: Option<i64>,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Tombstone timestamp.
    pub deleted_at: Option<String>,
    /// ACL document.
    pub acls: AclSet,
}

impl ObjectRecord {
    /// Whether this row is live (not tombstoned).
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// A version row. Rows are created invisible (`version_key` unset,
/// tombstoned) while bytes stream to the backend, then completed.
#[derive(Debug, Clone)]
pub struct VersionRecord {
    /// Primary key; also the serial that orders concurrent updates.
    pub id: i64,
    /// Owning object id.
    pub object_id: i64,
    /// Full object path.
    pub path: NamePath,
    /// Client-visible version id; unset while the row is invisible.
    pub version_key: Option<String>,
    /// Content size in bytes.
    pub nbytes: Option<i64>,
    /// Content metadata fields.
    pub metadata: ContentMetadata,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Tombstone timestamp.
    pub deleted_at: Option<String>,
    /// ACL document.
    pub acls: AclSet,
    /// Aux record overriding storage addressing.
    pub aux: AuxRecord,
}

impl VersionRecord {
    /// Whether this row is live and client visible.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none() && self.version_key.is_some()
    }

    /// The versioned wire reference `<path>:<version>`.
    #[must_use]
    pub fn versioned_ref(&self) -> String {
        let version = self.version_key.as_deref().unwrap_or_default();
        format!("{}:{}", self.path.encoded(), version)
    }
}

// ---------------------------------------------------------------------------
// Aux record
// ---------------------------------------------------------------------------

/// Per-version JSON overriding default storage addressing, evaluated in
/// priority order: `rename_to`, then `url`, then the `hname`/`hversion`
/// overrides, then the backend-level `version`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuxRecord {
    /// `[name, version]` of a preferred version that supersedes this one
    /// and owns the backing storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename_to: Option<(String, String)>,

    /// Full URL of a remote Hatrac serving equivalent content; triggers an
    /// HTTP redirect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Override the name passed to the backend addressing function.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hname: Option<String>,

    /// Override the version passed to the backend addressing function.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hversion: Option<String>,

    /// Backend-level version id (e.g. the S3 version id in versioned
    /// buckets).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl AuxRecord {
    /// Whether every field is unset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Parse from the database column; `None`/empty text means no aux.
    pub fn from_column(text: Option<&str>) -> Result<Self, serde_json::Error> {
        match text {
            None | Some("") => Ok(Self::default()),
            Some(text) => serde_json::from_str(text),
        }
    }

    /// Render for the database column; empty records store as NULL.
    pub fn to_column(&self) -> Result<Option<String>, serde_json::Error> {
        if self.is_empty() {
            return Ok(None);
        }
        serde_json::to_string(self).map(Some)
    }
}

// ---------------------------------------------------------------------------
// Upload job
// ---------------------------------------------------------------------------

/// A chunked-upload job row. Jobs are transient: finalize and cancel both
/// remove the row, so a resolved job is always open.
#[derive(Debug, Clone)]
pub struct UploadRecord {
    /// Primary key.
    pub id: i64,
    /// Target object id.
    pub object_id: i64,
    /// Target object path.
    pub path: NamePath,
    /// Client-visible job key.
    pub job_key: String,
    /// Declared chunk size in bytes (> 0).
    pub chunk_length: i64,
    /// Declared total content size in bytes (>= 0).
    pub content_length: i64,
    /// Intended version metadata, captured verbatim at creation.
    pub metadata: ContentMetadata,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Roles allowed to operate on this job, in addition to object owners.
    pub owner: AclSet,
    /// Backend-specific handle (e.g. the S3 multipart upload id).
    pub backend_handle: String,
    /// Per-position chunk aux records reported by the backend.
    pub chunk_aux: std::collections::BTreeMap<i64, serde_json::Value>,
}

impl UploadRecord {
    /// Total number of chunks implied by the declared sizes.
    #[must_use]
    pub fn total_chunks(&self) -> i64 {
        if self.content_length == 0 {
            return 0;
        }
        (self.content_length + self.chunk_length - 1) / self.chunk_length
    }

    /// The expected size of the chunk at `position`.
    #[must_use]
    pub fn chunk_size_at(&self, position: i64) -> i64 {
        if position + 1 < self.total_chunks() {
            return self.chunk_length;
        }
        let tail = self.content_length % self.chunk_length;
        if tail == 0 { self.chunk_length } else { tail }
    }

    /// The job's wire reference `<path>;upload/<job>`.
    #[must_use]
    pub fn job_ref(&self) -> String {
        format!("{};upload/{}", self.path.encoded(), self.job_key)
    }
}
