//! Service configuration for Hatrac.
//!
//! Configuration is a single JSON document, by convention
//! `hatrac_config.json` in the working directory; the `HATRAC_CONFIG`
//! environment variable overrides the path. All configuration is immutable
//! after load: handlers read from a shared value and there are no
//! reloadable singletons.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{HatracError, HatracResult};

/// Default maximum request payload size: 128 MiB.
const DEFAULT_MAX_PAYLOAD: u64 = 128 * 1024 * 1024;

/// Default presigned URL lifetime in seconds.
const DEFAULT_PRESIGN_EXPIRATION: u64 = 300;

fn default_service_prefix() -> String {
    "/hatrac".to_owned()
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_database_dsn() -> String {
    "sqlite://hatrac.db".to_owned()
}

fn default_max_retries() -> u32 {
    5
}

fn default_url_char_class() -> String {
    "-._~".to_owned()
}

fn default_max_payload() -> u64 {
    DEFAULT_MAX_PAYLOAD
}

fn default_storage_path() -> String {
    "/var/www/hatrac".to_owned()
}

fn default_presign_expiration() -> u64 {
    DEFAULT_PRESIGN_EXPIRATION
}

// ---------------------------------------------------------------------------
// HatracConfig
// ---------------------------------------------------------------------------

/// Global configuration for the Hatrac service. Unknown keys are ignored
/// so deployments can carry adapter-specific sections in the same file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HatracConfig {
    /// Base path under which all resources live.
    #[serde(default = "default_service_prefix")]
    pub service_prefix: String,

    /// Bind address for the HTTP listener.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Log level filter (overridden by `RUST_LOG`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Database connection string (SQLite URL).
    #[serde(default = "default_database_dsn")]
    pub database_dsn: String,

    /// Maximum replays of a request transaction on a retryable database
    /// conflict.
    #[serde(default = "default_max_retries")]
    pub database_max_retries: u32,

    /// Punctuation characters allowed unescaped in name segments, in
    /// addition to ASCII alphanumerics. Everything else must be
    /// percent-encoded.
    #[serde(default = "default_url_char_class")]
    pub allowed_url_char_class: String,

    /// Upper bound on request payload size in bytes.
    #[serde(default = "default_max_payload")]
    pub max_request_payload_size: u64,

    /// Service-wide firewall ACLs, applied in addition to resource ACLs.
    #[serde(default)]
    pub firewall_acls: FirewallAcls,

    /// When set, unconfigured firewall ACLs default to empty instead of
    /// `["*"]`, making the service read-only for unprivileged clients.
    #[serde(default)]
    pub read_only: bool,

    /// Bulk storage backend selection and parameters.
    #[serde(flatten)]
    pub storage: StorageConfig,

    /// Negotiable error response templates.
    #[serde(default)]
    pub error_templates: ErrorTemplates,
}

impl Default for HatracConfig {
    fn default() -> Self {
        Self {
            service_prefix: default_service_prefix(),
            bind_address: default_bind_address(),
            log_level: default_log_level(),
            database_dsn: default_database_dsn(),
            database_max_retries: default_max_retries(),
            allowed_url_char_class: default_url_char_class(),
            max_request_payload_size: default_max_payload(),
            firewall_acls: FirewallAcls::default(),
            read_only: false,
            storage: StorageConfig::default(),
            error_templates: ErrorTemplates::default(),
        }
    }
}

impl HatracConfig {
    /// Load configuration from the file named by `HATRAC_CONFIG`, falling
    /// back to `hatrac_config.json`, falling back to defaults when neither
    /// exists.
    pub fn load() -> HatracResult<Self> {
        let path =
            std::env::var("HATRAC_CONFIG").unwrap_or_else(|_| "hatrac_config.json".to_owned());
        match std::fs::read_to_string(&path) {
            Ok(text) => Self::from_json(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(HatracError::Internal(anyhow::anyhow!(
                "cannot read config {path}: {e}"
            ))),
        }
    }

    /// Parse a configuration document from JSON text.
    pub fn from_json(text: &str) -> HatracResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| HatracError::Internal(anyhow::anyhow!("invalid configuration: {e}")))
    }

    /// The effective firewall ACL for an operation class.
    ///
    /// Explicitly configured lists win; otherwise the default is `["*"]`,
    /// or `[]` when `read_only` is set.
    #[must_use]
    pub fn firewall(&self, class: FirewallClass) -> &[String] {
        let slot = match class {
            FirewallClass::Create => &self.firewall_acls.create,
            FirewallClass::Delete => &self.firewall_acls.delete,
            FirewallClass::ManageAcls => &self.firewall_acls.manage_acls,
            FirewallClass::ManageMetadata => &self.firewall_acls.manage_metadata,
        };
        match slot {
            Some(list) => list,
            None if self.read_only => &[],
            None => std::slice::from_ref(&self.firewall_acls.wildcard),
        }
    }
}

// ---------------------------------------------------------------------------
// Firewall ACLs
// ---------------------------------------------------------------------------

/// The operation classes guarded by service-wide firewall ACLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirewallClass {
    /// Creating names, versions, and upload jobs.
    Create,
    /// Deleting names and versions.
    Delete,
    /// Reading or writing ACL subresources.
    ManageAcls,
    /// Writing metadata subresources.
    ManageMetadata,
}

/// Service-wide firewall ACL lists. `None` means "not configured" and takes
/// the `read_only`-sensitive default; the wildcard entry `"*"` admits
/// anonymous clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallAcls {
    /// Roles allowed to create resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<Vec<String>>,
    /// Roles allowed to delete resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<Vec<String>>,
    /// Roles allowed to manage ACLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manage_acls: Option<Vec<String>>,
    /// Roles allowed to manage metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manage_metadata: Option<Vec<String>>,
    /// The wildcard role, kept here so unconfigured classes can hand out a
    /// borrowed `["*"]` slice.
    #[serde(skip, default = "wildcard_role")]
    wildcard: String,
}

fn wildcard_role() -> String {
    "*".to_owned()
}

impl Default for FirewallAcls {
    fn default() -> Self {
        Self {
            create: None,
            delete: None,
            manage_acls: None,
            manage_metadata: None,
            wildcard: wildcard_role(),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage configuration
// ---------------------------------------------------------------------------

/// Which bulk storage backend implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    /// POSIX filesystem layout under `storage_path`.
    #[default]
    Filesystem,
    /// One or more S3 buckets routed by name prefix.
    Amazons3,
    /// Primary-write overlay over an ordered backend list.
    Overlay,
}

/// Parameters for one storage backend. The overlay backend nests further
/// `StorageConfig` values, one per layer, primary first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend implementation selector.
    #[serde(default)]
    pub storage_backend: StorageBackendKind,

    /// Root directory for the filesystem backend.
    #[serde(default = "default_storage_path")]
    pub storage_path: String,

    /// S3 backend parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_config: Option<S3Config>,

    /// Layered backend configurations for the overlay backend, primary
    /// first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overlay_backends: Vec<StorageConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackendKind::default(),
            storage_path: default_storage_path(),
            s3_config: None,
            overlay_backends: Vec::new(),
        }
    }
}

/// Top-level S3 backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    /// Session parameters applied to buckets without their own
    /// `session_config`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_session: Option<S3SessionConfig>,

    /// Bucket configurations keyed by hatrac name prefix. Requests route
    /// to the longest matching prefix.
    #[serde(default)]
    pub buckets: BTreeMap<String, S3BucketConfig>,

    /// Accept bucket keys without a leading `/` and treat them as rooted
    /// prefixes, for configurations predating prefix routing.
    #[serde(default)]
    pub legacy_mapping: bool,
}

/// Configuration for one routed S3 bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3BucketConfig {
    /// The S3 bucket name.
    pub bucket_name: String,

    /// Key prefix prepended to every object key in this bucket.
    #[serde(default)]
    pub bucket_path_prefix: String,

    /// Object key naming scheme.
    #[serde(default)]
    pub hatrac_s3_method: S3KeyScheme,

    /// Store object keys with percent-encoding removed.
    #[serde(default)]
    pub unquote_object_keys: bool,

    /// Sizes at or above this threshold redirect GETs to a presigned URL
    /// instead of proxying bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presigned_url_threshold: Option<u64>,

    /// Lifetime of issued presigned URLs.
    #[serde(default = "default_presign_expiration")]
    pub presigned_url_expiration_secs: u64,

    /// The bucket has S3 versioning enabled; record the S3 version id in
    /// the aux record so GETs address the exact historical object.
    #[serde(default)]
    pub versioned_bucket: bool,

    /// Per-bucket session override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_config: Option<S3SessionConfig>,

    /// Per-bucket client override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_config: Option<S3ClientConfig>,
}

/// How hatrac `(name, version)` pairs map to S3 object keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum S3KeyScheme {
    /// `prefix/**/hname`: one S3 object per hatrac object; versions rely
    /// on bucket versioning or aux overrides.
    #[default]
    #[serde(rename = "hname")]
    Name,
    /// `prefix/**/hname:hversion`: one S3 object per hatrac version.
    #[serde(rename = "hname:hver")]
    NameVersion,
}

/// AWS session parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3SessionConfig {
    /// Named credentials profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// AWS region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// S3 client parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3ClientConfig {
    /// Custom endpoint (S3-compatible stores, test servers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
    /// Use path-style addressing instead of virtual-hosted style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_path_style: Option<bool>,
}

// ---------------------------------------------------------------------------
// Error templates
// ---------------------------------------------------------------------------

/// Negotiable error response templates, keyed by status code and then by
/// content type. Templates interpolate `{code}`, `{title}`, and
/// `{description}`.
///
/// Two JSON shapes are accepted:
///
/// ```json
/// { "404": { "text/html": "<html>...", "default": "..." } }
/// ```
///
/// and the legacy shorthand
///
/// ```json
/// { "404_html": "<html>...", "404_plain": "..." }
/// ```
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorTemplates(BTreeMap<String, BTreeMap<String, String>>);

impl ErrorTemplates {
    /// Look up the template map for a status code, falling back to the
    /// `default` code entry.
    #[must_use]
    pub fn for_code(&self, code: u16) -> Option<&BTreeMap<String, String>> {
        self.0
            .get(&code.to_string())
            .or_else(|| self.0.get("default"))
    }

    /// Render a template by substituting the interpolation keys.
    #[must_use]
    pub fn render(template: &str, code: u16, title: &str, description: &str) -> String {
        template
            .replace("{code}", &code.to_string())
            .replace("{title}", title)
            .replace("{description}", description)
    }

    #[cfg(test)]
    fn insert(&mut self, code: &str, content_type: &str, template: &str) {
        self.0
            .entry(code.to_owned())
            .or_default()
            .insert(content_type.to_owned(), template.to_owned());
    }
}

impl<'de> Deserialize<'de> for ErrorTemplates {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        let mut templates: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

        for (key, value) in raw {
            match value {
                serde_json::Value::Object(map) => {
                    let entry = templates.entry(key).or_default();
                    for (ctype, tmpl) in map {
                        let tmpl = tmpl
                            .as_str()
                            .ok_or_else(|| D::Error::custom("error template must be a string"))?;
                        entry.insert(ctype, tmpl.to_owned());
                    }
                }
                serde_json::Value::String(tmpl) => {
                    // Legacy "<code>_html" / "<code>_plain" shorthand.
                    let (code, ctype) = if let Some(code) = key.strip_suffix("_html") {
                        (code.to_owned(), "text/html".to_owned())
                    } else if let Some(code) = key.strip_suffix("_plain") {
                        (code.to_owned(), "text/plain".to_owned())
                    } else {
                        return Err(D::Error::custom(format!(
                            "unrecognized error template key: {key}"
                        )));
                    };
                    templates.entry(code).or_default().insert(ctype, tmpl);
                }
                _ => {
                    return Err(D::Error::custom(
                        "error template entries must be objects or strings",
                    ));
                }
            }
        }

        Ok(Self(templates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_default_config() {
        let config = HatracConfig::default();
        assert_eq!(config.service_prefix, "/hatrac");
        assert_eq!(config.max_request_payload_size, 128 * 1024 * 1024);
        assert_eq!(config.database_max_retries, 5);
        assert_eq!(config.storage.storage_backend, StorageBackendKind::Filesystem);
        assert!(!config.read_only);
    }

    #[test]
    fn test_should_default_firewall_to_wildcard() {
        let config = HatracConfig::default();
        assert_eq!(config.firewall(FirewallClass::Create), ["*".to_owned()]);
        assert_eq!(config.firewall(FirewallClass::Delete), ["*".to_owned()]);
    }

    #[test]
    fn test_should_empty_firewall_defaults_when_read_only() {
        let config = HatracConfig::from_json(r#"{"read_only": true}"#)
            .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert!(config.firewall(FirewallClass::Create).is_empty());
        assert!(config.firewall(FirewallClass::ManageAcls).is_empty());
    }

    #[test]
    fn test_should_keep_explicit_firewall_over_read_only_default() {
        let config = HatracConfig::from_json(
            r#"{"read_only": true, "firewall_acls": {"delete": ["admin"]}}"#,
        )
        .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(config.firewall(FirewallClass::Delete), ["admin".to_owned()]);
        assert!(config.firewall(FirewallClass::Create).is_empty());
    }

    #[test]
    fn test_should_parse_s3_storage_config() {
        let config = HatracConfig::from_json(
            r#"{
                "storage_backend": "amazons3",
                "s3_config": {
                    "buckets": {
                        "/": {
                            "bucket_name": "hatrac-bucket",
                            "bucket_path_prefix": "hatrac",
                            "hatrac_s3_method": "hname:hver",
                            "presigned_url_threshold": 1048576
                        }
                    }
                }
            }"#,
        )
        .unwrap_or_else(|e| panic!("parse failed: {e}"));

        assert_eq!(config.storage.storage_backend, StorageBackendKind::Amazons3);
        let s3 = config.storage.s3_config.as_ref().expect("s3 config");
        let bucket = s3.buckets.get("/").expect("root bucket");
        assert_eq!(bucket.bucket_name, "hatrac-bucket");
        assert_eq!(bucket.hatrac_s3_method, S3KeyScheme::NameVersion);
        assert_eq!(bucket.presigned_url_threshold, Some(1_048_576));
        assert_eq!(bucket.presigned_url_expiration_secs, 300);
    }

    #[test]
    fn test_should_parse_nested_overlay_config() {
        let config = HatracConfig::from_json(
            r#"{
                "storage_backend": "overlay",
                "overlay_backends": [
                    {"storage_backend": "filesystem", "storage_path": "/tmp/primary"},
                    {"storage_backend": "filesystem", "storage_path": "/tmp/secondary"}
                ]
            }"#,
        )
        .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(config.storage.storage_backend, StorageBackendKind::Overlay);
        assert_eq!(config.storage.overlay_backends.len(), 2);
        assert_eq!(config.storage.overlay_backends[0].storage_path, "/tmp/primary");
    }

    #[test]
    fn test_should_parse_error_templates_both_shapes() {
        let config = HatracConfig::from_json(
            r#"{
                "error_templates": {
                    "404": {"text/html": "<b>{title}</b>", "default": "{code} {title}"},
                    "409_plain": "conflict: {description}"
                }
            }"#,
        )
        .unwrap_or_else(|e| panic!("parse failed: {e}"));

        let for_404 = config.error_templates.for_code(404).expect("404 templates");
        assert_eq!(for_404.get("text/html").map(String::as_str), Some("<b>{title}</b>"));

        let for_409 = config.error_templates.for_code(409).expect("409 templates");
        assert_eq!(
            for_409.get("text/plain").map(String::as_str),
            Some("conflict: {description}")
        );
    }

    #[test]
    fn test_should_fall_back_to_default_code_templates() {
        let mut templates = ErrorTemplates::default();
        templates.insert("default", "text/plain", "{code}: {description}");
        assert!(templates.for_code(404).is_some());
    }

    #[test]
    fn test_should_render_template_interpolations() {
        let body = ErrorTemplates::render("{code} {title}: {description}", 404, "Not Found", "gone");
        assert_eq!(body, "404 Not Found: gone");
    }

    #[test]
    fn test_should_ignore_unknown_top_level_keys() {
        let config = HatracConfig::from_json(r#"{"webauthn": {"provider": "x"}}"#)
            .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(config.service_prefix, "/hatrac");
    }
}
