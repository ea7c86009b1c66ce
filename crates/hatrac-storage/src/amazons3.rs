//! S3-backed bulk storage.
//!
//! Names route to buckets by longest-prefix match over the configured
//! bucket map. Object keys follow the configured naming scheme
//! (`pref/**/hname` or `pref/**/hname:hver`). Chunked uploads map onto S3
//! multipart uploads, with per-part ETags tracked as chunk aux records.
//! Reads above the configured size threshold redirect to a presigned URL
//! instead of proxying bytes; versioned buckets record the S3 version id
//! in the aux record so later reads address the exact historical object.
//!
//! Incoming payload streams are spooled through a temp file to obtain the
//! sized, replayable body the SDK requires, keeping memory bounded the
//! same way the in-flight spillover files do elsewhere.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use tracing::{debug, trace, warn};

use hatrac_core::config::{S3BucketConfig, S3Config, S3KeyScheme};
use hatrac_core::digest::ContentDigests;
use hatrac_core::ids::{generate_job_id, generate_version_id};
use hatrac_core::{HatracError, HatracResult};
use hatrac_model::meta::ContentMetadata;
use hatrac_model::name::NamePath;
use hatrac_model::resource::AuxRecord;

use crate::backend::{
    ByteStream, ContentGet, StorageBackend, StoredVersion, drain_to_writer, reader_stream,
};

fn s3_internal(op: &'static str, err: impl std::fmt::Display) -> HatracError {
    HatracError::Internal(anyhow::anyhow!("s3 {op}: {err}"))
}

// ---------------------------------------------------------------------------
// Bucket routing
// ---------------------------------------------------------------------------

/// One configured bucket with its constructed client.
struct BucketRoute {
    prefix: String,
    config: S3BucketConfig,
    client: Client,
}

impl std::fmt::Debug for BucketRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketRoute")
            .field("prefix", &self.prefix)
            .field("bucket", &self.config.bucket_name)
            .finish()
    }
}

/// Normalize a configured bucket key into a rooted prefix. Bare keys are
/// accepted only under `legacy_mapping`.
fn normalize_prefix(key: &str, legacy_mapping: bool) -> HatracResult<String> {
    let rooted = if key.starts_with('/') {
        key.to_owned()
    } else if legacy_mapping {
        format!("/{key}")
    } else {
        return Err(HatracError::Internal(anyhow::anyhow!(
            "s3 bucket prefix {key:?} must start with '/' (or enable legacy_mapping)"
        )));
    };
    if rooted == "/" {
        return Ok(rooted);
    }
    Ok(rooted.trim_end_matches('/').to_owned())
}

/// Whether a decoded object path falls under a normalized prefix.
fn prefix_matches(prefix: &str, name: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    name == prefix || name.starts_with(&format!("{prefix}/"))
}

/// The S3 object key for a hatrac `(name, version)` pair under a bucket
/// configuration.
fn object_key(config: &S3BucketConfig, name: &NamePath, version: &str) -> String {
    let base = if config.unquote_object_keys {
        name.to_string()
    } else {
        name.encoded()
    };
    let mut key = String::new();
    let path_prefix = config.bucket_path_prefix.trim_matches('/');
    if !path_prefix.is_empty() {
        key.push_str(path_prefix);
    }
    key.push_str(&base);
    let mut key = key.trim_start_matches('/').to_owned();
    if config.hatrac_s3_method == S3KeyScheme::NameVersion {
        key.push(':');
        key.push_str(version);
    }
    key
}

// ---------------------------------------------------------------------------
// Spool files
// ---------------------------------------------------------------------------

/// A temp file holding a spooled payload; removed on drop.
struct SpoolFile {
    path: PathBuf,
}

impl SpoolFile {
    fn new() -> Self {
        Self {
            path: std::env::temp_dir().join(format!("hatrac-s3-{}", generate_job_id())),
        }
    }

    /// Drain a payload stream into the spool, hashing on the way.
    async fn fill(&self, body: ByteStream, expected: u64) -> HatracResult<ContentDigests> {
        let mut file = tokio::fs::File::create(&self.path)
            .await
            .map_err(|e| s3_internal("spool create", e))?;
        drain_to_writer(body, expected, &mut file).await
    }

    async fn byte_stream(&self) -> HatracResult<aws_sdk_s3::primitives::ByteStream> {
        aws_sdk_s3::primitives::ByteStream::from_path(&self.path)
            .await
            .map_err(|e| s3_internal("spool read", e))
    }
}

impl Drop for SpoolFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove spool file");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// AmazonS3Backend
// ---------------------------------------------------------------------------

/// Bulk storage over one or more routed S3 buckets.
#[derive(Debug)]
pub struct AmazonS3Backend {
    /// Routes sorted by descending prefix length: first match wins.
    routes: Vec<BucketRoute>,
}

impl AmazonS3Backend {
    /// Build clients for every configured bucket.
    pub async fn from_config(config: &S3Config) -> HatracResult<Self> {
        if config.buckets.is_empty() {
            return Err(HatracError::Internal(anyhow::anyhow!(
                "s3_config.buckets must configure at least one bucket"
            )));
        }

        let mut routes = Vec::with_capacity(config.buckets.len());
        for (key, bucket) in &config.buckets {
            let prefix = normalize_prefix(key, config.legacy_mapping)?;
            let client = build_client(config, bucket).await;
            routes.push(BucketRoute {
                prefix,
                config: bucket.clone(),
                client,
            });
        }
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        debug!(buckets = routes.len(), "s3 backend ready");
        Ok(Self { routes })
    }

    /// Route a name to its bucket by longest-prefix match.
    fn route(&self, name: &NamePath) -> HatracResult<&BucketRoute> {
        let text = name.to_string();
        self.routes
            .iter()
            .find(|route| prefix_matches(&route.prefix, &text))
            .ok_or_else(|| {
                HatracError::Internal(anyhow::anyhow!("no s3 bucket configured for {text}"))
            })
    }

    /// The backend-level S3 version id, honoring an aux override.
    fn s3_version_id(aux: &AuxRecord) -> Option<String> {
        aux.version.clone()
    }
}

async fn build_client(config: &S3Config, bucket: &S3BucketConfig) -> Client {
    let session = bucket
        .session_config
        .as_ref()
        .or(config.default_session.as_ref());

    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(session) = session {
        if let Some(profile) = &session.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &session.region {
            loader = loader.region(Region::new(region.clone()));
        }
    }
    let shared = loader.load().await;

    let mut builder = aws_sdk_s3::config::Builder::from(&shared);
    if let Some(client_config) = &bucket.client_config {
        if let Some(endpoint) = &client_config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        if let Some(force_path_style) = client_config.force_path_style {
            builder = builder.force_path_style(force_path_style);
        }
    }
    Client::from_conf(builder.build())
}

#[async_trait]
impl StorageBackend for AmazonS3Backend {
    async fn create_from_stream(
        &self,
        name: &NamePath,
        body: ByteStream,
        nbytes: u64,
        metadata: &ContentMetadata,
    ) -> HatracResult<StoredVersion> {
        let route = self.route(name)?;
        let version = generate_version_id();
        let key = object_key(&route.config, name, &version);

        let spool = SpoolFile::new();
        let digests = spool.fill(body, nbytes).await?;
        digests.verify_declared(
            metadata.content_md5.as_deref(),
            metadata.content_sha256.as_deref(),
            HatracError::BadRequest,
        )?;

        let response = route
            .client
            .put_object()
            .bucket(&route.config.bucket_name)
            .key(&key)
            .set_content_type(metadata.content_type.clone())
            .body(spool.byte_stream().await?)
            .send()
            .await
            .map_err(|e| s3_internal("put_object", e))?;

        let mut aux = AuxRecord::default();
        if route.config.versioned_bucket {
            aux.version = response.version_id().map(ToOwned::to_owned);
        }

        debug!(name = %name, bucket = %route.config.bucket_name, key, nbytes, "stored s3 object");
        Ok(StoredVersion {
            version,
            digests: Some(digests),
            aux,
        })
    }

    async fn get_content(
        &self,
        name: &NamePath,
        version: &str,
        range: Option<(u64, u64)>,
        nbytes: Option<u64>,
        _metadata: &ContentMetadata,
        aux: &AuxRecord,
    ) -> HatracResult<ContentGet> {
        let route = self.route(name)?;

        // Large whole-object reads bypass the proxy path entirely.
        if range.is_none() {
            if let (Some(threshold), Some(total)) =
                (route.config.presigned_url_threshold, nbytes)
            {
                if total >= threshold {
                    let ttl = Duration::from_secs(route.config.presigned_url_expiration_secs);
                    if let Some(url) = self.presigned_get(name, version, aux, ttl).await? {
                        return Ok(ContentGet::Redirect { url });
                    }
                }
            }
        }

        let key = object_key(&route.config, name, version);
        let mut request = route
            .client
            .get_object()
            .bucket(&route.config.bucket_name)
            .key(&key)
            .set_version_id(Self::s3_version_id(aux));
        if let Some((start, end)) = range {
            request = request.range(format!("bytes={start}-{end}"));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                let service = err.into_service_error();
                if service.is_no_such_key() {
                    return Err(HatracError::not_found(format!(
                        "object version {name}:{version} not present in storage"
                    )));
                }
                return Err(s3_internal("get_object", service));
            }
        };

        let body_len = response
            .content_length()
            .and_then(|len| u64::try_from(len).ok());
        let nbytes_out = match (range, body_len) {
            (Some((start, end)), _) => end - start + 1,
            (None, Some(len)) => len,
            (None, None) => nbytes.unwrap_or(0),
        };
        let total = match range {
            Some(_) => nbytes.or(body_len).unwrap_or(nbytes_out),
            None => nbytes_out,
        };

        trace!(name = %name, key, nbytes_out, "streaming s3 object");
        Ok(ContentGet::Stream {
            stream: reader_stream(response.body.into_async_read(), nbytes_out),
            nbytes: nbytes_out,
            total,
            range,
        })
    }

    async fn delete(&self, name: &NamePath, version: &str, aux: &AuxRecord) -> HatracResult<()> {
        let route = self.route(name)?;
        let key = object_key(&route.config, name, version);
        route
            .client
            .delete_object()
            .bucket(&route.config.bucket_name)
            .key(&key)
            .set_version_id(Self::s3_version_id(aux))
            .send()
            .await
            .map_err(|e| s3_internal("delete_object", e))?;
        debug!(name = %name, key, "deleted s3 object");
        Ok(())
    }

    async fn create_upload(
        &self,
        name: &NamePath,
        _nbytes: u64,
        metadata: &ContentMetadata,
    ) -> HatracResult<String> {
        let route = self.route(name)?;
        // Multipart content assembles under the final key; the hatrac
        // version id is not known until finalization for versioned
        // buckets, so the name scheme key uses a fresh id recorded in the
        // handle.
        let version = generate_version_id();
        let key = object_key(&route.config, name, &version);
        let response = route
            .client
            .create_multipart_upload()
            .bucket(&route.config.bucket_name)
            .key(&key)
            .set_content_type(metadata.content_type.clone())
            .send()
            .await
            .map_err(|e| s3_internal("create_multipart_upload", e))?;
        let upload_id = response
            .upload_id()
            .ok_or_else(|| s3_internal("create_multipart_upload", "missing upload id"))?;
        debug!(name = %name, key, upload_id, "created s3 multipart upload");
        Ok(format!("{version}:{upload_id}"))
    }

    async fn upload_chunk(
        &self,
        name: &NamePath,
        handle: &str,
        position: u64,
        _chunk_length: u64,
        nbytes: u64,
        body: ByteStream,
    ) -> HatracResult<serde_json::Value> {
        let route = self.route(name)?;
        let (version, upload_id) = split_handle(handle)?;
        let key = object_key(&route.config, name, version);

        let spool = SpoolFile::new();
        let digests = spool.fill(body, nbytes).await?;

        // S3 part numbers are 1-based.
        let part_number = i32::try_from(position + 1)
            .map_err(|_| HatracError::bad_request("chunk position out of range"))?;
        let response = route
            .client
            .upload_part()
            .bucket(&route.config.bucket_name)
            .key(&key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(spool.byte_stream().await?)
            .send()
            .await
            .map_err(|e| s3_internal("upload_part", e))?;
        let etag = response
            .e_tag()
            .ok_or_else(|| s3_internal("upload_part", "missing part etag"))?;

        trace!(name = %name, key, part_number, nbytes, "uploaded s3 part");
        Ok(serde_json::json!({ "etag": etag, "md5": digests.md5_b64 }))
    }

    async fn finalize_upload(
        &self,
        name: &NamePath,
        handle: &str,
        chunks: &[(i64, serde_json::Value)],
        _metadata: &ContentMetadata,
    ) -> HatracResult<StoredVersion> {
        let route = self.route(name)?;
        let (version, upload_id) = split_handle(handle)?;
        let key = object_key(&route.config, name, version);

        let mut parts = Vec::with_capacity(chunks.len());
        let mut ordered: Vec<&(i64, serde_json::Value)> = chunks.iter().collect();
        ordered.sort_by_key(|(position, _)| *position);
        for (position, aux) in ordered {
            let etag = aux.get("etag").and_then(|v| v.as_str()).ok_or_else(|| {
                HatracError::conflict(format!("chunk {position} has no recorded etag"))
            })?;
            let part_number = i32::try_from(position + 1)
                .map_err(|_| HatracError::conflict("chunk position out of range"))?;
            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(etag)
                    .build(),
            );
        }

        let response = route
            .client
            .complete_multipart_upload()
            .bucket(&route.config.bucket_name)
            .key(&key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| s3_internal("complete_multipart_upload", e))?;

        let mut aux = AuxRecord::default();
        if route.config.versioned_bucket {
            aux.version = response.version_id().map(ToOwned::to_owned);
        }

        debug!(name = %name, key, "completed s3 multipart upload");
        // Part-composite ETags do not expose the assembled content MD5,
        // so no digests are reported here; declared-digest validation is
        // recorded as skipped for this backend.
        Ok(StoredVersion {
            version: version.to_owned(),
            digests: None,
            aux,
        })
    }

    async fn cancel_upload(&self, name: &NamePath, handle: &str) -> HatracResult<()> {
        let route = self.route(name)?;
        let (version, upload_id) = split_handle(handle)?;
        let key = object_key(&route.config, name, version);
        route
            .client
            .abort_multipart_upload()
            .bucket(&route.config.bucket_name)
            .key(&key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| s3_internal("abort_multipart_upload", e))?;
        debug!(name = %name, key, "aborted s3 multipart upload");
        Ok(())
    }

    fn address(&self, name: &NamePath, version: &str) -> String {
        match self.route(name) {
            Ok(route) => format!(
                "s3://{}/{}",
                route.config.bucket_name,
                object_key(&route.config, name, version)
            ),
            Err(_) => format!("s3://unrouted{name}"),
        }
    }

    async fn presigned_get(
        &self,
        name: &NamePath,
        version: &str,
        aux: &AuxRecord,
        ttl: Duration,
    ) -> HatracResult<Option<String>> {
        let route = self.route(name)?;
        let key = object_key(&route.config, name, version);
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| s3_internal("presigning config", e))?;
        let request = route
            .client
            .get_object()
            .bucket(&route.config.bucket_name)
            .key(&key)
            .set_version_id(Self::s3_version_id(aux))
            .presigned(presigning)
            .await
            .map_err(|e| s3_internal("presign get_object", e))?;
        Ok(Some(request.uri().to_string()))
    }
}

/// The backend handle packs the key-scheme version id with the S3
/// multipart upload id.
fn split_handle(handle: &str) -> HatracResult<(&str, &str)> {
    handle
        .split_once(':')
        .ok_or_else(|| HatracError::Internal(anyhow::anyhow!("malformed s3 upload handle")))
}
