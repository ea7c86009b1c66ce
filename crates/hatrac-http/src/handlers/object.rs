//! Object content writes and reads.
//!
//! A PUT streams the body straight into the storage backend while an
//! invisible version row records the in-flight transfer; the row is
//! completed (and becomes current) only after the bytes are durable, so
//! a failed transfer never surfaces a partial version.

use hyper::body::Incoming;
use tracing::info;

use hatrac_core::digest::{validate_md5_b64, validate_sha256_b64};
use hatrac_core::{ClientContext, HatracError, HatracResult};
use hatrac_directory::authz::Action;
use hatrac_directory::store::Resolved;
use hatrac_model::meta::{ContentMetadata, validate_content_disposition};

use crate::body::HatracBody;
use crate::handlers::{body_stream, content_type, required_content_length};
use crate::preconditions::{Preconditions, quote_etag};
use crate::provider::{HatracProvider, enforce};
use crate::response;

impl HatracProvider {
    /// Create a new version of an object from the raw request body.
    pub(crate) async fn object_update(
        &self,
        parts: &http::request::Parts,
        body: Incoming,
        resolved: &Resolved,
        ctx: &ClientContext,
    ) -> HatracResult<http::Response<HatracBody>> {
        let object = resolved
            .as_object()
            .ok_or_else(|| HatracError::Internal(anyhow::anyhow!("content PUT on non-object")))?;

        enforce(self, Action::Update, resolved.acls(), &resolved.ancestors, ctx)?;

        let nbytes = required_content_length(parts)?;
        let limit = self.config().max_request_payload_size;
        if nbytes > limit {
            return Err(HatracError::PayloadTooLarge { limit });
        }

        // Preconditions compare against the current version's ETag;
        // `If-None-Match: *` requires the object to have no content yet.
        let current = self.directory().get_current_version(object).await?;
        Preconditions::from_headers(&parts.headers)
            .check_write(current.as_ref().and_then(|v| v.version_key.as_deref()))?;

        // The new version inherits ACLs and metadata from the previous
        // current version; fields the request supplies override, and the
        // digest fields always describe the streamed bytes.
        let mut metadata = content_metadata_from_headers(parts)?;
        if let Some(previous) = &current {
            if metadata.content_type.is_none() {
                metadata.content_type = previous.metadata.content_type.clone();
            }
            if metadata.content_disposition.is_none() {
                metadata.content_disposition = previous.metadata.content_disposition.clone();
            }
        }

        let pending = self
            .directory()
            .create_pending_version(
                object,
                &metadata,
                current.as_ref().map(|v| &v.acls),
                ctx,
            )
            .await?;

        let stored = match self
            .storage()
            .create_from_stream(&object.path, body_stream(body), nbytes, &metadata)
            .await
        {
            Ok(stored) => stored,
            Err(err) => {
                let _ = self.directory().abort_pending_version(pending).await;
                return Err(err);
            }
        };

        let version = match self
            .directory()
            .complete_version(
                object,
                pending,
                &stored.version,
                nbytes as i64,
                stored.digests.as_ref(),
                &stored.aux,
            )
            .await
        {
            Ok(version) => version,
            Err(err) => {
                // The bytes are orphaned if the completion cannot commit;
                // reclaim them before reporting the failure.
                let _ = self
                    .storage()
                    .delete(&object.path, &stored.version, &stored.aux)
                    .await;
                let _ = self.directory().abort_pending_version(pending).await;
                return Err(err);
            }
        };

        info!(path = %object.path, version = stored.version, nbytes, "stored new version");
        let etag = version.version_key.as_deref().map(quote_etag);
        response::created(&self.location(&version.versioned_ref()), etag.as_deref())
    }

    /// GET/HEAD on an object or a specific version.
    pub(crate) async fn object_get(
        &self,
        parts: &http::request::Parts,
        resolved: &Resolved,
        version_key: Option<&str>,
        ctx: &ClientContext,
        head: bool,
    ) -> HatracResult<http::Response<HatracBody>> {
        let object = resolved
            .as_object()
            .ok_or_else(|| HatracError::Internal(anyhow::anyhow!("content GET on non-object")))?;

        let (version, is_current) = match version_key {
            Some(key) => (self.require_version(object, key).await?, false),
            None => (self.require_current_version(object).await?, true),
        };
        self.serve_version(parts, resolved, version, ctx, head, is_current)
            .await
    }
}

/// Extract and validate the content metadata headers of an object PUT.
fn content_metadata_from_headers(
    parts: &http::request::Parts,
) -> HatracResult<ContentMetadata> {
    let content_md5 = parts
        .headers
        .get("content-md5")
        .map(|v| {
            let text = v
                .to_str()
                .map_err(|_| HatracError::bad_request("content-md5 is not valid text"))?;
            validate_md5_b64(text)
        })
        .transpose()?;

    let content_sha256 = parts
        .headers
        .get("content-sha256")
        .map(|v| {
            let text = v
                .to_str()
                .map_err(|_| HatracError::bad_request("content-sha256 is not valid text"))?;
            validate_sha256_b64(text)
        })
        .transpose()?;

    let content_disposition = parts
        .headers
        .get(http::header::CONTENT_DISPOSITION)
        .map(|v| {
            let text = v.to_str().map_err(|_| {
                HatracError::bad_request("content-disposition is not valid text")
            })?;
            validate_content_disposition(text)?;
            Ok::<_, HatracError>(text.to_owned())
        })
        .transpose()?;

    Ok(ContentMetadata {
        content_type: content_type(parts),
        content_md5,
        content_sha256,
        content_disposition,
    })
}
