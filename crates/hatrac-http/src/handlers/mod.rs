//! Request handlers by resource kind.
//!
//! [`dispatch`] maps a routed [`Target`] plus HTTP method onto the
//! handler methods implemented on [`HatracProvider`] in the submodules:
//! bare names (namespace/object), versions, and the `;versions`,
//! `;metadata`, `;acl`, and `;upload` subresources. Method/kind
//! mismatches are 405.

mod acl;
mod metadata;
mod namespace;
mod object;
mod upload;
mod version;

use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use http::Method;
use http_body_util::{BodyExt, BodyStream};
use hyper::body::Incoming;

use hatrac_core::{ClientContext, HatracError, HatracResult};
use hatrac_storage::ByteStream;

use crate::body::HatracBody;
use crate::provider::HatracProvider;
use crate::router::{SubResource, Target};

/// Upper bound for metadata-only payloads (JSON documents, ACL lists,
/// field values). Bulk content never goes through this path.
const MAX_SMALL_BODY: u64 = 1024 * 1024;

/// Route a parsed request to its handler.
pub async fn dispatch(
    provider: &HatracProvider,
    parts: http::request::Parts,
    body: Incoming,
    target: Target,
    ctx: &ClientContext,
) -> HatracResult<http::Response<HatracBody>> {
    let method = parts.method.clone();
    let head = method == Method::HEAD;

    match target.sub.clone() {
        None => match method {
            Method::GET | Method::HEAD => provider.name_get(&parts, &target, ctx, head).await,
            Method::PUT => {
                if target.version.is_some() {
                    // Versions are immutable; clients never PUT them.
                    return Err(HatracError::MethodNotAllowed);
                }
                provider.name_put(&parts, body, &target, ctx).await
            }
            Method::DELETE => provider.name_delete(&parts, &target, ctx).await,
            _ => Err(HatracError::MethodNotAllowed),
        },

        Some(SubResource::Versions) => match method {
            Method::GET | Method::HEAD => {
                provider.versions_list(&parts, &target, ctx, head).await
            }
            _ => Err(HatracError::MethodNotAllowed),
        },

        Some(SubResource::Metadata { field }) => match method {
            Method::GET | Method::HEAD => {
                provider.metadata_get(&target, field, ctx, head).await
            }
            Method::PUT => {
                let field = field.ok_or(HatracError::MethodNotAllowed)?;
                let payload = collect_body(body, MAX_SMALL_BODY).await?;
                provider.metadata_put(&target, field, &payload, ctx).await
            }
            Method::DELETE => {
                let field = field.ok_or(HatracError::MethodNotAllowed)?;
                provider.metadata_delete(&target, field, ctx).await
            }
            _ => Err(HatracError::MethodNotAllowed),
        },

        Some(SubResource::Acl { access, entry }) => match method {
            Method::GET | Method::HEAD => {
                provider.acl_get(&target, access, entry.as_deref(), ctx, head).await
            }
            Method::PUT => {
                let payload = collect_body(body, MAX_SMALL_BODY).await?;
                provider
                    .acl_put(&parts, &target, access, entry.as_deref(), &payload, ctx)
                    .await
            }
            Method::DELETE => {
                provider
                    .acl_delete(&parts, &target, access, entry.as_deref(), ctx)
                    .await
            }
            _ => Err(HatracError::MethodNotAllowed),
        },

        Some(SubResource::Upload { job, chunk }) => match (job, chunk, method) {
            (None, None, Method::POST) => {
                let payload = collect_body(body, MAX_SMALL_BODY).await?;
                provider.upload_create(&target, &payload, ctx).await
            }
            (None, None, Method::GET | Method::HEAD) => {
                provider.upload_list(&parts, &target, ctx, head).await
            }
            (Some(job), None, Method::GET | Method::HEAD) => {
                provider.upload_status(&target, &job, ctx, head).await
            }
            (Some(job), None, Method::POST) => {
                provider.upload_finalize(&target, &job, ctx).await
            }
            (Some(job), None, Method::DELETE) => {
                provider.upload_cancel(&target, &job, ctx).await
            }
            (Some(job), Some(chunk), Method::PUT) => {
                provider
                    .upload_chunk(&parts, body, &target, &job, chunk, ctx)
                    .await
            }
            _ => Err(HatracError::MethodNotAllowed),
        },
    }
}

// ---------------------------------------------------------------------------
// Body plumbing
// ---------------------------------------------------------------------------

/// Collect a metadata-only payload, bounding memory.
pub(crate) async fn collect_body(body: Incoming, limit: u64) -> HatracResult<Bytes> {
    let collected = body
        .collect()
        .await
        .map_err(|e| HatracError::bad_request(format!("error reading request payload: {e}")))?
        .to_bytes();
    if collected.len() as u64 > limit {
        return Err(HatracError::PayloadTooLarge { limit });
    }
    Ok(collected)
}

/// Adapt a hyper request body into the storage byte-stream type.
pub(crate) fn body_stream(body: Incoming) -> ByteStream {
    TryStreamExt::map_err(BodyStream::new(body), std::io::Error::other)
        .try_filter_map(|frame| std::future::ready(Ok(frame.into_data().ok())))
        .boxed()
}

/// The declared `Content-Length` of a bulk payload; bulk writes require
/// one.
pub(crate) fn required_content_length(parts: &http::request::Parts) -> HatracResult<u64> {
    parts
        .headers
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or(HatracError::LengthRequired)
}

/// The request content type with parameters stripped, lowercased.
pub(crate) fn content_type(parts: &http::request::Parts) -> Option<String> {
    parts
        .headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
        .filter(|v| !v.is_empty())
}

/// The `Accept` header, if any.
pub(crate) fn accept_header(parts: &http::request::Parts) -> Option<String> {
    parts
        .headers
        .get(http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
}
