//! Version serving, deletion, and the `;versions` listing.
//!
//! Serving honors the aux record in priority order: a `rename_to`
//! reference transparently serves (and authorizes against) the target
//! version while advertising it in `Content-Location`; a `url` reference
//! redirects; `hname`/`hversion` override backend addressing; the
//! backend-level `version` rides along in the aux record itself.

use http::StatusCode;
use http::header::{
    ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_LOCATION, CONTENT_RANGE,
    CONTENT_TYPE, ETAG, RANGE,
};
use tracing::info;

use hatrac_core::{ClientContext, HatracError, HatracResult};
use hatrac_directory::authz::Action;
use hatrac_directory::store::Resolved;
use hatrac_model::name::NamePath;
use hatrac_model::resource::VersionRecord;
use hatrac_storage::ContentGet;

use crate::body::HatracBody;
use crate::handlers::accept_header;
use crate::negotiate::wants_uri_list;
use crate::preconditions::{Preconditions, quote_etag};
use crate::provider::{HatracProvider, enforce, listing_tag};
use crate::response;
use crate::router::Target;

/// Defensive bound on `rename_to` chains; the records form a DAG, so a
/// longer walk means a corrupt store.
const RENAME_HOP_LIMIT: usize = 8;

impl HatracProvider {
    /// Stream one version to the client, honoring aux redirection,
    /// conditional headers, and a single byte range.
    pub(crate) async fn serve_version(
        &self,
        parts: &http::request::Parts,
        resolved: &Resolved,
        version: VersionRecord,
        ctx: &ClientContext,
        head: bool,
        is_current: bool,
    ) -> HatracResult<http::Response<HatracBody>> {
        let mut resolved = resolved.clone();
        let mut version = version;
        let mut content_location: Option<String> = None;

        // Follow rename_to references to the version that owns storage.
        let mut hops = 0;
        while let Some((target_name, target_version)) = version.aux.rename_to.clone() {
            hops += 1;
            if hops > RENAME_HOP_LIMIT {
                return Err(HatracError::Internal(anyhow::anyhow!(
                    "rename chain exceeds {RENAME_HOP_LIMIT} hops at {target_name}:{target_version}"
                )));
            }
            let target_path = NamePath::parse(&target_name)?;
            let target_resolved = self.resolve_live(&target_path).await.map_err(|_| {
                HatracError::conflict(format!(
                    "content for {} is no longer available",
                    version.path
                ))
            })?;
            let target_object = target_resolved.as_object().ok_or_else(|| {
                HatracError::conflict(format!("rename target {target_path} is not an object"))
            })?;
            let target = self
                .directory()
                .version_resolve(target_object, &target_version)
                .await?
                .filter(VersionRecord::is_live)
                .ok_or_else(|| {
                    HatracError::conflict(format!(
                        "content for {} is no longer available",
                        version.path
                    ))
                })?;
            content_location = Some(self.location(&target.versioned_ref()));
            resolved = target_resolved;
            version = target;
        }

        // Authorization applies to the version actually served.
        enforce(self, Action::Read, &version.acls, &resolved.version_chain(), ctx)?;

        if content_location.is_none() && is_current {
            content_location = Some(self.location(&version.versioned_ref()));
        }

        // A remote-equivalent URL short-circuits to a redirect.
        if let Some(url) = &version.aux.url {
            return response::redirect(url);
        }

        let tag = version
            .version_key
            .clone()
            .ok_or_else(|| HatracError::Internal(anyhow::anyhow!("live version without key")))?;
        let etag = quote_etag(&tag);

        if Preconditions::from_headers(&parts.headers).check_not_modified(&tag) {
            return response::not_modified(&etag);
        }

        let total = version
            .nbytes
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| HatracError::Internal(anyhow::anyhow!("live version without size")))?;

        // HEAD answers from the directory alone.
        if head {
            let builder = content_headers(
                http::Response::builder()
                    .status(StatusCode::OK)
                    .header(CONTENT_LENGTH, total),
                &version,
                &etag,
                content_location.as_deref(),
            );
            return response::build(builder, HatracBody::empty());
        }

        let range = match parts.headers.get(RANGE).and_then(|v| v.to_str().ok()) {
            None => None,
            Some(header) => match crate::range::parse_range(header, total) {
                crate::range::RangeOutcome::Full => None,
                crate::range::RangeOutcome::Single(start, end) => Some((start, end)),
                crate::range::RangeOutcome::Unsatisfiable => {
                    return Err(HatracError::RangeNotSatisfiable { total });
                }
                crate::range::RangeOutcome::NotImplemented => {
                    return Err(HatracError::not_implemented(
                        "multi-range requests are not supported",
                    ));
                }
            },
        };

        // Aux overrides redirect backend addressing without changing the
        // client-visible identity.
        let backend_name = match &version.aux.hname {
            Some(hname) => NamePath::parse(hname)?,
            None => version.path.clone(),
        };
        let backend_version = version.aux.hversion.clone().unwrap_or_else(|| tag.clone());

        let content = self
            .storage()
            .get_content(
                &backend_name,
                &backend_version,
                range,
                Some(total),
                &version.metadata,
                &version.aux,
            )
            .await?;

        match content {
            ContentGet::Redirect { url } => response::redirect(&url),
            ContentGet::Stream {
                stream,
                nbytes,
                total,
                range,
            } => {
                let mut builder = match range {
                    Some((start, end)) => http::Response::builder()
                        .status(StatusCode::PARTIAL_CONTENT)
                        .header(CONTENT_RANGE, format!("bytes {start}-{end}/{total}")),
                    None => http::Response::builder().status(StatusCode::OK),
                };
                builder = builder.header(CONTENT_LENGTH, nbytes);
                builder = content_headers(builder, &version, &etag, content_location.as_deref());
                response::build(builder, HatracBody::streaming(stream))
            }
        }
    }

    /// DELETE on a version-qualified name.
    pub(crate) async fn version_delete(
        &self,
        parts: &http::request::Parts,
        target: &Target,
        version_key: &str,
        ctx: &ClientContext,
    ) -> HatracResult<http::Response<HatracBody>> {
        let resolved = self.resolve_live(&target.path).await?;
        let object = resolved.as_object().ok_or_else(|| {
            HatracError::not_found(format!("{} is not an object", target.path))
        })?;
        let version = self.require_version(object, version_key).await?;

        enforce(self, Action::Delete, &version.acls, &resolved.version_chain(), ctx)?;
        Preconditions::from_headers(&parts.headers).check_write(Some(version_key))?;

        self.directory().delete_version(&version).await?;
        self.cleanup_version(&version).await;
        info!(path = %target.path, version = version_key, "deleted version");
        response::no_content(None)
    }

    /// GET/HEAD on `;versions`: list an object's live versions.
    pub(crate) async fn versions_list(
        &self,
        parts: &http::request::Parts,
        target: &Target,
        ctx: &ClientContext,
        head: bool,
    ) -> HatracResult<http::Response<HatracBody>> {
        if target.version.is_some() {
            return Err(HatracError::bad_request(
                "the versions listing addresses an object, not a version",
            ));
        }
        let resolved = self.resolve_live(&target.path).await?;
        let object = resolved.as_object().ok_or_else(|| {
            HatracError::not_found(format!("{} is not an object", target.path))
        })?;

        enforce(self, Action::Read, resolved.acls(), &resolved.ancestors, ctx)?;

        let versions = self.directory().enumerate_versions(object).await?;
        let refs: Vec<String> = versions.iter().map(VersionRecord::versioned_ref).collect();

        let tag = listing_tag(&refs);
        let etag = quote_etag(&tag);
        if Preconditions::from_headers(&parts.headers).check_not_modified(&tag) {
            return response::not_modified(&etag);
        }

        if wants_uri_list(accept_header(parts).as_deref()) {
            let uris: Vec<String> = refs.iter().map(|r| self.location(r)).collect();
            response::uri_list(&uris, Some(&etag), head)
        } else {
            response::json(&serde_json::json!(refs), Some(&etag), head)
        }
    }
}

/// Common content headers for version responses.
fn content_headers(
    mut builder: http::response::Builder,
    version: &VersionRecord,
    etag: &str,
    content_location: Option<&str>,
) -> http::response::Builder {
    builder = builder
        .header(ETAG, etag)
        .header(ACCEPT_RANGES, "bytes")
        .header(
            CONTENT_TYPE,
            version
                .metadata
                .content_type
                .as_deref()
                .unwrap_or("application/octet-stream"),
        );
    if let Some(md5) = &version.metadata.content_md5 {
        builder = builder.header("content-md5", md5);
    }
    if let Some(sha256) = &version.metadata.content_sha256 {
        builder = builder.header("content-sha256", sha256);
    }
    if let Some(disposition) = &version.metadata.content_disposition {
        builder = builder.header(CONTENT_DISPOSITION, disposition);
    }
    if let Some(location) = content_location {
        builder = builder.header(CONTENT_LOCATION, location);
    }
    builder
}
