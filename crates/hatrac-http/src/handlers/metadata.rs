//! The `;metadata` subresource.
//!
//! Metadata lives on versions; addressing an object routes to its
//! current version. `content-type` and `content-disposition` are
//! mutable; the digest fields are immutable once set.

use bytes::Bytes;

use hatrac_core::digest::{validate_md5_b64, validate_sha256_b64};
use hatrac_core::{ClientContext, HatracError, HatracResult};
use hatrac_directory::authz::Action;
use hatrac_directory::store::Resolved;
use hatrac_model::meta::{MetadataField, validate_content_disposition};
use hatrac_model::resource::VersionRecord;

use crate::body::HatracBody;
use crate::preconditions::quote_etag;
use crate::provider::{HatracProvider, enforce};
use crate::response;
use crate::router::Target;

impl HatracProvider {
    /// Resolve the version a metadata reference addresses.
    async fn metadata_version(
        &self,
        target: &Target,
    ) -> HatracResult<(Resolved, VersionRecord)> {
        let resolved = self.resolve_live(&target.path).await?;
        let object = resolved.as_object().ok_or_else(|| {
            HatracError::not_found(format!("{} is not an object", target.path))
        })?;
        let version = match &target.version {
            Some(key) => self.require_version(object, key).await?,
            None => self.require_current_version(object).await?,
        };
        Ok((resolved, version))
    }

    /// GET/HEAD on the metadata collection or a single field.
    pub(crate) async fn metadata_get(
        &self,
        target: &Target,
        field: Option<MetadataField>,
        ctx: &ClientContext,
        head: bool,
    ) -> HatracResult<http::Response<HatracBody>> {
        let (resolved, version) = self.metadata_version(target).await?;
        enforce(self, Action::Read, &version.acls, &resolved.version_chain(), ctx)?;

        let etag = version.version_key.as_deref().map(quote_etag);
        match field {
            None => response::json(&version.metadata.to_wire(), etag.as_deref(), head),
            Some(field) => {
                let value = version.metadata.get(field).ok_or_else(|| {
                    HatracError::not_found(format!(
                        "metadata field {field} not set on {}",
                        version.versioned_ref()
                    ))
                })?;
                response::text(format!("{value}\n"), etag.as_deref(), head)
            }
        }
    }

    /// PUT on a single metadata field.
    pub(crate) async fn metadata_put(
        &self,
        target: &Target,
        field: MetadataField,
        payload: &Bytes,
        ctx: &ClientContext,
    ) -> HatracResult<http::Response<HatracBody>> {
        let (resolved, version) = self.metadata_version(target).await?;
        enforce(
            self,
            Action::ManageMetadata,
            resolved.acls(),
            &resolved.ancestors,
            ctx,
        )?;

        let text = std::str::from_utf8(payload)
            .map_err(|_| HatracError::bad_request("metadata value must be UTF-8 text"))?
            .trim();
        if text.is_empty() {
            return Err(HatracError::bad_request("metadata value must not be empty"));
        }
        let value = validate_field_value(field, text)?;

        self.directory()
            .set_metadata_field(version.id, field, Some(value))
            .await?;
        response::no_content(None)
    }

    /// DELETE on a single metadata field. Digest fields cannot be
    /// removed; the store reports the conflict.
    pub(crate) async fn metadata_delete(
        &self,
        target: &Target,
        field: MetadataField,
        ctx: &ClientContext,
    ) -> HatracResult<http::Response<HatracBody>> {
        let (resolved, version) = self.metadata_version(target).await?;
        enforce(
            self,
            Action::ManageMetadata,
            resolved.acls(),
            &resolved.ancestors,
            ctx,
        )?;

        self.directory()
            .set_metadata_field(version.id, field, None)
            .await?;
        response::no_content(None)
    }
}

/// Validate and canonicalize a metadata field value.
fn validate_field_value(field: MetadataField, text: &str) -> HatracResult<String> {
    match field {
        MetadataField::ContentMd5 => validate_md5_b64(text),
        MetadataField::ContentSha256 => validate_sha256_b64(text),
        MetadataField::ContentDisposition => {
            validate_content_disposition(text)?;
            Ok(text.to_owned())
        }
        MetadataField::ContentType => {
            if !text.contains('/') {
                return Err(HatracError::bad_request(
                    "content-type must be a media type",
                ));
            }
            Ok(text.to_owned())
        }
    }
}
