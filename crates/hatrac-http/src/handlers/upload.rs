//! The `;upload` subresource: the chunked-upload job state machine.
//!
//! A job is created with declared chunk and content lengths, receives
//! chunks at positions `0..⌈content/chunk⌉`, and terminates by
//! finalization (yielding a new version) or cancellation. Finalized and
//! cancelled jobs disappear; a second finalization is a 404. Deleting the
//! target object implicitly cancels its open jobs.

use hyper::body::Incoming;
use tracing::info;

use hatrac_core::ids::generate_job_id;
use hatrac_core::{ClientContext, HatracError, HatracResult};
use hatrac_directory::authz::Action;
use hatrac_directory::store::Resolved;
use hatrac_model::acl::Access;
use hatrac_model::meta::UploadJobRequest;
use hatrac_model::resource::{NameKind, UploadRecord};

use crate::body::HatracBody;
use crate::handlers::{accept_header, body_stream, required_content_length};
use crate::negotiate::wants_uri_list;
use crate::preconditions::quote_etag;
use crate::provider::{HatracProvider, enforce, listing_tag};
use crate::response;
use crate::router::Target;

impl HatracProvider {
    /// POST on `;upload`: create a new chunked-upload job. The target
    /// object is created first when the name is still unbound.
    pub(crate) async fn upload_create(
        &self,
        target: &Target,
        payload: &bytes::Bytes,
        ctx: &ClientContext,
    ) -> HatracResult<http::Response<HatracBody>> {
        if target.version.is_some() {
            return Err(HatracError::bad_request(
                "upload jobs address an object, not a version",
            ));
        }

        let request: UploadJobRequest = serde_json::from_slice(payload)
            .map_err(|e| HatracError::bad_request(format!("invalid upload request: {e}")))?;
        let metadata = request.validated_metadata()?;

        let resolved = match self.directory().resolve(&target.path).await? {
            Some(resolved) if resolved.is_live() => match resolved.kind() {
                NameKind::Object => resolved,
                NameKind::Namespace => {
                    return Err(HatracError::conflict(format!(
                        "{} is not an object",
                        target.path
                    )));
                }
            },
            Some(_) => {
                return Err(HatracError::conflict(format!(
                    "name {} was deleted and cannot be reused",
                    target.path
                )));
            }
            None => {
                self.directory()
                    .create_name(&target.path, NameKind::Object, false, &self.authz(), ctx)
                    .await?
            }
        };

        enforce(self, Action::Update, resolved.acls(), &resolved.ancestors, ctx)?;
        let object = resolved
            .as_object()
            .ok_or_else(|| HatracError::Internal(anyhow::anyhow!("upload on non-object")))?;

        let content_length = u64::try_from(request.content_length)
            .map_err(|_| HatracError::bad_request("content-length must be non-negative"))?;
        let handle = self
            .storage()
            .create_upload(&object.path, content_length, &metadata)
            .await?;

        let job_key = generate_job_id();
        let upload = self
            .directory()
            .create_upload(
                object,
                &job_key,
                request.chunk_length,
                request.content_length,
                &metadata,
                &handle,
                ctx,
            )
            .await?;

        info!(path = %object.path, job = %job_key, "created upload job");
        response::created(&self.location(&upload.job_ref()), None)
    }

    /// GET/HEAD on `;upload`: list an object's open jobs.
    pub(crate) async fn upload_list(
        &self,
        parts: &http::request::Parts,
        target: &Target,
        ctx: &ClientContext,
        head: bool,
    ) -> HatracResult<http::Response<HatracBody>> {
        let resolved = self.resolve_live(&target.path).await?;
        let object = resolved.as_object().ok_or_else(|| {
            HatracError::not_found(format!("{} is not an object", target.path))
        })?;
        enforce(self, Action::Update, resolved.acls(), &resolved.ancestors, ctx)?;

        let uploads = self.directory().enumerate_uploads(object).await?;
        let refs: Vec<String> = uploads.iter().map(UploadRecord::job_ref).collect();
        let etag = quote_etag(&listing_tag(&refs));

        if wants_uri_list(accept_header(parts).as_deref()) {
            let uris: Vec<String> = refs.iter().map(|r| self.location(r)).collect();
            response::uri_list(&uris, Some(&etag), head)
        } else {
            response::json(&serde_json::json!(refs), Some(&etag), head)
        }
    }

    /// GET/HEAD on one job: its declared geometry and metadata.
    pub(crate) async fn upload_status(
        &self,
        target: &Target,
        job_key: &str,
        ctx: &ClientContext,
        head: bool,
    ) -> HatracResult<http::Response<HatracBody>> {
        let (resolved, upload) = self.upload_context(target, job_key).await?;
        self.authorize_upload(&resolved, &upload, ctx)?;

        let owners: Vec<&String> = upload.owner.get(Access::Owner).iter().collect();
        let status = serde_json::json!({
            "url": self.location(&upload.job_ref()),
            "target": upload.path.encoded(),
            "owner": owners,
            "chunk-length": upload.chunk_length,
            "content-length": upload.content_length,
            "chunks-received": upload.chunk_aux.len(),
        });
        response::json(&status, None, head)
    }

    /// PUT on `;upload/<job>/<n>`: store one chunk.
    pub(crate) async fn upload_chunk(
        &self,
        parts: &http::request::Parts,
        body: Incoming,
        target: &Target,
        job_key: &str,
        chunk: i64,
        ctx: &ClientContext,
    ) -> HatracResult<http::Response<HatracBody>> {
        let (resolved, upload) = self.upload_context(target, job_key).await?;
        self.authorize_upload(&resolved, &upload, ctx)?;

        if chunk < 0 {
            return Err(HatracError::bad_request("chunk number must not be negative"));
        }
        if chunk >= upload.total_chunks() {
            return Err(HatracError::conflict(format!(
                "chunk {chunk} is out of range for {} chunks",
                upload.total_chunks()
            )));
        }

        let expected = upload.chunk_size_at(chunk) as u64;
        let nbytes = required_content_length(parts)?;
        if nbytes != expected {
            return Err(HatracError::bad_request(format!(
                "chunk {chunk} must be {expected} bytes, not {nbytes}"
            )));
        }

        let aux = self
            .storage()
            .upload_chunk(
                &upload.path,
                &upload.backend_handle,
                chunk as u64,
                upload.chunk_length as u64,
                nbytes,
                body_stream(body),
            )
            .await?;
        self.directory().record_chunk(upload.id, chunk, aux).await?;
        response::no_content(None)
    }

    /// POST on one job: finalize into a new version.
    pub(crate) async fn upload_finalize(
        &self,
        target: &Target,
        job_key: &str,
        ctx: &ClientContext,
    ) -> HatracResult<http::Response<HatracBody>> {
        let (resolved, upload) = self.upload_context(target, job_key).await?;
        self.authorize_upload(&resolved, &upload, ctx)?;

        let total = upload.total_chunks();
        let received = upload.chunk_aux.len() as i64;
        if received < total {
            return Err(HatracError::conflict(format!(
                "upload incomplete: {received} of {total} chunks received"
            )));
        }

        let chunks: Vec<(i64, serde_json::Value)> = upload
            .chunk_aux
            .iter()
            .map(|(position, aux)| (*position, aux.clone()))
            .collect();
        let stored = self
            .storage()
            .finalize_upload(&upload.path, &upload.backend_handle, &chunks, &upload.metadata)
            .await?;

        let version = self
            .directory()
            .finalize_upload(&upload, &stored.version, stored.digests.as_ref(), &stored.aux)
            .await?;

        info!(path = %upload.path, job = job_key, version = stored.version, "finalized upload");
        let etag = version.version_key.as_deref().map(quote_etag);
        response::created(&self.location(&version.versioned_ref()), etag.as_deref())
    }

    /// DELETE on one job: cancel and release the backend reservation.
    pub(crate) async fn upload_cancel(
        &self,
        target: &Target,
        job_key: &str,
        ctx: &ClientContext,
    ) -> HatracResult<http::Response<HatracBody>> {
        let (resolved, upload) = self.upload_context(target, job_key).await?;
        self.authorize_upload(&resolved, &upload, ctx)?;

        self.storage()
            .cancel_upload(&upload.path, &upload.backend_handle)
            .await?;
        self.directory().cancel_upload(upload.id).await?;
        info!(path = %upload.path, job = job_key, "cancelled upload");
        response::no_content(None)
    }

    async fn upload_context(
        &self,
        target: &Target,
        job_key: &str,
    ) -> HatracResult<(Resolved, UploadRecord)> {
        let resolved = self.resolve_live(&target.path).await?;
        let object = resolved.as_object().ok_or_else(|| {
            HatracError::not_found(format!("{} is not an object", target.path))
        })?;
        let upload = self
            .directory()
            .upload_resolve(object, job_key)
            .await?
            .ok_or_else(|| {
                HatracError::not_found(format!(
                    "upload {};upload/{job_key} not available",
                    target.path.encoded()
                ))
            })?;
        Ok((resolved, upload))
    }

    /// A job may be operated by anyone with object update rights, or by
    /// the job's own recorded owners (still subject to the create
    /// firewall).
    fn authorize_upload(
        &self,
        resolved: &Resolved,
        upload: &UploadRecord,
        ctx: &ClientContext,
    ) -> HatracResult<()> {
        match enforce(self, Action::Update, resolved.acls(), &resolved.ancestors, ctx) {
            Ok(()) => Ok(()),
            Err(denied) => {
                let roles = ctx.effective_roles();
                if upload.owner.matches(Access::Owner, &roles) {
                    self.authz().enforce_firewall(Action::Update, ctx)
                } else {
                    Err(denied)
                }
            }
        }
    }
}
