//! Bare-name handlers: namespace creation, listings, and deletion, plus
//! the PUT disambiguation between namespaces and objects.

use hyper::body::Incoming;
use tracing::info;

use hatrac_core::{ClientContext, HatracError, HatracResult};
use hatrac_directory::authz::Action;
use hatrac_directory::store::{Resolved, ResolvedNode};
use hatrac_model::resource::NameKind;

use crate::body::HatracBody;
use crate::handlers::{accept_header, content_type};
use crate::negotiate::wants_uri_list;
use crate::preconditions::{Preconditions, quote_etag};
use crate::provider::{HatracProvider, enforce, listing_tag};
use crate::response;
use crate::router::{Target, parse_query, wants_parents};

/// The content type that distinguishes namespace creation from an object
/// write.
pub(crate) const NAMESPACE_CONTENT_TYPE: &str = "application/x-hatrac-namespace";

impl HatracProvider {
    /// GET/HEAD on a bare or version-qualified name.
    pub(crate) async fn name_get(
        &self,
        parts: &http::request::Parts,
        target: &Target,
        ctx: &ClientContext,
        head: bool,
    ) -> HatracResult<http::Response<HatracBody>> {
        let resolved = self.resolve_live(&target.path).await?;
        match &resolved.node {
            ResolvedNode::Namespace(_) if target.version.is_some() => Err(
                HatracError::not_found(format!("{} is not an object", target.path)),
            ),
            ResolvedNode::Namespace(_) => {
                self.namespace_listing(parts, &resolved, ctx, head).await
            }
            ResolvedNode::Object(_) => {
                self.object_get(parts, &resolved, target.version.as_deref(), ctx, head)
                    .await
            }
        }
    }

    /// PUT on a bare name: create a namespace, create an object, or add a
    /// version to an existing object. An existing object always takes the
    /// body as content, whatever the request content type says.
    pub(crate) async fn name_put(
        &self,
        parts: &http::request::Parts,
        body: Incoming,
        target: &Target,
        ctx: &ClientContext,
    ) -> HatracResult<http::Response<HatracBody>> {
        let is_namespace_put = content_type(parts).as_deref() == Some(NAMESPACE_CONTENT_TYPE);

        match self.directory().resolve(&target.path).await? {
            Some(resolved) if resolved.is_live() => match resolved.kind() {
                NameKind::Object => self.object_update(parts, body, &resolved, ctx).await,
                NameKind::Namespace if is_namespace_put => Err(HatracError::conflict(format!(
                    "name {} already in use",
                    target.path
                ))),
                NameKind::Namespace => Err(HatracError::MethodNotAllowed),
            },
            Some(_) => Err(HatracError::conflict(format!(
                "name {} was deleted and cannot be reused",
                target.path
            ))),
            None => {
                let query = parse_query(parts.uri.query());
                let parents = wants_parents(&query);
                if is_namespace_put {
                    let resolved = self
                        .directory()
                        .create_name(
                            &target.path,
                            NameKind::Namespace,
                            parents,
                            &self.authz(),
                            ctx,
                        )
                        .await?;
                    info!(path = %target.path, "created namespace");
                    response::created(&self.location(&resolved.path().encoded()), None)
                } else {
                    // Evaluate preconditions before binding the name so a
                    // failed If-Match never leaves an empty object behind.
                    Preconditions::from_headers(&parts.headers).check_write(None)?;
                    let resolved = self
                        .directory()
                        .create_name(&target.path, NameKind::Object, parents, &self.authz(), ctx)
                        .await?;
                    self.object_update(parts, body, &resolved, ctx).await
                }
            }
        }
    }

    /// DELETE on a bare or version-qualified name.
    pub(crate) async fn name_delete(
        &self,
        parts: &http::request::Parts,
        target: &Target,
        ctx: &ClientContext,
    ) -> HatracResult<http::Response<HatracBody>> {
        if let Some(version_key) = &target.version {
            return self.version_delete(parts, target, version_key, ctx).await;
        }

        // Conditional object deletion compares against the current
        // version's ETag.
        let preconditions = Preconditions::from_headers(&parts.headers);
        if preconditions.is_conditional() {
            let resolved = self.resolve_live(&target.path).await?;
            if let Some(object) = resolved.as_object() {
                let current = self.directory().get_current_version(object).await?;
                preconditions
                    .check_write(current.as_ref().and_then(|v| v.version_key.as_deref()))?;
            }
        }

        let deletion = self
            .directory()
            .delete_name(&target.path, &self.authz(), ctx)
            .await?;
        self.cleanup_deletion(&target.path, &deletion).await;
        info!(path = %target.path, "deleted name");
        response::no_content(None)
    }

    /// GET/HEAD on a namespace: list direct children.
    async fn namespace_listing(
        &self,
        parts: &http::request::Parts,
        resolved: &Resolved,
        ctx: &ClientContext,
        head: bool,
    ) -> HatracResult<http::Response<HatracBody>> {
        enforce(self, Action::Read, resolved.acls(), &resolved.ancestors, ctx)?;
        let namespace = resolved
            .as_namespace()
            .ok_or_else(|| HatracError::Internal(anyhow::anyhow!("listing a non-namespace")))?;

        let children = self.directory().enumerate_children(namespace).await?;
        let paths: Vec<String> = children
            .iter()
            .map(|(_, name)| resolved.path().child(name.clone()).encoded())
            .collect();

        let tag = listing_tag(&paths);
        let etag = quote_etag(&tag);
        let preconditions = Preconditions::from_headers(&parts.headers);
        if preconditions.check_not_modified(&tag) {
            return response::not_modified(&etag);
        }

        if wants_uri_list(accept_header(parts).as_deref()) {
            let uris: Vec<String> = paths.iter().map(|p| self.location(p)).collect();
            response::uri_list(&uris, Some(&etag), head)
        } else {
            response::json(&serde_json::json!(paths), Some(&etag), head)
        }
    }
}
