//! The `;acl` subresource.
//!
//! ACLs are readable and writable only by owners (plus the manage_acls
//! firewall). Conditional requests compare against a content hash of the
//! ACL document and are evaluated after authorization so state never
//! leaks to unauthorized probes. Updates that would leave a resource
//! without any owner are rejected.

use bytes::Bytes;

use hatrac_core::{ClientContext, HatracError, HatracResult};
use hatrac_directory::authz::Action;
use hatrac_directory::store::{AclTarget, AclUpdate, ResolvedNode};
use hatrac_model::acl::{Access, AclResourceKind, AclSet};

use crate::body::HatracBody;
use crate::preconditions::{Preconditions, quote_etag};
use crate::provider::{HatracProvider, acl_tag, enforce};
use crate::response;
use crate::router::Target;

/// The resolved addressing of one ACL reference.
struct AclContext {
    kind: AclResourceKind,
    acls: AclSet,
    chain: Vec<AclSet>,
    target: AclTarget,
}

impl HatracProvider {
    async fn acl_context(&self, target: &Target) -> HatracResult<AclContext> {
        let resolved = self.resolve_live(&target.path).await?;
        match &target.version {
            Some(key) => {
                let object = resolved.as_object().ok_or_else(|| {
                    HatracError::not_found(format!("{} is not an object", target.path))
                })?;
                let version = self.require_version(object, key).await?;
                Ok(AclContext {
                    kind: AclResourceKind::Version,
                    acls: version.acls.clone(),
                    chain: resolved.version_chain(),
                    target: AclTarget::Version(version.id),
                })
            }
            None => {
                let (kind, target_id) = match &resolved.node {
                    ResolvedNode::Namespace(ns) => {
                        (AclResourceKind::Namespace, AclTarget::Namespace(ns.id))
                    }
                    ResolvedNode::Object(obj) => {
                        (AclResourceKind::Object, AclTarget::Object(obj.id))
                    }
                };
                Ok(AclContext {
                    kind,
                    acls: resolved.acls().clone(),
                    chain: resolved.ancestors.clone(),
                    target: target_id,
                })
            }
        }
    }

    /// GET/HEAD on the ACL collection, one list, or one entry.
    pub(crate) async fn acl_get(
        &self,
        target: &Target,
        access: Option<Access>,
        entry: Option<&str>,
        ctx: &ClientContext,
        head: bool,
    ) -> HatracResult<http::Response<HatracBody>> {
        let actx = self.acl_context(target).await?;
        enforce(self, Action::ManageAcls, &actx.acls, &actx.chain, ctx)?;

        let etag = quote_etag(&acl_tag(&actx.acls));
        match (access, entry) {
            (None, _) => response::json(&actx.acls.to_wire(actx.kind), Some(&etag), head),
            (Some(access), None) => {
                check_access_kind(actx.kind, access)?;
                let roles: Vec<&String> = actx.acls.get(access).iter().collect();
                response::json(&serde_json::json!(roles), Some(&etag), head)
            }
            (Some(access), Some(entry)) => {
                check_access_kind(actx.kind, access)?;
                if !actx.acls.get(access).contains(entry) {
                    return Err(HatracError::not_found(format!(
                        "ACL member {access}/{entry} not found"
                    )));
                }
                response::text(format!("{entry}\n"), Some(&etag), head)
            }
        }
    }

    /// PUT on an ACL list (JSON array body) or entry (no body).
    pub(crate) async fn acl_put(
        &self,
        parts: &http::request::Parts,
        target: &Target,
        access: Option<Access>,
        entry: Option<&str>,
        payload: &Bytes,
        ctx: &ClientContext,
    ) -> HatracResult<http::Response<HatracBody>> {
        let access = access.ok_or(HatracError::MethodNotAllowed)?;
        let actx = self.acl_context(target).await?;
        check_access_kind(actx.kind, access)?;
        enforce(self, Action::ManageAcls, &actx.acls, &actx.chain, ctx)?;

        // Conditional ACL writes are evaluated only after authorization.
        Preconditions::from_headers(&parts.headers).check_write(Some(&acl_tag(&actx.acls)))?;

        let update = match entry {
            Some(role) => AclUpdate::AddEntry(role),
            None => {
                let roles: Vec<String> = serde_json::from_slice(payload).map_err(|_| {
                    HatracError::bad_request("ACL input must be a flat JSON array of strings")
                })?;
                if access == Access::Owner && roles.is_empty() {
                    return Err(HatracError::bad_request(
                        "owner ACL must retain at least one member",
                    ));
                }
                AclUpdate::Replace(roles)
            }
        };

        let updated = self.directory().update_acl(actx.target, access, update).await?;
        response::no_content(Some(&quote_etag(&acl_tag(&updated))))
    }

    /// DELETE on an ACL list (clear) or entry (remove).
    pub(crate) async fn acl_delete(
        &self,
        parts: &http::request::Parts,
        target: &Target,
        access: Option<Access>,
        entry: Option<&str>,
        ctx: &ClientContext,
    ) -> HatracResult<http::Response<HatracBody>> {
        let access = access.ok_or(HatracError::MethodNotAllowed)?;
        let actx = self.acl_context(target).await?;
        check_access_kind(actx.kind, access)?;
        enforce(self, Action::ManageAcls, &actx.acls, &actx.chain, ctx)?;

        Preconditions::from_headers(&parts.headers).check_write(Some(&acl_tag(&actx.acls)))?;

        let update = match entry {
            None => {
                if access == Access::Owner {
                    return Err(HatracError::bad_request(
                        "owner ACL must retain at least one member",
                    ));
                }
                AclUpdate::Clear
            }
            Some(role) => {
                let owners = actx.acls.get(Access::Owner);
                if access == Access::Owner && owners.len() == 1 && owners.contains(role) {
                    return Err(HatracError::bad_request(
                        "owner ACL must retain at least one member",
                    ));
                }
                AclUpdate::RemoveEntry(role)
            }
        };

        let updated = self.directory().update_acl(actx.target, access, update).await?;
        response::no_content(Some(&quote_etag(&acl_tag(&updated))))
    }
}

fn check_access_kind(kind: AclResourceKind, access: Access) -> HatracResult<()> {
    if !kind.allows(access) {
        return Err(HatracError::bad_request(format!(
            "ACL name {access} is not valid for this resource"
        )));
    }
    Ok(())
}
