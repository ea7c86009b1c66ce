//! Authorization engine.
//!
//! Every decision intersects two filters:
//!
//! 1. **Firewall ACLs**: service-wide role lists per operation class. A
//!    request must satisfy the applicable firewall ACL in addition to any
//!    resource ACLs; ownership does not bypass the firewall.
//! 2. **Resource ACLs with ancestral inheritance**: ownership (`owner` or
//!    `subtree-owner`) at the resource or any ancestor grants all access;
//!    otherwise the effective permission set is the union of the
//!    resource's own ACL for the action and the matching `subtree-*` ACLs
//!    along the ancestor chain.
//!
//! Denial distinguishes anonymous clients (401) from authenticated ones
//! (403), matching the error taxonomy.

use hatrac_core::config::FirewallClass;
use hatrac_core::{ClientContext, HatracConfig, HatracError, HatracResult};
use hatrac_model::acl::{Access, AclSet, ANONYMOUS};

/// An operation to authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Bind a new child name under a namespace.
    CreateName,
    /// Create a new version of an object (including upload jobs).
    Update,
    /// Read content, metadata, or listings.
    Read,
    /// Delete a name or version. Ownership only.
    Delete,
    /// Read or write ACL subresources. Ownership only.
    ManageAcls,
    /// Write metadata subresources.
    ManageMetadata,
}

impl Action {
    /// The resource ACL class that grants this action directly, if any.
    /// Actions without one are granted by ownership alone.
    #[must_use]
    fn access(self) -> Option<Access> {
        match self {
            Self::CreateName => Some(Access::Create),
            Self::Update | Self::ManageMetadata => Some(Access::Update),
            Self::Read => Some(Access::Read),
            Self::Delete | Self::ManageAcls => None,
        }
    }

    /// The firewall class guarding this action, if any. Reads are not
    /// firewalled.
    #[must_use]
    fn firewall_class(self) -> Option<FirewallClass> {
        match self {
            Self::CreateName | Self::Update => Some(FirewallClass::Create),
            Self::Delete => Some(FirewallClass::Delete),
            Self::ManageAcls => Some(FirewallClass::ManageAcls),
            Self::ManageMetadata => Some(FirewallClass::ManageMetadata),
            Self::Read => None,
        }
    }
}

/// The authorization engine, parameterized by the service configuration.
#[derive(Debug, Clone, Copy)]
pub struct Authz<'a> {
    config: &'a HatracConfig,
}

impl<'a> Authz<'a> {
    /// Create an engine over the service configuration.
    #[must_use]
    pub fn new(config: &'a HatracConfig) -> Self {
        Self { config }
    }

    /// Authorize `action` on a resource with ACLs `resource`, whose
    /// ancestors' ACLs are `chain` (root first). Returns the appropriate
    /// denial error when not permitted.
    pub fn enforce(
        &self,
        action: Action,
        resource: &AclSet,
        chain: &[AclSet],
        ctx: &ClientContext,
    ) -> HatracResult<()> {
        if let Some(class) = action.firewall_class() {
            if !firewall_allows(self.config.firewall(class), ctx) {
                return Err(denial(ctx, "operation class"));
            }
        }

        let roles = ctx.effective_roles();

        // Ownership anywhere along the chain grants everything.
        if resource.matches(Access::Owner, &roles)
            || resource.matches(Access::SubtreeOwner, &roles)
        {
            return Ok(());
        }
        if chain.iter().any(|acl| {
            acl.matches(Access::Owner, &roles) || acl.matches(Access::SubtreeOwner, &roles)
        }) {
            return Ok(());
        }

        if let Some(access) = action.access() {
            if resource.matches(access, &roles) {
                return Ok(());
            }
            if let Some(subtree) = access.subtree_equivalent() {
                if resource.matches(subtree, &roles)
                    || chain.iter().any(|acl| acl.matches(subtree, &roles))
                {
                    return Ok(());
                }
            }
        }

        Err(denial(ctx, "resource"))
    }

    /// Check only the firewall filter for an action, without resource
    /// ACLs. Used by surfaces that gate on job-level ownership instead.
    pub fn enforce_firewall(&self, action: Action, ctx: &ClientContext) -> HatracResult<()> {
        if let Some(class) = action.firewall_class() {
            if !firewall_allows(self.config.firewall(class), ctx) {
                return Err(denial(ctx, "operation class"));
            }
        }
        Ok(())
    }
}

/// Whether the firewall list admits this client. The wildcard admits
/// anonymous clients.
fn firewall_allows(list: &[String], ctx: &ClientContext) -> bool {
    let roles = ctx.effective_roles();
    list.iter()
        .any(|role| role == ANONYMOUS || roles.contains(role.as_str()))
}

/// The denial error appropriate for this client.
fn denial(ctx: &ClientContext, what: &str) -> HatracError {
    if ctx.is_anonymous() {
        HatracError::Unauthorized(format!("authentication required for access to {what}"))
    } else {
        HatracError::Forbidden(format!("access to {what} forbidden"))
    }
}
