//! Per-request client identity.
//!
//! Authentication is an external collaborator: the service only consumes a
//! client id plus a set of role strings. [`AuthnProvider`] is the seam; the
//! default [`TrustedHeaderAuthn`] adapter trusts headers injected by a
//! fronting authentication proxy, which is how deployments typically run.

use std::collections::BTreeSet;

use http::HeaderMap;

/// Header carrying the authenticated client identity.
const CLIENT_HEADER: &str = "x-hatrac-client";

/// Header carrying a comma-separated list of role attributes.
const ROLES_HEADER: &str = "x-hatrac-roles";

/// The authenticated client for one request: an optional client id and a
/// set of role attributes. An absent id with no roles is the anonymous
/// context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    /// Primary client identity, if authenticated.
    pub client: Option<String>,
    /// Role attributes granted to the client.
    pub roles: BTreeSet<String>,
}

impl ClientContext {
    /// The anonymous context.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Build a context from a client id and roles, for tests and tools.
    #[must_use]
    pub fn new(client: impl Into<String>, roles: impl IntoIterator<Item = String>) -> Self {
        Self {
            client: Some(client.into()),
            roles: roles.into_iter().collect(),
        }
    }

    /// Whether the request carries no identity at all.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.client.is_none() && self.roles.is_empty()
    }

    /// Every role this client can act as: the client id itself plus all
    /// attributes.
    #[must_use]
    pub fn effective_roles(&self) -> BTreeSet<&str> {
        let mut roles: BTreeSet<&str> = self.roles.iter().map(String::as_str).collect();
        if let Some(client) = &self.client {
            roles.insert(client.as_str());
        }
        roles
    }
}

/// Adapter supplying the client context for a request.
pub trait AuthnProvider: Send + Sync + 'static {
    /// Derive the client context from request headers.
    fn context_for(&self, headers: &HeaderMap) -> ClientContext;
}

/// Authentication adapter that trusts `X-Hatrac-Client` and
/// `X-Hatrac-Roles` headers set by a fronting proxy. Requests without the
/// headers are anonymous.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustedHeaderAuthn;

impl AuthnProvider for TrustedHeaderAuthn {
    fn context_for(&self, headers: &HeaderMap) -> ClientContext {
        let client = headers
            .get(CLIENT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned);

        let roles = headers
            .get(ROLES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        ClientContext { client, roles }
    }
}
