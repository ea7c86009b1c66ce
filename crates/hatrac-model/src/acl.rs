//! Access control lists.
//!
//! Every resource carries an ACL document: a map from access class to a
//! set of role strings. Which classes are meaningful depends on the
//! resource kind; `subtree-*` classes only take effect through ancestral
//! inheritance. The wildcard role `*` admits anonymous clients.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The wildcard role admitting any client, including anonymous ones.
pub const ANONYMOUS: &str = "*";

// ---------------------------------------------------------------------------
// Access
// ---------------------------------------------------------------------------

/// An access class that an ACL can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Access {
    /// Full control of the resource.
    Owner,
    /// Create child names under a namespace.
    Create,
    /// Create new versions of an object.
    Update,
    /// Read version content and metadata.
    Read,
    /// Ownership of everything below this node.
    SubtreeOwner,
    /// Create names anywhere below this node.
    SubtreeCreate,
    /// Update objects anywhere below this node.
    SubtreeUpdate,
    /// Read content anywhere below this node.
    SubtreeRead,
}

impl Access {
    /// Canonical kebab-case name, as used in `;acl/<access>` URLs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Create => "create",
            Self::Update => "update",
            Self::Read => "read",
            Self::SubtreeOwner => "subtree-owner",
            Self::SubtreeCreate => "subtree-create",
            Self::SubtreeUpdate => "subtree-update",
            Self::SubtreeRead => "subtree-read",
        }
    }

    /// The `subtree-*` class that contributes to this access through
    /// ancestors, if any.
    #[must_use]
    pub fn subtree_equivalent(&self) -> Option<Self> {
        match self {
            Self::Owner => Some(Self::SubtreeOwner),
            Self::Create => Some(Self::SubtreeCreate),
            Self::Update => Some(Self::SubtreeUpdate),
            Self::Read => Some(Self::SubtreeRead),
            _ => None,
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an [`Access`] from a string fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown access class: {0}")]
pub struct ParseAccessError(String);

impl FromStr for Access {
    type Err = ParseAccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "read" => Ok(Self::Read),
            "subtree-owner" => Ok(Self::SubtreeOwner),
            "subtree-create" => Ok(Self::SubtreeCreate),
            "subtree-update" => Ok(Self::SubtreeUpdate),
            "subtree-read" => Ok(Self::SubtreeRead),
            _ => Err(ParseAccessError(s.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// Resource kinds and their ACL name sets
// ---------------------------------------------------------------------------

/// The kind of node an ACL document is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclResourceKind {
    /// An interior namespace node.
    Namespace,
    /// An object leaf node.
    Object,
    /// A single object version.
    Version,
}

impl AclResourceKind {
    /// The access classes meaningful on this resource kind.
    #[must_use]
    pub fn acl_names(&self) -> &'static [Access] {
        match self {
            Self::Namespace => &[
                Access::Owner,
                Access::Create,
                Access::SubtreeOwner,
                Access::SubtreeCreate,
                Access::SubtreeUpdate,
                Access::SubtreeRead,
            ],
            Self::Object => &[
                Access::Owner,
                Access::Update,
                Access::SubtreeOwner,
                Access::SubtreeRead,
            ],
            Self::Version => &[Access::Owner, Access::Read],
        }
    }

    /// Whether `access` is a meaningful class on this kind.
    #[must_use]
    pub fn allows(&self, access: Access) -> bool {
        self.acl_names().contains(&access)
    }
}

// ---------------------------------------------------------------------------
// AclSet
// ---------------------------------------------------------------------------

/// The ACL document of one resource: access class to role set.
///
/// Serialized as a JSON object of arrays, which is both the database
/// column format and the `;acl` wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AclSet {
    entries: BTreeMap<Access, BTreeSet<String>>,
}

impl AclSet {
    /// An empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document granting `owner` to one role, the initial ACL for
    /// newly created resources.
    #[must_use]
    pub fn owned_by(role: impl Into<String>) -> Self {
        let mut acl = Self::new();
        acl.add_role(Access::Owner, role.into());
        acl
    }

    /// The role set for an access class (empty if unset).
    #[must_use]
    pub fn get(&self, access: Access) -> &BTreeSet<String> {
        static EMPTY: std::sync::OnceLock<BTreeSet<String>> = std::sync::OnceLock::new();
        self.entries
            .get(&access)
            .unwrap_or_else(|| EMPTY.get_or_init(BTreeSet::new))
    }

    /// Replace the role list for an access class.
    pub fn set(&mut self, access: Access, roles: impl IntoIterator<Item = String>) {
        self.entries.insert(access, roles.into_iter().collect());
    }

    /// Clear the role list for an access class.
    pub fn clear(&mut self, access: Access) {
        self.entries.remove(&access);
    }

    /// Add one role to an access class.
    pub fn add_role(&mut self, access: Access, role: impl Into<String>) {
        self.entries.entry(access).or_default().insert(role.into());
    }

    /// Remove one role from an access class; reports whether it was
    /// present.
    pub fn remove_role(&mut self, access: Access, role: &str) -> bool {
        self.entries
            .get_mut(&access)
            .is_some_and(|set| set.remove(role))
    }

    /// Whether any role in `roles` (or the wildcard) appears in the ACL
    /// for `access`.
    #[must_use]
    pub fn matches(&self, access: Access, roles: &BTreeSet<&str>) -> bool {
        let Some(acl) = self.entries.get(&access) else {
            return false;
        };
        acl.contains(ANONYMOUS) || acl.iter().any(|role| roles.contains(role.as_str()))
    }

    /// Render the document keeping only the classes meaningful for `kind`,
    /// with every class present (missing ones as empty arrays). This is
    /// the `;acl` collection wire format.
    #[must_use]
    pub fn to_wire(&self, kind: AclResourceKind) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for access in kind.acl_names() {
            let roles: Vec<&String> = self.get(*access).iter().collect();
            map.insert(
                access.as_str().to_owned(),
                serde_json::json!(roles),
            );
        }
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_should_parse_and_display_access_names() {
        for access in AclResourceKind::Namespace.acl_names() {
            let parsed: Access = access.as_str().parse().expect("round trip");
            assert_eq!(parsed, *access);
        }
        assert!("subtree-write".parse::<Access>().is_err());
    }

    #[test]
    fn test_should_limit_acl_names_per_kind() {
        assert!(AclResourceKind::Namespace.allows(Access::SubtreeCreate));
        assert!(!AclResourceKind::Namespace.allows(Access::Read));
        assert!(AclResourceKind::Object.allows(Access::Update));
        assert!(!AclResourceKind::Object.allows(Access::Create));
        assert!(AclResourceKind::Version.allows(Access::Read));
        assert!(!AclResourceKind::Version.allows(Access::SubtreeRead));
    }

    #[test]
    fn test_should_match_roles_against_acl() {
        let mut acl = AclSet::new();
        acl.set(Access::Read, roles(&["staff", "analyst"]));

        let staff: BTreeSet<&str> = ["staff"].into_iter().collect();
        let outsider: BTreeSet<&str> = ["visitor"].into_iter().collect();
        assert!(acl.matches(Access::Read, &staff));
        assert!(!acl.matches(Access::Read, &outsider));
        assert!(!acl.matches(Access::Owner, &staff));
    }

    #[test]
    fn test_should_match_wildcard_for_any_client() {
        let mut acl = AclSet::new();
        acl.add_role(Access::Read, ANONYMOUS);
        assert!(acl.matches(Access::Read, &BTreeSet::new()));
    }

    #[test]
    fn test_should_add_and_remove_roles() {
        let mut acl = AclSet::owned_by("alice");
        acl.add_role(Access::Owner, "bob");
        assert_eq!(acl.get(Access::Owner).len(), 2);

        assert!(acl.remove_role(Access::Owner, "bob"));
        assert!(!acl.remove_role(Access::Owner, "bob"));
        assert_eq!(acl.get(Access::Owner).len(), 1);
    }

    #[test]
    fn test_should_serialize_as_plain_json_object() {
        let mut acl = AclSet::new();
        acl.set(Access::SubtreeRead, roles(&["r1"]));
        let json = serde_json::to_value(&acl).expect("serialize");
        assert_eq!(json["subtree-read"], serde_json::json!(["r1"]));

        let back: AclSet = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, acl);
    }

    #[test]
    fn test_should_render_wire_form_with_all_kind_classes() {
        let acl = AclSet::owned_by("alice");
        let wire = acl.to_wire(AclResourceKind::Version);
        assert_eq!(wire["owner"], serde_json::json!(["alice"]));
        assert_eq!(wire["read"], serde_json::json!([]));
        assert!(wire.get("subtree-read").is_none());
    }
}
