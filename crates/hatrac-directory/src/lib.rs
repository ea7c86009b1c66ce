//! The Hatrac metadata directory.
//!
//! The directory is the authoritative, transactional record of the naming
//! hierarchy: namespaces, objects, versions, ACLs, metadata, and chunked
//! upload jobs. Bulk bytes live in a storage backend; every structural
//! invariant is enforced here, inside database transactions with a bounded
//! retry loop around serialization conflicts.
//!
//! [`authz`] implements the authorization engine: service-wide firewall
//! ACLs intersected with per-resource ACLs under ancestral `subtree-*`
//! inheritance.

pub mod authz;
pub mod store;

pub use authz::{Action, Authz};
pub use store::{AclTarget, AclUpdate, Directory, NameDeletion, Resolved, ResolvedNode};
