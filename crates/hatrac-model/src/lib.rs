//! Data model for the Hatrac naming hierarchy.
//!
//! - [`name`]: hierarchical paths and the percent-encoding codec that
//!   respects the `/ : ;` URL meta-syntax.
//! - [`acl`]: access classes, per-kind ACL name sets, and the ACL document
//!   stored with every resource.
//! - [`resource`]: records for namespaces, objects, versions, upload jobs,
//!   and the aux record that can override storage addressing.
//! - [`meta`]: content metadata fields, header validation, and the upload
//!   job request body.

pub mod acl;
pub mod meta;
pub mod name;
pub mod resource;

pub use acl::{Access, AclSet};
pub use name::NamePath;
pub use resource::{AuxRecord, NamespaceRecord, ObjectRecord, UploadRecord, VersionRecord};
