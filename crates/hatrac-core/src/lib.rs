//! Core building blocks for the Hatrac object-storage service.
//!
//! This crate holds the pieces every other Hatrac crate depends on:
//!
//! - [`config`]: the JSON service configuration (`hatrac_config.json`),
//!   including firewall ACLs, storage backend selection, and error
//!   templates.
//! - [`error`]: the closed [`HatracError`](error::HatracError) sum type that
//!   every fallible operation returns. Status codes are derived at the
//!   response boundary, never inside business logic.
//! - [`context`]: the per-request client identity and role set supplied by
//!   the authentication adapter.
//! - [`digest`]: streaming MD5/SHA-256 computation and the base64 codec
//!   used by `Content-MD5` / `Content-SHA256` headers.
//! - [`ids`]: random URL-safe identifier generation for versions, upload
//!   jobs, and requests.

pub mod config;
pub mod context;
pub mod digest;
pub mod error;
pub mod ids;

pub use config::HatracConfig;
pub use context::ClientContext;
pub use error::{HatracError, HatracResult};
