//! The HTTP layer of the Hatrac service.
//!
//! Requests flow through a hand-rolled pipeline on hyper:
//!
//! ```text
//! HTTP Request
//!   -> HatracService (hyper Service)
//!     -> service prefix check, request id, client context
//!     -> router (path grammar: '/' segments, ':' version, ';' subresource)
//!     -> dispatch by (subresource, method) to the resource handlers
//!     -> HatracProvider (directory + storage + authorization)
//!     -> response composition (streaming body, redirect, or JSON)
//!   <- HTTP Response (errors negotiated against configured templates)
//! ```
//!
//! - [`router`]: URL codec honoring the `/ : ;` meta-syntax.
//! - [`preconditions`]: ETag model and `If-Match` / `If-None-Match`.
//! - [`range`]: single-range parsing with the 416/501/ignore rules.
//! - [`negotiate`]: Accept negotiation for listings and error bodies.
//! - [`body`]: the response body enum (empty, buffered, streaming).
//! - [`provider`]: shared state handed to every handler.
//! - [`handlers`]: per-resource-kind request handlers.
//! - [`service`]: the hyper `Service` tying it all together.

pub mod body;
pub mod handlers;
pub mod negotiate;
pub mod preconditions;
pub mod provider;
pub mod range;
pub mod response;
pub mod router;
pub mod service;

pub use body::HatracBody;
pub use provider::HatracProvider;
pub use service::HatracService;
