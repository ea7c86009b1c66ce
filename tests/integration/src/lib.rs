//! End-to-end tests for a running Hatrac server.
//!
//! These tests require a live server; point `HATRAC_ENDPOINT_URL` at it
//! (default `http://localhost:8080/hatrac`). They are marked `#[ignore]`
//! so they don't run during a normal `cargo test`.
//!
//! Run them with:
//! ```text
//! cargo test -p hatrac-integration -- --ignored --test-threads=1
//! ```
//!
//! The server must trust the `X-Hatrac-Client` / `X-Hatrac-Roles`
//! headers (the default authentication adapter) and have been deployed
//! with an admin role of `hatrac-tester`, e.g.:
//! ```text
//! hatrac-server deploy hatrac-tester
//! ```

use std::sync::Once;

use base64::Engine;
use digest::Digest;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Endpoint URL for the server, including the service prefix.
#[must_use]
pub fn endpoint_url() -> String {
    std::env::var("HATRAC_ENDPOINT_URL")
        .unwrap_or_else(|_| "http://localhost:8080/hatrac".to_owned())
}

/// The client identity every test request authenticates as.
pub const TEST_CLIENT: &str = "hatrac-tester";

/// Create a configured HTTP client.
#[must_use]
pub fn client() -> reqwest::Client {
    init_tracing();

    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        "x-hatrac-client",
        reqwest::header::HeaderValue::from_static(TEST_CLIENT),
    );
    reqwest::Client::builder()
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap_or_else(|e| panic!("failed to build client: {e}"))
}

/// Generate a unique namespace name for a test.
#[must_use]
pub fn test_namespace_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// Absolute URL for a path under the service prefix.
#[must_use]
pub fn url(path: &str) -> String {
    format!("{}{path}", endpoint_url())
}

/// The path portion of the endpoint URL (the service prefix).
#[must_use]
pub fn service_prefix() -> String {
    let endpoint = endpoint_url();
    match endpoint.find("://") {
        Some(scheme_end) => {
            let rest = &endpoint[scheme_end + 3..];
            match rest.find('/') {
                Some(path_start) => rest[path_start..].to_owned(),
                None => String::new(),
            }
        }
        None => endpoint,
    }
}

/// Reduce a `Location` header (absolute or prefix-relative) to a path
/// under the service prefix, usable with [`url`].
#[must_use]
pub fn location_path(location: &str) -> String {
    if let Some(path) = location.strip_prefix(&endpoint_url()) {
        return path.to_owned();
    }
    let prefix = service_prefix();
    if !prefix.is_empty() {
        if let Some(path) = location.strip_prefix(&prefix) {
            return path.to_owned();
        }
    }
    location.to_owned()
}

/// Base64 MD5 of a payload, the `Content-MD5` wire form.
#[must_use]
pub fn content_md5(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(md5::Md5::digest(data))
}

/// Base64 SHA-256 of a payload, the `Content-SHA256` wire form.
#[must_use]
pub fn content_sha256(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(sha2::Sha256::digest(data))
}

/// Create a namespace and return its path.
pub async fn create_test_namespace(client: &reqwest::Client, prefix: &str) -> String {
    let path = format!("/{}", test_namespace_name(prefix));
    let response = client
        .put(url(&path))
        .header("content-type", "application/x-hatrac-namespace")
        .send()
        .await
        .unwrap_or_else(|e| panic!("namespace create failed: {e}"));
    assert_eq!(response.status(), 201, "creating {path}");
    path
}

mod test_acl;
mod test_namespace;
mod test_object;
mod test_precondition;
mod test_range;
mod test_upload;
