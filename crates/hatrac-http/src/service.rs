//! The hyper `Service` for Hatrac.
//!
//! Each request gets a request id, an authenticated client context from
//! the configured adapter, and a routed dispatch into the handlers.
//! Errors are rendered through the configured templates; retryable
//! database conflicts never reach this layer.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::service::Service;
use tracing::{debug, info, warn};

use hatrac_core::context::AuthnProvider;
use hatrac_core::ids::generate_request_id;
use hatrac_core::{HatracError, HatracResult};

use crate::body::HatracBody;
use crate::handlers::dispatch;
use crate::negotiate::negotiate_error;
use crate::provider::HatracProvider;
use crate::router::parse_target;

/// The HTTP service: provider plus authentication adapter.
pub struct HatracService {
    provider: Arc<HatracProvider>,
    authn: Arc<dyn AuthnProvider>,
}

impl HatracService {
    /// Assemble the service.
    #[must_use]
    pub fn new(provider: Arc<HatracProvider>, authn: Arc<dyn AuthnProvider>) -> Self {
        Self { provider, authn }
    }
}

impl Clone for HatracService {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            authn: Arc::clone(&self.authn),
        }
    }
}

impl std::fmt::Debug for HatracService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HatracService").finish_non_exhaustive()
    }
}

impl Service<http::Request<Incoming>> for HatracService {
    type Response = http::Response<HatracBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let provider = Arc::clone(&self.provider);
        let authn = Arc::clone(&self.authn);

        Box::pin(async move {
            let request_id = generate_request_id();
            let method = req.method().clone();
            let uri = req.uri().clone();
            let accept = req
                .headers()
                .get(http::header::ACCEPT)
                .and_then(|v| v.to_str().ok())
                .map(ToOwned::to_owned);

            let response = match handle(&provider, authn.as_ref(), req).await {
                Ok(response) => response,
                Err(err) => error_response(&provider, accept.as_deref(), &err, &request_id),
            };

            info!(
                %method,
                %uri,
                status = response.status().as_u16(),
                request_id,
                "handled request"
            );
            Ok(add_common_headers(response, &request_id))
        })
    }
}

/// Run one request through routing, authentication, and dispatch.
async fn handle(
    provider: &HatracProvider,
    authn: &dyn AuthnProvider,
    req: http::Request<Incoming>,
) -> HatracResult<http::Response<HatracBody>> {
    let config = provider.config();

    let path = strip_prefix(&config.service_prefix, req.uri().path())?;
    let target = parse_target(&path, &config.allowed_url_char_class)?;
    let ctx = authn.context_for(req.headers());
    debug!(path = %target.path, client = ?ctx.client, "routed request");

    let (parts, body) = req.into_parts();
    dispatch(provider, parts, body, target, &ctx).await
}

/// Strip the service prefix; requests outside it do not exist.
fn strip_prefix(prefix: &str, path: &str) -> HatracResult<String> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return Ok(path.to_owned());
    }
    match path.strip_prefix(prefix) {
        Some("") => Ok("/".to_owned()),
        Some(rest) if rest.starts_with('/') || rest.starts_with(';') => Ok(if rest.starts_with(';')
        {
            format!("/{rest}")
        } else {
            rest.to_owned()
        }),
        _ => Err(HatracError::not_found("resource not found")),
    }
}

/// Render an error through the configured templates.
fn error_response(
    provider: &HatracProvider,
    accept: Option<&str>,
    err: &HatracError,
    request_id: &str,
) -> http::Response<HatracBody> {
    let status = err.status_code();
    if status.is_server_error() {
        warn!(request_id, error = %err, "request failed");
    } else {
        debug!(request_id, error = %err, "request rejected");
    }

    let (content_type, body) = negotiate_error(provider.config(), accept, err);
    http::Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, content_type)
        .header(http::header::CONTENT_LENGTH, body.len())
        .body(HatracBody::from_string(body))
        .unwrap_or_else(|_| {
            let mut response = http::Response::new(HatracBody::empty());
            *response.status_mut() = status;
            response
        })
}

/// Common response headers.
fn add_common_headers(
    mut response: http::Response<HatracBody>,
    request_id: &str,
) -> http::Response<HatracBody> {
    let headers = response.headers_mut();
    headers.insert(
        "server",
        http::header::HeaderValue::from_static("Hatrac"),
    );
    if let Ok(value) = http::header::HeaderValue::from_str(request_id) {
        headers.insert("x-hatrac-request-id", value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_strip_service_prefix() {
        assert_eq!(
            strip_prefix("/hatrac", "/hatrac/ns/obj").unwrap_or_default(),
            "/ns/obj"
        );
        assert_eq!(strip_prefix("/hatrac", "/hatrac").unwrap_or_default(), "/");
        assert_eq!(
            strip_prefix("/hatrac", "/hatrac;acl").unwrap_or_default(),
            "/;acl"
        );
        assert_eq!(strip_prefix("", "/ns").unwrap_or_default(), "/ns");
        assert_eq!(strip_prefix("/", "/ns").unwrap_or_default(), "/ns");
    }

    #[test]
    fn test_should_reject_paths_outside_prefix() {
        assert!(strip_prefix("/hatrac", "/other/ns").is_err());
        assert!(strip_prefix("/hatrac", "/hatracish").is_err());
    }
}
