//! Content negotiation.
//!
//! Listings negotiate between `application/json` (default) and
//! `text/uri-list`. Error bodies negotiate the client's `Accept` types
//! against the configured templates keyed by `(code, content-type)` with
//! a `default` fallback; with no matching template a plain-text body with
//! the short title is emitted.

use hatrac_core::config::ErrorTemplates;
use hatrac_core::{HatracConfig, HatracError};

/// Media types in an `Accept` header, in listed order with parameters
/// stripped.
fn accept_types(accept: Option<&str>) -> Vec<String> {
    let Some(accept) = accept else {
        return Vec::new();
    };
    accept
        .split(',')
        .map(|entry| {
            entry
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

/// Whether a listing should render as `text/uri-list` instead of the JSON
/// default.
#[must_use]
pub fn wants_uri_list(accept: Option<&str>) -> bool {
    for media_type in accept_types(accept) {
        match media_type.as_str() {
            "text/uri-list" => return true,
            "application/json" | "*/*" | "application/*" => return false,
            _ => {}
        }
    }
    false
}

/// Negotiate an error body: `(content-type, body)`.
#[must_use]
pub fn negotiate_error(
    config: &HatracConfig,
    accept: Option<&str>,
    err: &HatracError,
) -> (String, String) {
    let code = err.status_code().as_u16();
    let title = err.title();
    let description = err.description();

    if let Some(templates) = config.error_templates.for_code(code) {
        for media_type in accept_types(accept) {
            if let Some(template) = templates.get(&media_type) {
                return (
                    media_type,
                    ErrorTemplates::render(template, code, title, &description),
                );
            }
        }
        if let Some(template) = templates.get("default") {
            return (
                "text/html".to_owned(),
                ErrorTemplates::render(template, code, title, &description),
            );
        }
    }

    ("text/plain".to_owned(), format!("{title}\n"))
}
