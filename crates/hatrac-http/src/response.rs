//! Response composition helpers.

use http::StatusCode;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG, LOCATION};

use hatrac_core::{HatracError, HatracResult};

use crate::body::HatracBody;

pub(crate) fn build(
    builder: http::response::Builder,
    body: HatracBody,
) -> HatracResult<http::Response<HatracBody>> {
    builder
        .body(body)
        .map_err(|e| HatracError::Internal(anyhow::Error::new(e).context("build response")))
}

/// 201 Created with a `Location` header and optional ETag.
pub(crate) fn created(
    location: &str,
    etag: Option<&str>,
) -> HatracResult<http::Response<HatracBody>> {
    let mut builder = http::Response::builder()
        .status(StatusCode::CREATED)
        .header(LOCATION, location)
        .header(CONTENT_TYPE, "text/plain")
        .header(CONTENT_LENGTH, location.len() + 1);
    if let Some(etag) = etag {
        builder = builder.header(ETAG, etag);
    }
    build(builder, HatracBody::from_string(format!("{location}\n")))
}

/// 204 No Content, with an optional ETag for updated surfaces.
pub(crate) fn no_content(etag: Option<&str>) -> HatracResult<http::Response<HatracBody>> {
    let mut builder = http::Response::builder().status(StatusCode::NO_CONTENT);
    if let Some(etag) = etag {
        builder = builder.header(ETAG, etag);
    }
    build(builder, HatracBody::empty())
}

/// 304 Not Modified with the current ETag.
pub(crate) fn not_modified(etag: &str) -> HatracResult<http::Response<HatracBody>> {
    build(
        http::Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(ETAG, etag),
        HatracBody::empty(),
    )
}

/// 302 Found redirect.
pub(crate) fn redirect(url: &str) -> HatracResult<http::Response<HatracBody>> {
    build(
        http::Response::builder()
            .status(StatusCode::FOUND)
            .header(LOCATION, url),
        HatracBody::empty(),
    )
}

/// 200 OK JSON document (newline terminated), optionally tagged.
pub(crate) fn json(
    value: &serde_json::Value,
    etag: Option<&str>,
    head: bool,
) -> HatracResult<http::Response<HatracBody>> {
    let text = format!("{value}\n");
    sized_text("application/json", text, etag, head)
}

/// 200 OK `text/uri-list` listing.
pub(crate) fn uri_list(
    uris: &[String],
    etag: Option<&str>,
    head: bool,
) -> HatracResult<http::Response<HatracBody>> {
    let mut text = String::new();
    for uri in uris {
        text.push_str(uri);
        text.push('\n');
    }
    sized_text("text/uri-list", text, etag, head)
}

/// 200 OK plain text.
pub(crate) fn text(
    content: String,
    etag: Option<&str>,
    head: bool,
) -> HatracResult<http::Response<HatracBody>> {
    sized_text("text/plain", content, etag, head)
}

fn sized_text(
    content_type: &str,
    text: String,
    etag: Option<&str>,
    head: bool,
) -> HatracResult<http::Response<HatracBody>> {
    let mut builder = http::Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_LENGTH, text.len());
    if let Some(etag) = etag {
        builder = builder.header(ETAG, etag);
    }
    let body = if head {
        HatracBody::empty()
    } else {
        HatracBody::from_string(text)
    };
    build(builder, body)
}
