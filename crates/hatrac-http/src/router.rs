//! URL codec and request routing.
//!
//! The path grammar treats `/`, `:`, and `;` as meta-syntax:
//!
//! ```text
//! /<segment>/<segment>[:<version>][;<subresource>[/<selector>[/<selector>]]]
//! ```
//!
//! Splitting happens on the raw (still percent-encoded) text, so encoded
//! meta characters inside a segment never split. Each token is then
//! decoded and validated against the configured safe character class.
//! Subresource tokens are `versions`, `metadata[/field]`,
//! `acl[/access[/entry]]`, and `upload[/job-id[/chunk-number]]`.

use std::str::FromStr;

use hatrac_core::{HatracError, HatracResult};
use hatrac_model::acl::Access;
use hatrac_model::meta::MetadataField;
use hatrac_model::name::{NamePath, decode_segment};

/// A parsed resource reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    /// The hierarchical name.
    pub path: NamePath,
    /// Optional version qualifier from `:<version>`.
    pub version: Option<String>,
    /// Optional subresource from `;<subresource>`.
    pub sub: Option<SubResource>,
}

/// A `;subresource` reference.
#[derive(Debug, Clone, PartialEq)]
pub enum SubResource {
    /// `;versions`: the version listing of an object.
    Versions,
    /// `;metadata[/field]`.
    Metadata {
        /// A single addressed field, or the whole collection.
        field: Option<MetadataField>,
    },
    /// `;acl[/access[/entry]]`.
    Acl {
        /// A single access class, or the whole collection.
        access: Option<Access>,
        /// A single role entry within the class.
        entry: Option<String>,
    },
    /// `;upload[/job-id[/chunk-number]]`.
    Upload {
        /// A specific job, or the job listing.
        job: Option<String>,
        /// A chunk position within the job.
        chunk: Option<i64>,
    },
}

/// Parse a request path (with the service prefix already stripped) into a
/// [`Target`].
pub fn parse_target(path: &str, allowed_punctuation: &str) -> HatracResult<Target> {
    if !path.starts_with('/') {
        return Err(HatracError::bad_request("request path must be absolute"));
    }

    // Split off the subresource at the first unescaped ';'.
    let (name_part, sub_part) = match path.find(';') {
        Some(at) => (&path[..at], Some(&path[at + 1..])),
        None => (path, None),
    };

    let (path, version) = parse_name_part(name_part, allowed_punctuation)?;
    let sub = sub_part
        .map(|raw| parse_subresource(raw, allowed_punctuation))
        .transpose()?;

    Ok(Target { path, version, sub })
}

/// Parse the name portion, peeling an optional `:<version>` qualifier off
/// the final segment.
fn parse_name_part(
    raw: &str,
    allowed_punctuation: &str,
) -> HatracResult<(NamePath, Option<String>)> {
    let mut tokens: Vec<&str> = raw.split('/').filter(|t| !t.is_empty()).collect();

    let version = match tokens.last() {
        Some(last) if last.contains(':') => {
            let mut pieces = last.split(':');
            let (name_token, version_token) = match (pieces.next(), pieces.next(), pieces.next()) {
                (Some(name), Some(version), None) => (name, version),
                _ => {
                    return Err(HatracError::bad_request(
                        "malformed version qualifier in request path",
                    ));
                }
            };
            if name_token.is_empty() || version_token.is_empty() {
                return Err(HatracError::bad_request(
                    "malformed version qualifier in request path",
                ));
            }
            let version = decode_segment(version_token, allowed_punctuation)?;
            let last_index = tokens.len() - 1;
            tokens[last_index] = name_token;
            Some(version)
        }
        _ => None,
    };

    let mut segments = Vec::with_capacity(tokens.len());
    for token in tokens {
        segments.push(decode_segment(token, allowed_punctuation)?);
    }

    if version.is_some() && segments.is_empty() {
        return Err(HatracError::bad_request(
            "a version qualifier requires an object name",
        ));
    }

    Ok((NamePath::from_segments(segments), version))
}

/// Parse the `;subresource[/selector[/selector]]` portion.
fn parse_subresource(raw: &str, allowed_punctuation: &str) -> HatracResult<SubResource> {
    let mut tokens = raw.split('/').filter(|t| !t.is_empty());
    let kind = tokens
        .next()
        .ok_or_else(|| HatracError::bad_request("empty subresource reference"))?;
    let selectors: Vec<&str> = tokens.collect();

    match kind {
        "versions" => {
            if !selectors.is_empty() {
                return Err(HatracError::bad_request(
                    "the versions subresource takes no selector",
                ));
            }
            Ok(SubResource::Versions)
        }
        "metadata" => {
            if selectors.len() > 1 {
                return Err(HatracError::bad_request(
                    "metadata takes at most one field selector",
                ));
            }
            let field = selectors
                .first()
                .map(|token| {
                    let decoded = decode_segment(token, allowed_punctuation)?;
                    MetadataField::from_str(&decoded).map_err(|e| {
                        HatracError::bad_request(e.to_string())
                    })
                })
                .transpose()?;
            Ok(SubResource::Metadata { field })
        }
        "acl" => {
            if selectors.len() > 2 {
                return Err(HatracError::bad_request(
                    "acl takes at most access and entry selectors",
                ));
            }
            let access = selectors
                .first()
                .map(|token| {
                    let decoded = decode_segment(token, allowed_punctuation)?;
                    Access::from_str(&decoded)
                        .map_err(|e| HatracError::bad_request(e.to_string()))
                })
                .transpose()?;
            let entry = selectors
                .get(1)
                .map(|token| decode_segment(token, allowed_punctuation))
                .transpose()?;
            Ok(SubResource::Acl { access, entry })
        }
        "upload" => {
            if selectors.len() > 2 {
                return Err(HatracError::bad_request(
                    "upload takes at most job and chunk selectors",
                ));
            }
            let job = selectors
                .first()
                .map(|token| decode_segment(token, allowed_punctuation))
                .transpose()?;
            let chunk = selectors
                .get(1)
                .map(|token| {
                    token.parse::<i64>().map_err(|_| {
                        HatracError::bad_request(format!("invalid chunk number {token:?}"))
                    })
                })
                .transpose()?;
            Ok(SubResource::Upload { job, chunk })
        }
        other => Err(HatracError::bad_request(format!(
            "unknown subresource {other:?}"
        ))),
    }
}

/// Parse the query string into key-value pairs.
#[must_use]
pub fn parse_query(query: Option<&str>) -> Vec<(String, String)> {
    let Some(query) = query else {
        return Vec::new();
    };
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_owned(), value.to_owned()),
            None => (pair.to_owned(), String::new()),
        })
        .collect()
}

/// Whether the `parents=true` flag is present in the query.
#[must_use]
pub fn wants_parents(query: &[(String, String)]) -> bool {
    query
        .iter()
        .any(|(key, value)| key == "parents" && value.eq_ignore_ascii_case("true"))
}
