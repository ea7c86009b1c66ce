//! Content metadata fields and their validation rules.
//!
//! A version carries four metadata fields. The two digest fields are
//! immutable once set; `content-type` and `content-disposition` may be
//! rewritten. `Content-Disposition` is restricted to the RFC 6266
//! `filename*=UTF-8''` form with a percent-encoded basename.

use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

use hatrac_core::{HatracError, HatracResult};

// ---------------------------------------------------------------------------
// MetadataField
// ---------------------------------------------------------------------------

/// The addressable fields of the `;metadata` subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    /// MIME type of the content.
    ContentType,
    /// Base64 MD5 digest. Immutable once set.
    ContentMd5,
    /// Base64 SHA-256 digest. Immutable once set.
    ContentSha256,
    /// Download filename directive.
    ContentDisposition,
}

impl MetadataField {
    /// Canonical field name, as used in `;metadata/<field>` URLs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContentType => "content-type",
            Self::ContentMd5 => "content-md5",
            Self::ContentSha256 => "content-sha256",
            Self::ContentDisposition => "content-disposition",
        }
    }

    /// Digest fields are immutable once set; a conflicting rewrite is a
    /// 409.
    #[must_use]
    pub fn is_mutable(&self) -> bool {
        matches!(self, Self::ContentType | Self::ContentDisposition)
    }

    /// All fields, in wire order.
    #[must_use]
    pub fn all() -> &'static [Self] {
        &[
            Self::ContentType,
            Self::ContentMd5,
            Self::ContentSha256,
            Self::ContentDisposition,
        ]
    }
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`MetadataField`] fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown metadata field: {0}")]
pub struct ParseMetadataFieldError(String);

impl FromStr for MetadataField {
    type Err = ParseMetadataFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content-type" => Ok(Self::ContentType),
            "content-md5" => Ok(Self::ContentMd5),
            "content-sha256" => Ok(Self::ContentSha256),
            "content-disposition" => Ok(Self::ContentDisposition),
            _ => Err(ParseMetadataFieldError(s.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// ContentMetadata
// ---------------------------------------------------------------------------

/// The metadata fields of a version (or the intended metadata of an
/// upload job).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMetadata {
    /// MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Base64 MD5 digest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_md5: Option<String>,
    /// Base64 SHA-256 digest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_sha256: Option<String>,
    /// Download filename directive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
}

impl ContentMetadata {
    /// Read one field.
    #[must_use]
    pub fn get(&self, field: MetadataField) -> Option<&str> {
        match field {
            MetadataField::ContentType => self.content_type.as_deref(),
            MetadataField::ContentMd5 => self.content_md5.as_deref(),
            MetadataField::ContentSha256 => self.content_sha256.as_deref(),
            MetadataField::ContentDisposition => self.content_disposition.as_deref(),
        }
    }

    /// Write one field (`None` clears it).
    pub fn set(&mut self, field: MetadataField, value: Option<String>) {
        let slot = match field {
            MetadataField::ContentType => &mut self.content_type,
            MetadataField::ContentMd5 => &mut self.content_md5,
            MetadataField::ContentSha256 => &mut self.content_sha256,
            MetadataField::ContentDisposition => &mut self.content_disposition,
        };
        *slot = value;
    }

    /// Render the present fields as the `;metadata` collection wire form.
    #[must_use]
    pub fn to_wire(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for field in MetadataField::all() {
            if let Some(value) = self.get(*field) {
                map.insert(field.as_str().to_owned(), serde_json::json!(value));
            }
        }
        serde_json::Value::Object(map)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a `Content-Disposition` value.
///
/// Only the `filename*=UTF-8''<basename>` form is accepted, where the
/// basename is percent-encoded and decodes to a non-empty UTF-8 string
/// without path separators.
pub fn validate_content_disposition(value: &str) -> HatracResult<()> {
    let rest = value.trim().strip_prefix("filename*=UTF-8''").ok_or_else(|| {
        HatracError::bad_request(
            "content-disposition must use the filename*=UTF-8''<name> form",
        )
    })?;
    if rest.is_empty() {
        return Err(HatracError::bad_request(
            "content-disposition filename must not be empty",
        ));
    }
    let decoded = percent_decode_str(rest).decode_utf8().map_err(|_| {
        HatracError::bad_request("content-disposition filename is not valid UTF-8")
    })?;
    if decoded.contains('/') || decoded.contains('\\') {
        return Err(HatracError::bad_request(
            "content-disposition filename must not contain path separators",
        ));
    }
    if decoded == "." || decoded == ".." {
        return Err(HatracError::bad_request(
            "content-disposition filename must be a plain basename",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Upload job request body
// ---------------------------------------------------------------------------

/// The JSON body of `POST <object>;upload`.
///
/// Legacy field aliases from older clients are accepted and canonicalized
/// at parse time.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadJobRequest {
    /// Chunk size in bytes; must be positive.
    #[serde(rename = "chunk-length", alias = "chunk_bytes")]
    pub chunk_length: i64,
    /// Total content size in bytes; must be non-negative.
    #[serde(rename = "content-length", alias = "total_bytes")]
    pub content_length: i64,
    /// Intended content type.
    #[serde(rename = "content-type", default)]
    pub content_type: Option<String>,
    /// Declared base64 MD5 digest.
    #[serde(rename = "content-md5", alias = "content_md5", default)]
    pub content_md5: Option<String>,
    /// Declared base64 SHA-256 digest.
    #[serde(rename = "content-sha256", alias = "content_sha256", default)]
    pub content_sha256: Option<String>,
    /// Intended content disposition.
    #[serde(rename = "content-disposition", default)]
    pub content_disposition: Option<String>,
}

impl UploadJobRequest {
    /// Validate the declared geometry and digests, returning the canonical
    /// intended metadata.
    pub fn validated_metadata(&self) -> HatracResult<ContentMetadata> {
        if self.chunk_length <= 0 {
            return Err(HatracError::bad_request("chunk-length must be positive"));
        }
        if self.content_length < 0 {
            return Err(HatracError::bad_request(
                "content-length must be non-negative",
            ));
        }
        let content_md5 = self
            .content_md5
            .as_deref()
            .map(hatrac_core::digest::validate_md5_b64)
            .transpose()?;
        let content_sha256 = self
            .content_sha256
            .as_deref()
            .map(hatrac_core::digest::validate_sha256_b64)
            .transpose()?;
        if let Some(disposition) = self.content_disposition.as_deref() {
            validate_content_disposition(disposition)?;
        }
        Ok(ContentMetadata {
            content_type: self.content_type.clone(),
            content_md5,
            content_sha256,
            content_disposition: self.content_disposition.clone(),
        })
    }
}
