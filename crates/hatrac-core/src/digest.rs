//! Content digest computation and codec.
//!
//! Hatrac's end-to-end integrity contract is MD5 plus SHA-256, carried in
//! the `Content-MD5` and `Content-SHA256` headers as base64. Payloads are
//! streamed, so digests are accumulated incrementally with
//! [`ContentHasher`] while bytes flow to the storage backend.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use digest::Digest;

use crate::error::{HatracError, HatracResult};

/// Incremental MD5 + SHA-256 hasher with a running byte count.
#[derive(Default)]
pub struct ContentHasher {
    md5: md5::Md5,
    sha256: sha2::Sha256,
    nbytes: u64,
}

impl ContentHasher {
    /// Create a fresh hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of payload bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.md5.update(data);
        self.sha256.update(data);
        self.nbytes += data.len() as u64;
    }

    /// Total bytes fed so far.
    #[must_use]
    pub fn nbytes(&self) -> u64 {
        self.nbytes
    }

    /// Finish and return the digests.
    #[must_use]
    pub fn finish(self) -> ContentDigests {
        ContentDigests {
            nbytes: self.nbytes,
            md5_b64: BASE64_STANDARD.encode(self.md5.finalize()),
            sha256_b64: BASE64_STANDARD.encode(self.sha256.finalize()),
        }
    }
}

impl std::fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentHasher")
            .field("nbytes", &self.nbytes)
            .finish()
    }
}

/// Digests computed over a full payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigests {
    /// Total payload size in bytes.
    pub nbytes: u64,
    /// Base64 MD5 digest, the `Content-MD5` wire form.
    pub md5_b64: String,
    /// Base64 SHA-256 digest, the `Content-SHA256` wire form.
    pub sha256_b64: String,
}

impl ContentDigests {
    /// Compute digests over an in-memory payload.
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = ContentHasher::new();
        hasher.update(data);
        hasher.finish()
    }

    /// Verify computed digests against optionally-declared values.
    ///
    /// Mismatches are reported through `on_mismatch` so callers can choose
    /// the status: direct PUT validation is a 400, upload finalization a
    /// 409.
    pub fn verify_declared(
        &self,
        declared_md5: Option<&str>,
        declared_sha256: Option<&str>,
        on_mismatch: impl Fn(String) -> HatracError,
    ) -> HatracResult<()> {
        if let Some(md5) = declared_md5 {
            if md5 != self.md5_b64 {
                return Err(on_mismatch(format!(
                    "content-md5 mismatch: declared {md5}, computed {}",
                    self.md5_b64
                )));
            }
        }
        if let Some(sha256) = declared_sha256 {
            if sha256 != self.sha256_b64 {
                return Err(on_mismatch(format!(
                    "content-sha256 mismatch: declared {sha256}, computed {}",
                    self.sha256_b64
                )));
            }
        }
        Ok(())
    }
}

/// Validate and canonicalize a declared `Content-MD5` header value.
///
/// The value must be base64 for exactly 16 digest bytes.
pub fn validate_md5_b64(value: &str) -> HatracResult<String> {
    let decoded = BASE64_STANDARD
        .decode(value.trim())
        .map_err(|_| HatracError::bad_request("content-md5 is not valid base64"))?;
    if decoded.len() != 16 {
        return Err(HatracError::bad_request(
            "content-md5 must encode a 16-byte MD5 digest",
        ));
    }
    Ok(BASE64_STANDARD.encode(decoded))
}

/// Validate and canonicalize a declared `Content-SHA256` header value.
///
/// The value must be base64 for exactly 32 digest bytes.
pub fn validate_sha256_b64(value: &str) -> HatracResult<String> {
    let decoded = BASE64_STANDARD
        .decode(value.trim())
        .map_err(|_| HatracError::bad_request("content-sha256 is not valid base64"))?;
    if decoded.len() != 32 {
        return Err(HatracError::bad_request(
            "content-sha256 must encode a 32-byte SHA-256 digest",
        ));
    }
    Ok(BASE64_STANDARD.encode(decoded))
}

/// Hex MD5 of arbitrary bytes, used for ETag-style content hashes and the
/// filesystem layout prefix.
#[must_use]
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(md5::Md5::digest(data))
}
