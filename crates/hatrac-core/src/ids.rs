//! Identifier generation.
//!
//! Version ids are completely random to emphasize that they carry no
//! semantic meaning; they are URL-safe so they can appear verbatim in
//! `name:version` references.

use base64::Engine;
use rand::Rng;
use uuid::Uuid;

/// Generate a random version id: 24 random bytes as URL-safe base64
/// without padding (32 characters).
#[must_use]
pub fn generate_version_id() -> String {
    let mut rng = rand::rng();
    let mut buf = [0u8; 24];
    rng.fill(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// Generate a random upload-job key (32 hex characters).
#[must_use]
pub fn generate_job_id() -> String {
    let mut rng = rand::rng();
    let mut buf = [0u8; 16];
    rng.fill(&mut buf);
    hex::encode(buf)
}

/// Generate a unique request id (UUID v4 without dashes).
#[must_use]
pub fn generate_request_id() -> String {
    Uuid::new_v4().simple().to_string()
}
