//! Bulk storage backends.
//!
//! The directory records structure; a [`StorageBackend`] persists the
//! payload bytes. Three implementations exist:
//!
//! - [`filesystem::FilesystemBackend`]: hashed two-level layout under a
//!   configured root, with temp-file + atomic-rename publication.
//! - [`amazons3::AmazonS3Backend`]: one or more S3 buckets routed by
//!   longest name-prefix match, with multipart uploads and presigned-URL
//!   redirection.
//! - [`overlay::OverlayBackend`]: primary-write composition over an
//!   ordered backend list, for gradual migration.

pub mod amazons3;
pub mod backend;
pub mod filesystem;
pub mod overlay;

use std::sync::Arc;

use futures_util::future::BoxFuture;

use hatrac_core::config::{StorageBackendKind, StorageConfig};
use hatrac_core::{HatracError, HatracResult};

pub use backend::{ByteStream, ContentGet, StorageBackend, StoredVersion};

/// Instantiate the backend selected by configuration. Overlay entries
/// recurse into their layered configurations.
pub fn backend_from_config(
    config: &StorageConfig,
) -> BoxFuture<'_, HatracResult<Arc<dyn StorageBackend>>> {
    Box::pin(async move {
        match config.storage_backend {
            StorageBackendKind::Filesystem => Ok(Arc::new(filesystem::FilesystemBackend::new(
                &config.storage_path,
            )) as Arc<dyn StorageBackend>),
            StorageBackendKind::Amazons3 => {
                let s3 = config.s3_config.as_ref().ok_or_else(|| {
                    HatracError::Internal(anyhow::anyhow!(
                        "storage_backend amazons3 requires s3_config"
                    ))
                })?;
                Ok(Arc::new(amazons3::AmazonS3Backend::from_config(s3).await?)
                    as Arc<dyn StorageBackend>)
            }
            StorageBackendKind::Overlay => {
                if config.overlay_backends.is_empty() {
                    return Err(HatracError::Internal(anyhow::anyhow!(
                        "storage_backend overlay requires overlay_backends"
                    )));
                }
                let mut layers = Vec::with_capacity(config.overlay_backends.len());
                for layer in &config.overlay_backends {
                    layers.push(backend_from_config(layer).await?);
                }
                Ok(Arc::new(overlay::OverlayBackend::new(layers)) as Arc<dyn StorageBackend>)
            }
        }
    })
}
