//! Overlay composition of storage backends.
//!
//! Intended for gradual migration: a snapshot of the directory can point
//! at content that still lives in an old backend while new writes land in
//! the new one. Reads try each layer in order and fall through on a
//! missing version; all writes, uploads, and deletes go to the primary
//! (first) layer only.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use hatrac_core::{HatracError, HatracResult};
use hatrac_model::meta::ContentMetadata;
use hatrac_model::name::NamePath;
use hatrac_model::resource::AuxRecord;

use crate::backend::{ByteStream, ContentGet, StorageBackend, StoredVersion};

/// Read-through composition over an ordered list of backends.
pub struct OverlayBackend {
    layers: Vec<Arc<dyn StorageBackend>>,
}

impl OverlayBackend {
    /// Compose the given layers; the first is the primary write target.
    #[must_use]
    pub fn new(layers: Vec<Arc<dyn StorageBackend>>) -> Self {
        assert!(!layers.is_empty(), "overlay requires at least one layer");
        Self { layers }
    }

    fn primary(&self) -> &dyn StorageBackend {
        self.layers[0].as_ref()
    }
}

impl std::fmt::Debug for OverlayBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayBackend")
            .field("layers", &self.layers.len())
            .finish()
    }
}

#[async_trait]
impl StorageBackend for OverlayBackend {
    async fn create_from_stream(
        &self,
        name: &NamePath,
        body: ByteStream,
        nbytes: u64,
        metadata: &ContentMetadata,
    ) -> HatracResult<StoredVersion> {
        self.primary()
            .create_from_stream(name, body, nbytes, metadata)
            .await
    }

    async fn get_content(
        &self,
        name: &NamePath,
        version: &str,
        range: Option<(u64, u64)>,
        nbytes: Option<u64>,
        metadata: &ContentMetadata,
        aux: &AuxRecord,
    ) -> HatracResult<ContentGet> {
        for (index, layer) in self.layers.iter().enumerate() {
            match layer
                .get_content(name, version, range, nbytes, metadata, aux)
                .await
            {
                Err(HatracError::NotFound(_)) => {
                    trace!(name = %name, version, layer = index, "version absent, trying next layer");
                }
                other => return other,
            }
        }
        Err(HatracError::not_found(format!(
            "object version {name}:{version} not present in any storage layer"
        )))
    }

    async fn delete(&self, name: &NamePath, version: &str, aux: &AuxRecord) -> HatracResult<()> {
        // Deleting a version whose bytes only exist in a secondary layer
        // is expected during migration; leave secondary layers untouched.
        match self.primary().delete(name, version, aux).await {
            Err(HatracError::NotFound(_)) => Ok(()),
            other => other,
        }
    }

    async fn create_upload(
        &self,
        name: &NamePath,
        nbytes: u64,
        metadata: &ContentMetadata,
    ) -> HatracResult<String> {
        self.primary().create_upload(name, nbytes, metadata).await
    }

    async fn upload_chunk(
        &self,
        name: &NamePath,
        handle: &str,
        position: u64,
        chunk_length: u64,
        nbytes: u64,
        body: ByteStream,
    ) -> HatracResult<serde_json::Value> {
        self.primary()
            .upload_chunk(name, handle, position, chunk_length, nbytes, body)
            .await
    }

    async fn finalize_upload(
        &self,
        name: &NamePath,
        handle: &str,
        chunks: &[(i64, serde_json::Value)],
        metadata: &ContentMetadata,
    ) -> HatracResult<StoredVersion> {
        self.primary()
            .finalize_upload(name, handle, chunks, metadata)
            .await
    }

    async fn cancel_upload(&self, name: &NamePath, handle: &str) -> HatracResult<()> {
        self.primary().cancel_upload(name, handle).await
    }

    fn address(&self, name: &NamePath, version: &str) -> String {
        self.primary().address(name, version)
    }

    async fn presigned_get(
        &self,
        name: &NamePath,
        version: &str,
        aux: &AuxRecord,
        ttl: std::time::Duration,
    ) -> HatracResult<Option<String>> {
        self.primary().presigned_get(name, version, aux, ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::stream_from_bytes;
    use crate::filesystem::FilesystemBackend;
    use futures_util::StreamExt;

    fn name(text: &str) -> NamePath {
        NamePath::parse(text).unwrap_or_else(|e| panic!("path: {e}"))
    }

    async fn collect(get: ContentGet) -> Vec<u8> {
        match get {
            ContentGet::Stream { mut stream, .. } => {
                let mut out = Vec::new();
                while let Some(chunk) = stream.next().await {
                    out.extend_from_slice(&chunk.unwrap_or_else(|e| panic!("stream: {e}")));
                }
                out
            }
            ContentGet::Redirect { .. } => panic!("unexpected redirect"),
        }
    }

    #[tokio::test]
    async fn test_should_fall_through_to_secondary_layer() {
        let primary_dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let secondary_dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let primary = Arc::new(FilesystemBackend::new(primary_dir.path()));
        let secondary = Arc::new(FilesystemBackend::new(secondary_dir.path()));

        // Seed content only in the secondary layer.
        let stored = secondary
            .create_from_stream(
                &name("/ns/old"),
                stream_from_bytes("legacy bytes"),
                12,
                &ContentMetadata::default(),
            )
            .await
            .unwrap_or_else(|e| panic!("seed: {e}"));

        let overlay = OverlayBackend::new(vec![primary.clone(), secondary]);
        let get = overlay
            .get_content(
                &name("/ns/old"),
                &stored.version,
                None,
                Some(12),
                &ContentMetadata::default(),
                &AuxRecord::default(),
            )
            .await
            .unwrap_or_else(|e| panic!("get: {e}"));
        assert_eq!(collect(get).await, b"legacy bytes");
    }

    #[tokio::test]
    async fn test_should_write_to_primary_layer_only() {
        let primary_dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let secondary_dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let primary = Arc::new(FilesystemBackend::new(primary_dir.path()));
        let secondary = Arc::new(FilesystemBackend::new(secondary_dir.path()));
        let overlay = OverlayBackend::new(vec![primary, secondary.clone()]);

        let stored = overlay
            .create_from_stream(
                &name("/ns/new"),
                stream_from_bytes("fresh"),
                5,
                &ContentMetadata::default(),
            )
            .await
            .unwrap_or_else(|e| panic!("store: {e}"));

        // The secondary layer never saw the write.
        let err = secondary
            .get_content(
                &name("/ns/new"),
                &stored.version,
                None,
                None,
                &ContentMetadata::default(),
                &AuxRecord::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HatracError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_should_tolerate_delete_of_secondary_only_content() {
        let primary_dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let secondary_dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let primary = Arc::new(FilesystemBackend::new(primary_dir.path()));
        let secondary = Arc::new(FilesystemBackend::new(secondary_dir.path()));
        let overlay = OverlayBackend::new(vec![primary, secondary]);

        // Nothing exists anywhere; delete is still clean.
        overlay
            .delete(&name("/ns/ghost"), "V1", &AuxRecord::default())
            .await
            .unwrap_or_else(|e| panic!("delete: {e}"));

        let err = overlay
            .get_content(
                &name("/ns/ghost"),
                "V1",
                None,
                None,
                &ContentMetadata::default(),
                &AuxRecord::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HatracError::NotFound(_)));
    }
}
