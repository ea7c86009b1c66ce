//! Filesystem-backed bulk storage.
//!
//! A `(name, version)` pair maps to a two-level path
//! `<root>/<hh>/<leaf>:<version>`, where `hh` is the first two hex digits
//! of the MD5 of the full object name. The fan-out keeps any single
//! directory from accumulating every version in the store.
//!
//! Non-chunked writes go to a temp file followed by an atomic rename, so
//! a version path is only ever observed complete. Chunked uploads
//! preallocate a sparse file of the declared size; chunk writes seek to
//! `position * chunk_length`; finalize verifies digests and renames the
//! assembled file into place.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncSeekExt, SeekFrom};
use tracing::{debug, trace};

use hatrac_core::digest::md5_hex;
use hatrac_core::ids::{generate_job_id, generate_version_id};
use hatrac_core::{HatracError, HatracResult};
use hatrac_model::meta::ContentMetadata;
use hatrac_model::name::{NamePath, encode_segment};
use hatrac_model::resource::AuxRecord;

use crate::backend::{
    ByteStream, ContentGet, StorageBackend, StoredVersion, digest_reader, drain_to_writer,
    reader_stream,
};

/// POSIX filesystem storage rooted at a configured directory.
#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a backend over `root`. Directories are created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The final resting path for a stored version.
    fn version_path(&self, name: &NamePath, version: &str) -> PathBuf {
        let hash = md5_hex(name.to_string().as_bytes());
        let leaf = name.leaf().unwrap_or_default();
        self.root
            .join(&hash[..2])
            .join(format!("{}:{version}", encode_segment(leaf)))
    }

    /// Scratch directory for temp files and in-progress chunked uploads.
    fn uploads_dir(&self) -> PathBuf {
        self.root.join(".uploads")
    }

    async fn ensure_parent(path: &Path) -> HatracResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(io_internal)?;
        }
        Ok(())
    }
}

fn io_internal(err: std::io::Error) -> HatracError {
    HatracError::Internal(anyhow::Error::new(err).context("filesystem storage"))
}

/// Map a missing file to NotFound so overlay composition can fall
/// through; everything else is internal.
fn io_read_err(err: std::io::Error, what: &str) -> HatracError {
    if err.kind() == std::io::ErrorKind::NotFound {
        HatracError::not_found(format!("{what} not present in storage"))
    } else {
        io_internal(err)
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn create_from_stream(
        &self,
        name: &NamePath,
        body: ByteStream,
        nbytes: u64,
        metadata: &ContentMetadata,
    ) -> HatracResult<StoredVersion> {
        let temp = self.uploads_dir().join(format!("tmp-{}", generate_job_id()));
        Self::ensure_parent(&temp).await?;

        let mut file = fs::File::create(&temp).await.map_err(io_internal)?;
        let result = drain_to_writer(body, nbytes, &mut file).await;
        let digests = match result {
            Ok(digests) => digests,
            Err(err) => {
                drop(file);
                let _ = fs::remove_file(&temp).await;
                return Err(err);
            }
        };
        file.sync_all().await.map_err(io_internal)?;
        drop(file);

        // Digest mismatch against declared values is a client error on
        // the direct PUT path.
        if let Err(err) = digests.verify_declared(
            metadata.content_md5.as_deref(),
            metadata.content_sha256.as_deref(),
            HatracError::BadRequest,
        ) {
            let _ = fs::remove_file(&temp).await;
            return Err(err);
        }

        let version = generate_version_id();
        let target = self.version_path(name, &version);
        Self::ensure_parent(&target).await?;
        fs::rename(&temp, &target).await.map_err(io_internal)?;

        debug!(name = %name, version, nbytes, "stored version file");
        Ok(StoredVersion {
            version,
            digests: Some(digests),
            aux: AuxRecord::default(),
        })
    }

    async fn get_content(
        &self,
        name: &NamePath,
        version: &str,
        range: Option<(u64, u64)>,
        _nbytes: Option<u64>,
        _metadata: &ContentMetadata,
        _aux: &AuxRecord,
    ) -> HatracResult<ContentGet> {
        let path = self.version_path(name, version);
        let mut file = fs::File::open(&path)
            .await
            .map_err(|e| io_read_err(e, "object version"))?;
        let total = file.metadata().await.map_err(io_internal)?.len();

        let (offset, len) = match range {
            Some((start, end)) => (start, end - start + 1),
            None => (0, total),
        };
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await.map_err(io_internal)?;
        }

        trace!(name = %name, version, offset, len, "streaming version file");
        Ok(ContentGet::Stream {
            stream: reader_stream(file, len),
            nbytes: len,
            total,
            range,
        })
    }

    async fn delete(&self, name: &NamePath, version: &str, _aux: &AuxRecord) -> HatracResult<()> {
        let path = self.version_path(name, version);
        fs::remove_file(&path)
            .await
            .map_err(|e| io_read_err(e, "object version"))?;
        debug!(name = %name, version, "deleted version file");
        Ok(())
    }

    async fn create_upload(
        &self,
        name: &NamePath,
        nbytes: u64,
        _metadata: &ContentMetadata,
    ) -> HatracResult<String> {
        let handle = generate_job_id();
        let path = self.uploads_dir().join(&handle);
        Self::ensure_parent(&path).await?;
        let file = fs::File::create(&path).await.map_err(io_internal)?;
        // Sparse preallocation of the declared total size.
        file.set_len(nbytes).await.map_err(io_internal)?;
        debug!(name = %name, handle, nbytes, "created upload scratch file");
        Ok(handle)
    }

    async fn upload_chunk(
        &self,
        _name: &NamePath,
        handle: &str,
        position: u64,
        chunk_length: u64,
        nbytes: u64,
        body: ByteStream,
    ) -> HatracResult<serde_json::Value> {
        let path = self.uploads_dir().join(handle);
        let mut file = fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .await
            .map_err(|e| io_read_err(e, "upload job"))?;
        file.seek(SeekFrom::Start(position * chunk_length))
            .await
            .map_err(io_internal)?;
        let digests = drain_to_writer(body, nbytes, &mut file).await?;
        file.sync_all().await.map_err(io_internal)?;
        trace!(handle, position, nbytes, "wrote upload chunk");
        Ok(serde_json::json!({ "md5": digests.md5_b64, "nbytes": digests.nbytes }))
    }

    async fn finalize_upload(
        &self,
        name: &NamePath,
        handle: &str,
        _chunks: &[(i64, serde_json::Value)],
        metadata: &ContentMetadata,
    ) -> HatracResult<StoredVersion> {
        let path = self.uploads_dir().join(handle);
        let file = fs::File::open(&path)
            .await
            .map_err(|e| io_read_err(e, "upload job"))?;
        let digests = digest_reader(file).await?;

        // Declared digests are checked against the assembled content; a
        // mismatch at finalization is a conflict, not a bad request.
        digests.verify_declared(
            metadata.content_md5.as_deref(),
            metadata.content_sha256.as_deref(),
            HatracError::Conflict,
        )?;

        let version = generate_version_id();
        let target = self.version_path(name, &version);
        Self::ensure_parent(&target).await?;
        fs::rename(&path, &target).await.map_err(io_internal)?;

        debug!(name = %name, handle, version, "finalized chunked upload");
        Ok(StoredVersion {
            version,
            digests: Some(digests),
            aux: AuxRecord::default(),
        })
    }

    async fn cancel_upload(&self, _name: &NamePath, handle: &str) -> HatracResult<()> {
        let path = self.uploads_dir().join(handle);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_internal(e)),
        }
    }

    fn address(&self, name: &NamePath, version: &str) -> String {
        self.version_path(name, version).display().to_string()
    }
}
