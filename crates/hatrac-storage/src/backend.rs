//! The storage backend abstraction.
//!
//! Backends move payload bytes; they never decide lifecycle or
//! authorization. Input payloads arrive as sized byte streams so large
//! bodies are never materialized in memory; reads come back as either a
//! byte stream or a redirect URL (presigned S3).
//!
//! Backends signal a missing object version with
//! [`HatracError::NotFound`], which the overlay backend uses to fall
//! through to the next layer.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use hatrac_core::digest::{ContentDigests, ContentHasher};
use hatrac_core::{HatracError, HatracResult};
use hatrac_model::meta::ContentMetadata;
use hatrac_model::name::NamePath;
use hatrac_model::resource::AuxRecord;

/// A payload byte stream with I/O errors.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Read buffer size for streaming file and network reads.
pub(crate) const STREAM_BUF_SIZE: usize = 64 * 1024;

/// The result of storing a new version's bytes.
#[derive(Debug)]
pub struct StoredVersion {
    /// The issued client-visible version id.
    pub version: String,
    /// Digests computed over the stored bytes, where the backend could
    /// observe them (S3 multipart assembly cannot).
    pub digests: Option<ContentDigests>,
    /// Aux addressing produced by the backend (e.g. S3 version id for
    /// versioned buckets).
    pub aux: AuxRecord,
}

/// The result of a content read.
pub enum ContentGet {
    /// Bytes streamed through the service.
    Stream {
        /// The payload stream for this response.
        stream: ByteStream,
        /// Bytes in this response (the range length, or the full size).
        nbytes: u64,
        /// Full size of the stored content.
        total: u64,
        /// The satisfied range, if this is a partial read.
        range: Option<(u64, u64)>,
    },
    /// The client should fetch the bytes directly from this URL.
    Redirect {
        /// A time-limited URL serving the content.
        url: String,
    },
}

impl std::fmt::Debug for ContentGet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream { nbytes, total, range, .. } => f
                .debug_struct("Stream")
                .field("nbytes", nbytes)
                .field("total", total)
                .field("range", range)
                .finish_non_exhaustive(),
            Self::Redirect { url } => f.debug_struct("Redirect").field("url", url).finish(),
        }
    }
}

/// Bulk byte storage for object versions and chunked upload jobs.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Store a complete version payload, returning the issued version id.
    /// Declared digests in `metadata` are verified against the streamed
    /// bytes where the backend observes them.
    async fn create_from_stream(
        &self,
        name: &NamePath,
        body: ByteStream,
        nbytes: u64,
        metadata: &ContentMetadata,
    ) -> HatracResult<StoredVersion>;

    /// Read version content, optionally a single inclusive byte range.
    /// `nbytes` is the directory's recorded size, when known.
    async fn get_content(
        &self,
        name: &NamePath,
        version: &str,
        range: Option<(u64, u64)>,
        nbytes: Option<u64>,
        metadata: &ContentMetadata,
        aux: &AuxRecord,
    ) -> HatracResult<ContentGet>;

    /// Delete stored bytes for a version.
    async fn delete(&self, name: &NamePath, version: &str, aux: &AuxRecord) -> HatracResult<()>;

    /// Reserve backend state for a chunked upload of `nbytes` total.
    /// Returns the backend handle tracked in the upload job.
    async fn create_upload(
        &self,
        name: &NamePath,
        nbytes: u64,
        metadata: &ContentMetadata,
    ) -> HatracResult<String>;

    /// Store one chunk at `position`. Returns the chunk aux record the
    /// directory tracks for finalization.
    async fn upload_chunk(
        &self,
        name: &NamePath,
        handle: &str,
        position: u64,
        chunk_length: u64,
        nbytes: u64,
        body: ByteStream,
    ) -> HatracResult<serde_json::Value>;

    /// Assemble recorded chunks into a new version.
    async fn finalize_upload(
        &self,
        name: &NamePath,
        handle: &str,
        chunks: &[(i64, serde_json::Value)],
        metadata: &ContentMetadata,
    ) -> HatracResult<StoredVersion>;

    /// Release backend state for a cancelled upload.
    async fn cancel_upload(&self, name: &NamePath, handle: &str) -> HatracResult<()>;

    /// The backend storage key for a version, for diagnostics and
    /// migration tooling.
    fn address(&self, name: &NamePath, version: &str) -> String;

    /// A time-limited direct-download URL, where the backend supports
    /// one.
    async fn presigned_get(
        &self,
        _name: &NamePath,
        _version: &str,
        _aux: &AuxRecord,
        _ttl: std::time::Duration,
    ) -> HatracResult<Option<String>> {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Shared streaming helpers
// ---------------------------------------------------------------------------

/// Drain a payload stream into an async writer, hashing as it flows.
/// The stream must deliver exactly `expected` bytes.
pub(crate) async fn drain_to_writer<W>(
    mut body: ByteStream,
    expected: u64,
    writer: &mut W,
) -> HatracResult<ContentDigests>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut hasher = ContentHasher::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| {
            HatracError::bad_request(format!("error reading request payload: {e}"))
        })?;
        hasher.update(&chunk);
        if hasher.nbytes() > expected {
            return Err(HatracError::bad_request(format!(
                "payload exceeds declared length of {expected} bytes"
            )));
        }
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| HatracError::Internal(anyhow::Error::new(e).context("storage write")))?;
    }
    if hasher.nbytes() != expected {
        return Err(HatracError::bad_request(format!(
            "received {} of {expected} expected bytes",
            hasher.nbytes()
        )));
    }
    writer
        .flush()
        .await
        .map_err(|e| HatracError::Internal(anyhow::Error::new(e).context("storage flush")))?;
    Ok(hasher.finish())
}

/// Stream exactly `remaining` bytes out of an async reader.
pub(crate) fn reader_stream<R>(reader: R, remaining: u64) -> ByteStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    futures_util::stream::unfold((reader, remaining), |(mut reader, remaining)| async move {
        if remaining == 0 {
            return None;
        }
        let cap = remaining.min(STREAM_BUF_SIZE as u64) as usize;
        let mut buf = vec![0u8; cap];
        match reader.read(&mut buf).await {
            Ok(0) => Some((
                Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("content truncated with {remaining} bytes remaining"),
                )),
                (reader, 0),
            )),
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), (reader, remaining - n as u64)))
            }
            Err(e) => Some((Err(e), (reader, 0))),
        }
    })
    .boxed()
}

/// Compute digests over an entire async reader without retaining data.
pub(crate) async fn digest_reader<R>(mut reader: R) -> HatracResult<ContentDigests>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = ContentHasher::new();
    let mut buf = vec![0u8; STREAM_BUF_SIZE];
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| HatracError::Internal(anyhow::Error::new(e).context("digest read")))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish())
}

/// Build a payload stream from in-memory bytes, for tests and small
/// internal transfers.
#[must_use]
pub fn stream_from_bytes(data: impl Into<Bytes>) -> ByteStream {
    futures_util::stream::iter([Ok(data.into())]).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_should_drain_stream_and_hash() {
        let mut sink = Vec::new();
        let digests = drain_to_writer(stream_from_bytes("hello, world!\n"), 14, &mut sink)
            .await
            .unwrap_or_else(|e| panic!("drain failed: {e}"));
        assert_eq!(sink, b"hello, world!\n");
        assert_eq!(digests.nbytes, 14);
        assert_eq!(digests, ContentDigests::of(b"hello, world!\n"));
    }

    #[tokio::test]
    async fn test_should_reject_short_payload() {
        let mut sink = Vec::new();
        let err = drain_to_writer(stream_from_bytes("abc"), 10, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, HatracError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_should_reject_oversized_payload() {
        let mut sink = Vec::new();
        let err = drain_to_writer(stream_from_bytes("abcdef"), 3, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, HatracError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_should_stream_exact_reader_window() {
        let data = b"0123456789".to_vec();
        let mut stream = reader_stream(std::io::Cursor::new(data), 4);
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap_or_else(|e| panic!("read failed: {e}")));
        }
        assert_eq!(collected, b"0123");
    }

    #[tokio::test]
    async fn test_should_error_on_truncated_reader() {
        let data = b"ab".to_vec();
        let mut stream = reader_stream(std::io::Cursor::new(data), 5);
        let mut saw_error = false;
        while let Some(chunk) = stream.next().await {
            if chunk.is_err() {
                saw_error = true;
            }
        }
        assert!(saw_error);
    }
}
