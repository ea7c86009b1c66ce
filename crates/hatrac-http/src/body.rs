//! Response body modes.
//!
//! Small bodies (listings, ACL documents, error pages) are buffered;
//! object content streams chunk by chunk from the storage backend so
//! large payloads never materialize in memory.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use http_body_util::Full;

use hatrac_storage::ByteStream;

/// Response body supporting empty, buffered, and streaming modes.
pub enum HatracBody {
    /// No body: 204 responses, HEAD mirrors, redirects.
    Empty,
    /// Buffered body for small payloads.
    Buffered(Full<Bytes>),
    /// Streaming body fed from a storage backend.
    Streaming(ByteStream),
}

impl Default for HatracBody {
    fn default() -> Self {
        Self::Empty
    }
}

impl std::fmt::Debug for HatracBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Buffered(_) => f.write_str("Buffered"),
            Self::Streaming(_) => f.write_str("Streaming"),
        }
    }
}

impl HatracBody {
    /// Create an empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }

    /// Create a buffered body from bytes.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Buffered(Full::new(data.into()))
    }

    /// Create a buffered body from a UTF-8 string.
    #[must_use]
    pub fn from_string(text: impl Into<String>) -> Self {
        Self::Buffered(Full::new(Bytes::from(text.into())))
    }

    /// Create a streaming body from a storage byte stream.
    #[must_use]
    pub fn streaming(stream: ByteStream) -> Self {
        Self::Streaming(stream)
    }
}

impl http_body::Body for HatracBody {
    type Data = Bytes;
    type Error = std::io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Empty => Poll::Ready(None),
            Self::Buffered(full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Self::Streaming(stream) => match Pin::new(stream).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    Poll::Ready(Some(Ok(http_body::Frame::data(chunk))))
                }
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Buffered(full) => full.is_end_stream(),
            Self::Streaming(_) => false,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            Self::Empty => http_body::SizeHint::with_exact(0),
            Self::Buffered(full) => full.size_hint(),
            Self::Streaming(_) => http_body::SizeHint::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use http_body::Body;
    use http_body_util::BodyExt;

    #[test]
    fn test_should_report_empty_body_as_end_of_stream() {
        let body = HatracBody::empty();
        assert!(body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(0));
    }

    #[test]
    fn test_should_size_buffered_body() {
        let body = HatracBody::from_string("hello");
        assert!(!body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(5));
    }

    #[tokio::test]
    async fn test_should_stream_chunks_in_order() {
        let chunks: Vec<std::io::Result<Bytes>> =
            vec![Ok(Bytes::from("ab")), Ok(Bytes::from("cd"))];
        let body = HatracBody::streaming(futures_util::stream::iter(chunks).boxed());

        let collected = body
            .collect()
            .await
            .unwrap_or_else(|e| panic!("collect failed: {e}"));
        assert_eq!(collected.to_bytes().as_ref(), b"abcd");
    }
}
