//! Error taxonomy for the Hatrac service.
//!
//! [`HatracError`] is a closed sum of every failure kind the service can
//! report to a client. Handlers and stores return it through
//! [`HatracResult`]; the HTTP layer maps each variant to a status code and
//! negotiates the response body against the configured error templates.
//!
//! Internal failures carry an [`anyhow::Error`] with full context for the
//! logs, but the client-visible description is redacted to a generic
//! message.

/// Error type covering the full Hatrac failure taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum HatracError {
    /// Malformed request: bad path syntax, invalid digest encoding, bad
    /// Content-Disposition, invalid ACL document, and similar.
    #[error("{0}")]
    BadRequest(String),

    /// Access denied for an anonymous client.
    #[error("{0}")]
    Unauthorized(String),

    /// Access denied for an authenticated client.
    #[error("{0}")]
    Forbidden(String),

    /// The named resource does not exist or is not available.
    #[error("{0}")]
    NotFound(String),

    /// The request method is not supported on this resource kind.
    #[error("request method not allowed on this resource")]
    MethodNotAllowed,

    /// The request conflicts with current server state: name reuse,
    /// non-empty delete, immutable-field rewrite, chunk out of range.
    #[error("{0}")]
    Conflict(String),

    /// A Content-Length header is required for this request.
    #[error("content-length required for this request")]
    LengthRequired,

    /// An `If-Match` / `If-None-Match` precondition did not hold.
    #[error("request precondition failed for this resource state")]
    PreconditionFailed,

    /// The request payload exceeds the configured maximum.
    #[error("request payload exceeds limit of {limit} bytes")]
    PayloadTooLarge {
        /// The configured `max_request_payload_size`.
        limit: u64,
    },

    /// A syntactically valid Range header that cannot be satisfied.
    #[error("requested range not satisfiable over {total} bytes")]
    RangeNotSatisfiable {
        /// Total size of the addressed content.
        total: u64,
    },

    /// The request asks for functionality the service does not implement.
    #[error("{0}")]
    NotImplemented(String),

    /// Internal error with context. The context is logged; clients see a
    /// redacted message.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HatracError {
    /// Build a [`HatracError::BadRequest`].
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Build a [`HatracError::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Build a [`HatracError::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Build a [`HatracError::NotImplemented`].
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::NotImplemented(message.into())
    }

    /// The HTTP status code this error maps to.
    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::LengthRequired => StatusCode::LENGTH_REQUIRED,
            Self::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short reason-phrase style title for the error.
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "Bad Request",
            Self::Unauthorized(_) => "Unauthorized",
            Self::Forbidden(_) => "Forbidden",
            Self::NotFound(_) => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::Conflict(_) => "Conflict",
            Self::LengthRequired => "Length Required",
            Self::PreconditionFailed => "Precondition Failed",
            Self::PayloadTooLarge { .. } => "Payload Too Large",
            Self::RangeNotSatisfiable { .. } => "Range Not Satisfiable",
            Self::NotImplemented(_) => "Not Implemented",
            Self::Internal(_) => "Internal Server Error",
        }
    }

    /// Client-visible description. Internal errors are redacted; the full
    /// chain stays in the logs.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Internal(_) => "internal service error".to_owned(),
            other => other.to_string(),
        }
    }
}

/// Convenience result type for Hatrac operations.
pub type HatracResult<T> = Result<T, HatracError>;
