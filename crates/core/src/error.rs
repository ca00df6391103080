//! Unified error types for disscache.
//!
//! Display strings carry a stable code prefix so log lines and client
//! responses can be grepped by kind.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Failure reported by a compute function.
///
/// `status` is the client-visible status the failure should be answered with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ComputeError {
    pub status: u16,
    pub message: String,
}

impl ComputeError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    /// Failure of the server side rather than an answer about the request.
    /// Such failures are transient and never cached.
    pub fn is_server_error(&self) -> bool {
        !(100..500).contains(&self.status)
    }
}

/// Unified error types for the response cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No provider could resolve the resource.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// The resource exists but has no retrievable binary payload.
    #[error("NO_BINARY: {0}")]
    NoBinaryContent(String),

    /// Fetching a binary from its source returned a non-success status.
    #[error("NO_FILE: {0}")]
    NoFileAtSource(String),

    /// The source refused access to the resource.
    #[error("UNAUTHORIZED: {0}")]
    Unauthorized(String),

    /// The backing store could not be opened.
    #[error("STORE_UNAVAILABLE: {0}")]
    StoreUnavailable(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be decoded.
    #[error("CORRUPT_ENTRY: {0}")]
    CorruptEntry(String),

    /// Invalid eviction policy, compression scheme or similar misuse.
    #[error("UNSUPPORTED: {0}")]
    Unsupported(String),

    /// The compute function failed for the given response key.
    #[error("COMPUTE_FAILED: {error}")]
    Compute { response_key: String, error: ComputeError },

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Invalid input parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// HTTP error talking to a provider.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// Filesystem error.
    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Status code a failure is answered with when turned into a response.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(_) | Error::NoBinaryContent(_) => 404,
            Error::Unauthorized(_) => 401,
            Error::InvalidInput(_) | Error::InvalidUrl(_) => 400,
            Error::NoFileAtSource(_) => 502,
            Error::Compute { error, .. } => error.status,
            _ => 500,
        }
    }

    /// Whether the failure is an expected, client-facing outcome rather than
    /// an internal fault.
    pub fn is_ordinary(&self) -> bool {
        match self {
            Error::Compute { error, .. } => !error.is_server_error(),
            _ => matches!(
                self,
                Error::NotFound(_)
                    | Error::NoBinaryContent(_)
                    | Error::NoFileAtSource(_)
                    | Error::Unauthorized(_)
                    | Error::InvalidInput(_)
                    | Error::InvalidUrl(_)
            ),
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::InvalidInput(_) | Error::InvalidUrl(_) => -32602,
            Error::NotFound(_) => -32001,
            Error::NoBinaryContent(_) => -32003,
            Error::NoFileAtSource(_) => -32004,
            Error::Unauthorized(_) => -32005,
            Error::Compute { .. } => -32006,
            Error::Unsupported(_) => -32007,
            Error::HttpError(_) => -32008,
            Error::StoreUnavailable(_)
            | Error::Database(_)
            | Error::MigrationFailed(_)
            | Error::CorruptEntry(_) => -32002,
            Error::Io(_) => -32000,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
