//! Rate engine error types.

use thiserror::Error;

/// Errors surfaced by the rate engine and its collaborators.
///
/// The display form is the bare message so callers can re-wrap it with
/// their own context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateError {
    /// Bad or missing input.
    #[error("{0}")]
    InvalidArgument(String),

    /// No entity for the given identity.
    #[error("{0}")]
    NotFound(String),

    /// The rate provider or the store failed.
    #[error("{0}")]
    Upstream(String),

    /// Anything uncategorized.
    #[error("{0}")]
    Unexpected(String),
}

/// Coarse classification of a [`RateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Upstream,
    Unexpected,
}

impl RateError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        RateError::InvalidArgument(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        RateError::NotFound(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        RateError::Upstream(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        RateError::Unexpected(message.into())
    }

    /// The error message without classification.
    pub fn message(&self) -> &str {
        match self {
            RateError::InvalidArgument(m)
            | RateError::NotFound(m)
            | RateError::Upstream(m)
            | RateError::Unexpected(m) => m,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RateError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            RateError::NotFound(_) => ErrorKind::NotFound,
            RateError::Upstream(_) => ErrorKind::Upstream,
            RateError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// HTTP status class a routing layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidArgument => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Upstream | ErrorKind::Unexpected => 500,
        }
    }

    /// Stable error code for responses and logs.
    pub fn error_code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Upstream => "UPSTREAM_FAILURE",
            ErrorKind::Unexpected => "UNEXPECTED",
        }
    }
}

impl From<reqwest::Error> for RateError {
    fn from(err: reqwest::Error) -> Self {
        RateError::Upstream(format!("Rate provider request failed: {}", err))
    }
}

/// Result type for rate operations.
pub type RateResult<T> = Result<T, RateError>;
