use thiserror::Error;

use crate::grammar::ParseError;

/// Which part of an HTTP exchange failed at the network level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// The connection could not be established or was dropped.
    Connection,
    /// The response body could not be read completely.
    Payload,
    /// The request did not finish within its timeout.
    Timeout,
}

/// Errors returned by argument handling and task operations.
#[derive(Error, Debug)]
pub enum SdError {
    /// The argument text could not be parsed.
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// The job parameters were rejected before submission.
    #[error("Invalid arguments: {0}")]
    Validation(String),

    /// The backend answered with a non-zero status code.
    #[error("API Error: {message} ({code})")]
    Api { code: i64, message: String },

    /// The backend ran the task and reported a failure.
    #[error("Task Error: {0}")]
    Task(String),

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        kind: NetworkErrorKind,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The backend returned a non-success HTTP status.
    #[error("Backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response was missing expected fields or had unexpected values.
    #[error("{0}")]
    InvalidResponse(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading a config file or compressing a request body failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client configuration is unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// An internal budget invariant was violated. Not a user error.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// The caller abandoned the job.
    #[error("Task was cancelled")]
    Cancelled,
}

impl SdError {
    /// Wrap a transport failure, classifying it the way the poll loop needs.
    pub(crate) fn from_reqwest(context: impl Into<String>, err: reqwest::Error) -> Self {
        let context = context.into();
        if err.is_builder() {
            return SdError::Config(format!("{}: {}", context, err));
        }
        let kind = if err.is_timeout() {
            NetworkErrorKind::Timeout
        } else if err.is_body() || err.is_decode() {
            NetworkErrorKind::Payload
        } else {
            NetworkErrorKind::Connection
        };
        SdError::Network {
            context,
            kind,
            source: Box::new(err),
        }
    }

    /// Whether the poll loop may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SdError::Network { .. })
    }

    /// Whether this error is meant to be shown to the person who requested
    /// the job. Configuration and invariant failures are operator bugs and
    /// cancellation means nobody is listening.
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            SdError::Config(_) | SdError::Invariant(_) | SdError::Cancelled
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SdError>;
