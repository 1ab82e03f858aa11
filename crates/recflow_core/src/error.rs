//! Error types for record streams.

use thiserror::Error;

/// Result type for stream and operation results.
pub type FlowResult<T> = Result<T, FlowError>;

/// Errors surfaced by record streams.
///
/// Consumer cancellation is not an error: a cancelled stream simply stops
/// emitting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Transport or service error reported by the remote call.
    #[error("service error: {message}")]
    Service {
        /// Error message.
        message: String,
        /// Whether the caller may retry the operation.
        retryable: bool,
    },

    /// A single item failed inside an otherwise succeeding batch.
    #[error("item {key} failed: {message}")]
    ItemFailed {
        /// Display form of the item key.
        key: String,
        /// Error message.
        message: String,
    },

    /// The item key is absent from the backing collection.
    #[error("item not found: {key}")]
    NotFound {
        /// Display form of the missing key.
        key: String,
    },

    /// The remote callback reported neither a result nor an error.
    #[error("operation finished without a result")]
    MissingResult,

    /// Invalid operation configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The remote service rejected the request as malformed.
    #[error("operation rejected: {0}")]
    Rejected(String),
}

impl FlowError {
    /// Creates a retryable service error.
    pub fn service_retryable(message: impl Into<String>) -> Self {
        Self::Service {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable service error.
    pub fn service_fatal(message: impl Into<String>) -> Self {
        Self::Service {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a partial-item error.
    pub fn item_failed(key: impl ToString, message: impl Into<String>) -> Self {
        Self::ItemFailed {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(key: impl ToString) -> Self {
        Self::NotFound {
            key: key.to_string(),
        }
    }

    /// Returns true if the caller may retry the operation.
    ///
    /// Nothing inside this crate retries; the flag is informational.
    pub fn is_retryable(&self) -> bool {
        match self {
            FlowError::Service { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Returns true if the error is scoped to one item rather than the batch.
    pub fn is_item_scoped(&self) -> bool {
        matches!(self, FlowError::ItemFailed { .. } | FlowError::NotFound { .. })
    }
}

/// Converts a nullable `(result, error)` callback pair into a result.
///
/// The error wins when both are present. When both are absent the outcome
/// is [`FlowError::MissingResult`].
pub fn outcome_from_parts<T>(result: Option<T>, error: Option<FlowError>) -> FlowResult<T> {
    match (result, error) {
        (_, Some(error)) => Err(error),
        (Some(result), None) => Ok(result),
        (None, None) => Err(FlowError::MissingResult),
    }
}
