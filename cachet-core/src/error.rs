//! Error types for cache operations.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache errors.
///
/// The unit variants are sentinels: callers classify an error by matching on
/// the variant, never by inspecting the message. Decorators and the driver
/// registry forward backend errors untouched, so classification keeps working
/// through any number of wrappers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Key not found
    #[error("cache: key not found")]
    NotFound,

    /// Stored value has the wrong type or cannot be interpreted
    #[error("cache: invalid value")]
    InvalidValue,

    /// Key expired
    #[error("cache: key expired")]
    KeyExpired,

    /// Connection to the backend was lost
    #[error("cache: connection lost")]
    ConnectionLost,

    /// Operation timeout
    #[error("cache: operation timeout")]
    Timeout,

    /// Backend is at capacity
    #[error("cache: cache is full")]
    CacheFull,

    /// Operation was cancelled through its context
    #[error("cache: operation cancelled")]
    Cancelled,

    /// Configuration error
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// No driver registered under the requested name
    #[error("cache driver {0:?} not found")]
    DriverNotFound(String),

    /// Backend does not implement the requested capability
    #[error("cache: operation not supported: {0}")]
    Unsupported(String),

    /// Backend-specific failure
    #[error("cache backend error: {0}")]
    Backend(String),
}

impl CacheError {
    /// Check if this error means the key does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Check if this error is an operation timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Check if this error comes from a cancelled context.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this error indicates connection loss.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionLost)
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionLost | Self::Timeout)
    }
}

/// Check whether `err` is [`CacheError::NotFound`].
pub fn is_not_found(err: &CacheError) -> bool {
    err.is_not_found()
}

/// Check whether `err` is [`CacheError::Timeout`].
pub fn is_timeout(err: &CacheError) -> bool {
    err.is_timeout()
}
