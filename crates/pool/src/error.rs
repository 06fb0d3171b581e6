//! Error types for the client pool
use thiserror::Error;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed source carried by [`SessionError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the pool itself.
///
/// Caller-facing variants (`NoHealthyClients`, `QueueTimeout`, `ShutDown`) are
/// returned to the caller that triggered them. `Session` only reaches callers
/// through [`SessionError`] conversions; inside the pool it is recovered by
/// marking the resource unhealthy.
#[derive(Error, Debug)]
pub enum Error {
    /// Pool configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// No resource in the pool is ready; the request was not queued
    #[error("No healthy clients available ({pool_size} in pool)")]
    NoHealthyClients {
        /// Pool size
        pool_size: usize,
    },

    /// A queued acquire waited longer than its timeout
    #[error("Queue timeout after {timeout_ms}ms, all clients busy ({waiters} still waiting)")]
    QueueTimeout {
        /// The timeout that elapsed, in milliseconds
        timeout_ms: u64,
        /// Number of waiters left in the queue after this one was removed
        waiters: usize,
    },

    /// Warmup finished with zero ready resources
    #[error("Warmup failed: none of {pool_size} clients could be initialized")]
    WarmupFailed {
        /// Pool size
        pool_size: usize,
    },

    /// Session establishment failed
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The pool was shut down while the request was waiting
    #[error("Pool is shut down")]
    ShutDown,
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QueueTimeout { .. })
    }
}

/// Failure reported by a [`SessionProvider`](crate::session::SessionProvider)
/// while establishing or re-establishing a session.
#[derive(Error, Debug)]
#[error("Session error: {message}")]
pub struct SessionError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl SessionError {
    /// Create a session error with a message
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create a session error wrapping an underlying cause
    pub fn with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<BoxError>,
    {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The error message, without the `Session error:` prefix
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Error returned by [`ClientPool::execute`](crate::pool::ClientPool::execute).
///
/// `Pool` means the operation never ran; `Operation` carries the caller's own
/// error unchanged.
#[derive(Error, Debug)]
pub enum ExecuteError<E> {
    /// Acquiring a resource failed
    #[error(transparent)]
    Pool(Error),

    /// The operation itself failed
    #[error("{0}")]
    Operation(E),
}

impl<E> ExecuteError<E> {
    /// Returns the operation error, if the operation ran and failed.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(err) => Some(err),
            Self::Pool(_) => None,
        }
    }

    /// Returns the pool error, if the operation never ran.
    #[must_use]
    pub fn as_pool(&self) -> Option<&Error> {
        match self {
            Self::Pool(err) => Some(err),
            Self::Operation(_) => None,
        }
    }
}
