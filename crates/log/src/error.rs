//! Logging errors

/// Result alias for logging setup
pub type LogResult<T> = Result<T, LogError>;

/// Errors raised while installing the subscriber
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The level/filter directive could not be parsed
    #[error("invalid filter directive: {0}")]
    Filter(String),

    /// A global subscriber was already installed
    #[error("logger already initialized: {0}")]
    AlreadyInitialized(String),
}
