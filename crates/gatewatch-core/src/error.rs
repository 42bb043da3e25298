//! Error types for Gatewatch

use std::time::Duration;

use thiserror::Error;

/// Result type alias using Gatewatch's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Gatewatch operations
#[derive(Error, Debug)]
pub enum Error {
    /// Caller supplied an argument outside the operation's contract
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A collaborator (metrics source, notifier) could not serve the request
    #[error("{component} unavailable: {reason}")]
    UpstreamUnavailable {
        /// Collaborator that failed
        component: String,
        /// What went wrong
        reason: String,
    },

    /// A collaborator call exceeded its deadline
    #[error("{component} timed out after {}s", .after.as_secs())]
    Timeout {
        /// Collaborator that timed out
        component: String,
        /// Deadline that elapsed
        after: Duration,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an upstream unavailable error
    pub fn upstream(component: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            component: component.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(component: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            component: component.into(),
            after,
        }
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the failure is expected to clear up by the next scheduled cycle
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable { .. } | Self::Timeout { .. } | Self::Http(_) | Self::Io(_)
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
