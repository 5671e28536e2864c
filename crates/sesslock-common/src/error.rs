//! Error types for sesslock
//!
//! Lock contention is deliberately absent: a failed acquire is an expected,
//! recoverable outcome and is reported as `Ok(false)` by the lock and session
//! APIs rather than as an error.

/// Errors surfaced by the session store
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid path: '{0}'")]
    InvalidPath(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl SessionError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::BackendUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
