use chrono::{DateTime, Utc};
use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;
pub type DecodeResult<T> = Result<T, DecodeError>;
pub type StorageResult<T> = Result<T, StorageError>;

/// Reasons a session check resolves to "unauthenticated".
///
/// None of these leave the predicate surface of [`crate::Session`]; they are
/// exposed through [`crate::SessionState::Invalid`] and the logs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no token in session storage")]
    NoToken,
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("token expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },
    #[error("session storage unavailable in this execution context")]
    StorageUnavailable,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::NoToken => "no_token",
            SessionError::Decode(_) => "decode_error",
            SessionError::Expired { .. } => "expired",
            SessionError::StorageUnavailable => "storage_unavailable",
            SessionError::Storage(_) => "storage_error",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("token must have 3 dot-separated segments, found {0}")]
    Segments(usize),
    #[error("token payload is not valid base64url: {0}")]
    Base64(String),
    #[error("malformed claim payload: {0}")]
    Json(String),
    #[error("required claim '{0}' missing")]
    MissingClaim(&'static str),
    #[error("invalid claim '{0}' with value '{1}'")]
    InvalidClaim(&'static str, String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage lock poisoned")]
    Poisoned,
    #[error("storage I/O failed for {path}: {message}")]
    Io { path: String, message: String },
    #[error("storage file {path} is corrupt: {message}")]
    Corrupt { path: String, message: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NavigationError {
    #[error("navigation is not supported in this execution context")]
    Unsupported,
    #[error("navigation to '{path}' failed: {message}")]
    Failed { path: String, message: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BearerError {
    #[error("authorization header malformed")]
    InvalidAuthorization,
    #[error("bearer token is empty")]
    EmptyToken,
}
