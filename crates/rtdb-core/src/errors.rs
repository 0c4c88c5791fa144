//! Error type reported by realtime database clients
//!
//! Clients surface domain failures (rule denials, invalid arguments, expired
//! tokens) through their callbacks as a [`ClientError`]. The adapters in
//! `rtdb-promise` carry these values through unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure category reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Security rules rejected the operation
    PermissionDenied,
    /// The arguments were malformed (bad path, unsupported value)
    InvalidArgument,
    /// The connection dropped before the operation completed
    Disconnected,
    /// A later write superseded this one (transactions)
    Overridden,
    /// The authentication token has expired
    ExpiredToken,
    /// The authentication token was rejected
    InvalidToken,
    /// The backend is temporarily unavailable
    Unavailable,
    /// Anything the client does not classify
    Other,
}

impl ErrorCode {
    /// Wire name of the code, as the client reports it
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::Disconnected => "DISCONNECTED",
            Self::Overridden => "OVERRIDDEN",
            Self::ExpiredToken => "EXPIRED_TOKEN",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::Unavailable => "UNAVAILABLE",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error value delivered by the client to a completion or cancel callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ClientError {
    /// Failure category
    pub code: ErrorCode,
    /// Human readable detail
    pub message: String,
}

impl ClientError {
    /// Create an error with an explicit code
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a permission denied error
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    /// Create a disconnected error
    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Disconnected, message)
    }

    /// Create an overridden error
    pub fn overridden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Overridden, message)
    }

    /// Create an expired token error
    pub fn expired_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExpiredToken, message)
    }

    /// Create an invalid token error
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, message)
    }

    /// Create an unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    /// Create an unclassified error
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Other, message)
    }

    /// True when security rules rejected the operation
    pub fn is_permission_denied(&self) -> bool {
        self.code == ErrorCode::PermissionDenied
    }
}

/// Standard Result type for synchronous client calls
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::permission_denied("no read access to /version");
        assert_eq!(
            err.to_string(),
            "PERMISSION_DENIED: no read access to /version"
        );
        assert!(err.is_permission_denied());
    }

    #[test]
    fn test_error_code_serde_uses_wire_names() {
        let json = serde_json::to_string(&ErrorCode::ExpiredToken).unwrap();
        assert_eq!(json, "\"EXPIRED_TOKEN\"");
        let code: ErrorCode = serde_json::from_str("\"OVERRIDDEN\"").unwrap();
        assert_eq!(code, ErrorCode::Overridden);
    }
}
