//! Error types surfaced by the adapters

use rtdb_core::ClientError;

/// Rejection reason of a [`Pending`](crate::Pending) operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromiseError {
    /// The client reported a failure for a write or transaction
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A one-shot read was cancelled; the client gives no detail
    #[error("read was cancelled by the client")]
    ReadCancelled,

    /// The client dropped the callback without ever invoking it
    #[error("client dropped the completion callback without invoking it")]
    CallbackDropped,
}

impl PromiseError {
    /// The client error carried by this rejection, if any
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            Self::Client(err) => Some(err),
            Self::ReadCancelled | Self::CallbackDropped => None,
        }
    }
}

/// Reason a version-gated session ended or never started
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionAuthError {
    /// The underlying authentication call failed
    #[error("failed to authenticate: {0}")]
    AuthFailed(ClientError),

    /// The client revoked an established session
    #[error("auth was cancelled: {0}")]
    AuthCancelled(ClientError),

    /// The token carries no usable version claim
    #[error("error authenticating: token does not contain a valid '{claim}' value")]
    MissingRequiredVersion {
        /// Claim name that was looked up
        claim: String,
    },

    /// The live version no longer matches the token
    #[error(
        "not running against required schema: authenticated for version {expected}, live version {observed}"
    )]
    VersionMismatch {
        /// Version captured from the token
        expected: String,
        /// Value observed at the version path
        observed: serde_json::Value,
    },

    /// The version path listener was revoked
    #[error("unable to listen to schema version: {0}")]
    WatchFailed(ClientError),

    /// The version path itself was rejected by the client
    #[error("invalid version path {path:?}: {source}")]
    InvalidVersionPath {
        /// Path taken from the claims or configuration
        path: String,
        /// Error returned by the client
        source: ClientError,
    },
}

/// Invalid version-auth configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A field failed validation
    #[error("invalid configuration field '{field}': {message}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        message: String,
    },

    /// The configuration file could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    /// Create a field validation error
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}
