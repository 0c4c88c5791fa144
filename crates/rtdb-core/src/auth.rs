//! Authentication results and token claims

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Custom claims embedded in an authentication token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthClaims(Map<String, Value>);

impl AuthClaims {
    /// Empty claim set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Raw claim value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Claim value when it is a non-empty string
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Borrow the underlying map
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for AuthClaims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Result delivered by a successful `auth` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResult {
    /// Claims carried by the token
    pub auth: AuthClaims,
    /// Expiry as seconds since the Unix epoch, if the token expires
    pub expires: Option<u64>,
}

impl AuthResult {
    /// Create an auth result from its claims
    pub fn new(auth: AuthClaims) -> Self {
        Self {
            auth,
            expires: None,
        }
    }

    /// Set the expiry
    pub fn with_expires(mut self, expires: u64) -> Self {
        self.expires = Some(expires);
        self
    }
}
