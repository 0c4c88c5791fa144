//! Version-gated auth configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::ConfigError;

/// Path watched when the token names none
pub const DEFAULT_VERSION_PATH: &str = "/version";

/// Claim carrying the version the token was issued for
pub const REQUIRE_VERSION_CLAIM: &str = "requireVersion";

/// Claim overriding the watched path
pub const VERSION_PATH_CLAIM: &str = "versionPath";

/// Where the watchdog looks for the pinned version.
///
/// ```toml
/// default_version_path = "/schema/version"
/// require_version_claim = "requireVersion"
/// version_path_claim = "versionPath"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VersionAuthConfig {
    /// Watched path when the token has no path claim
    pub default_version_path: String,
    /// Name of the required version claim
    pub require_version_claim: String,
    /// Name of the optional path claim
    pub version_path_claim: String,
}

impl Default for VersionAuthConfig {
    fn default() -> Self {
        Self {
            default_version_path: DEFAULT_VERSION_PATH.to_string(),
            require_version_claim: REQUIRE_VERSION_CLAIM.to_string(),
            version_path_claim: VERSION_PATH_CLAIM.to_string(),
        }
    }
}

impl VersionAuthConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Check field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.default_version_path.starts_with('/') {
            return Err(ConfigError::invalid(
                "default_version_path",
                format!(
                    "must be an absolute path, got {:?}",
                    self.default_version_path
                ),
            ));
        }
        if self.require_version_claim.is_empty() {
            return Err(ConfigError::invalid(
                "require_version_claim",
                "must not be empty",
            ));
        }
        if self.version_path_claim.is_empty() {
            return Err(ConfigError::invalid("version_path_claim", "must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_token_contract() {
        let config = VersionAuthConfig::default();
        assert_eq!(config.default_version_path, "/version");
        assert_eq!(config.require_version_claim, "requireVersion");
        assert_eq!(config.version_path_claim, "versionPath");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config =
            VersionAuthConfig::from_toml_str("default_version_path = \"/meta/schema\"").unwrap();
        assert_eq!(config.default_version_path, "/meta/schema");
        assert_eq!(config.require_version_claim, "requireVersion");
    }

    #[test]
    fn test_relative_path_rejected() {
        let err = VersionAuthConfig::from_toml_str("default_version_path = \"version\"")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "default_version_path",
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = VersionAuthConfig::from_toml_str("version = \"v1\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "require_version_claim = \"schema\"").unwrap();
        let config = VersionAuthConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.require_version_claim, "schema");
    }
}
