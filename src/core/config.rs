//! Validator configuration
//!
//! Loaded from TOML, for example:
//!
//! ```toml
//! strict = false
//! reject_unknown_fields = true
//! sensitive_claims = ["sub"]
//! declared_providers = ["arn:aws:iam::412381736597:oidc-provider/gitlab.com"]
//! ```

use crate::error::{PolicyError, Result};
use crate::iam::ParseOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use validator::Validate;

/// Settings for parsing and validating trust policies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct ValidatorConfig {
    /// Upgrade every Warning finding to an Error
    pub strict: bool,

    /// Reject unrecognized JSON keys instead of skipping them
    pub reject_unknown_fields: bool,

    /// Claim names where a bare wildcard pattern is flagged (matched against the
    /// part of the condition key after the last `:`, or the whole key)
    #[validate(length(min = 1, message = "at least one sensitive claim is required"))]
    pub sensitive_claims: Vec<String>,

    /// Identity-provider ARNs that Federated principals may reference
    ///
    /// Empty means any well-formed provider ARN is accepted.
    pub declared_providers: Vec<String>,

    /// Accepted values of the document `Version` field
    #[validate(length(min = 1, message = "at least one policy version is required"))]
    pub supported_versions: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        ValidatorConfig {
            strict: false,
            reject_unknown_fields: false,
            sensitive_claims: vec!["sub".to_string()],
            declared_providers: Vec::new(),
            supported_versions: vec!["2012-10-17".to_string(), "2008-10-17".to_string()],
        }
    }
}

impl ValidatorConfig {
    /// Parse and check a TOML configuration
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: ValidatorConfig =
            toml::from_str(s).map_err(|e| PolicyError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Load a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading validator config from {:?}", path);
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Run field-level checks
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| PolicyError::Config(e.to_string()))
    }

    /// Builder-style strict toggle
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Builder-style provider declaration
    pub fn declare_provider(mut self, arn: impl Into<String>) -> Self {
        self.declared_providers.push(arn.into());
        self
    }

    /// Parse options implied by this configuration
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            strict: self.reject_unknown_fields,
        }
    }

    /// True if the condition key names a sensitive claim
    pub fn is_sensitive_key(&self, key: &str) -> bool {
        let claim = key.rsplit_once(':').map_or(key, |(_, claim)| claim);
        self.sensitive_claims
            .iter()
            .any(|c| c == claim || c == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ValidatorConfig::default();
        assert!(!config.strict);
        assert!(config.check().is_ok());
        assert!(config.is_sensitive_key("gitlab.com:sub"));
        assert!(config.is_sensitive_key("sub"));
        assert!(!config.is_sensitive_key("gitlab.com:aud"));
        assert!(!config.is_sensitive_key("gitlab.com:subject"));
    }

    #[test]
    fn test_from_toml() {
        let config = ValidatorConfig::from_toml_str(
            r#"
            strict = true
            sensitive_claims = ["sub", "project_path"]
            declared_providers = ["arn:aws:iam::412381736597:oidc-provider/gitlab.com"]
            "#,
        )
        .unwrap();

        assert!(config.strict);
        assert!(!config.reject_unknown_fields);
        assert!(config.is_sensitive_key("gitlab.com:project_path"));
        assert_eq!(config.declared_providers.len(), 1);
        // Omitted fields keep their defaults
        assert_eq!(config.supported_versions, ValidatorConfig::default().supported_versions);
    }

    #[test]
    fn test_rejects_unknown_keys_and_empty_lists() {
        assert!(matches!(
            ValidatorConfig::from_toml_str("stritc = true"),
            Err(PolicyError::Config(_))
        ));
        assert!(matches!(
            ValidatorConfig::from_toml_str("sensitive_claims = []"),
            Err(PolicyError::Config(_))
        ));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("trustcheck.toml");
        std::fs::write(&path, "reject_unknown_fields = true\n").unwrap();

        let config = ValidatorConfig::load(&path).unwrap();
        assert!(config.parse_options().strict);

        assert!(matches!(
            ValidatorConfig::load(dir.path().join("missing.toml")),
            Err(PolicyError::Io(_))
        ));
    }
}
