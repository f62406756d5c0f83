use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Engine settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name given to the hidden state attribute of every tuple class.
    pub state_attribute_name: String,
    /// Accept a scalar assigned to a multi-valued attribute as a
    /// one-element list.
    pub lenient_collections: bool,
    /// Recount every reference after each write and fail the write if a
    /// stored counter disagrees. Slow; meant for tests and debugging.
    pub audit_references: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_attribute_name: "_state".into(),
            lenient_collections: false,
            audit_references: false,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(input: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(input).map_err(|e| EngineError::Config(e.to_string()))?;
        if config.state_attribute_name.is_empty() {
            return Err(EngineError::Config(
                "state_attribute_name must not be empty".into(),
            ));
        }
        Ok(config)
    }

    /// A configuration with reference auditing switched on.
    pub fn audited() -> Self {
        Self {
            audit_references: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.state_attribute_name, "_state");
        assert!(!config.lenient_collections);
        assert!(!config.audit_references);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = EngineConfig::from_toml_str("lenient_collections = true\n").unwrap();
        assert!(config.lenient_collections);
        assert_eq!(config.state_attribute_name, "_state");
    }

    #[test]
    fn full_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            state_attribute_name = "__exists"
            lenient_collections = false
            audit_references = true
            "#,
        )
        .unwrap();
        assert_eq!(config.state_attribute_name, "__exists");
        assert!(config.audit_references);
    }

    #[test]
    fn bad_toml_is_config_error() {
        assert!(matches!(
            EngineConfig::from_toml_str("audit_references = \"yes\""),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("state_attribute_name = \"\""),
            Err(EngineError::Config(_))
        ));
    }
}
