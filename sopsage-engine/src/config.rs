//! Engine configuration.

use crate::error::{SopsError, SopsResult};
use serde::{Deserialize, Serialize};

/// Configuration for the document engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Reserved top-level key (or INI section) that carries the metadata envelope.
    pub metadata_key: String,

    /// Suffix applied as `unencrypted_suffix` when a request sets no rule.
    pub default_unencrypted_suffix: String,

    /// Indentation width of emitted JSON.
    pub json_indent: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            metadata_key: "sops".to_string(),
            default_unencrypted_suffix: "_unencrypted".to_string(),
            json_indent: 4,
        }
    }
}

impl EngineConfig {
    /// Loads a config from TOML. Missing fields take their defaults.
    pub fn from_toml_str(text: &str) -> SopsResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| SopsError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks field values that serde cannot.
    pub fn validate(&self) -> SopsResult<()> {
        if self.metadata_key.trim().is_empty() {
            return Err(SopsError::InvalidConfig("metadata_key must not be empty".into()));
        }
        if self.default_unencrypted_suffix.is_empty() {
            return Err(SopsError::InvalidConfig(
                "default_unencrypted_suffix must not be empty".into(),
            ));
        }
        if self.json_indent > 16 {
            return Err(SopsError::InvalidConfig(format!(
                "json_indent {} is larger than 16",
                self.json_indent
            )));
        }
        Ok(())
    }
}
