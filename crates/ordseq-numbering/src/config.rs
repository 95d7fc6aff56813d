use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NumberingError, NumberingResult};

/// Property under which the sequential number is stored.
pub const DEFAULT_PROPERTY_NAME: &str = "_order_number";

/// Option holding the installed numbering version.
pub const DEFAULT_VERSION_OPTION: &str = "ordseq_db_version";

/// Attempts made at the computed insert before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Version written to the store's version marker.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration for sequential order numbering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberingConfig {
    /// Property name of the sequential number on each order.
    pub property_name: String,
    /// Prefix shown before the number (and accepted on lookup).
    pub display_prefix: String,
    /// Attempts at the atomic computed insert per allocation.
    pub max_attempts: u32,
    /// Option name of the installed-version marker.
    pub version_option: String,
    /// The running version. A marker that differs triggers an upgrade.
    pub version: String,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            property_name: DEFAULT_PROPERTY_NAME.to_string(),
            display_prefix: "#".to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            version_option: DEFAULT_VERSION_OPTION.to_string(),
            version: VERSION.to_string(),
        }
    }
}

impl NumberingConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> NumberingResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| NumberingError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> NumberingResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn to_toml_string(&self) -> NumberingResult<String> {
        toml::to_string(self).map_err(|e| NumberingError::Config(e.to_string()))
    }

    pub fn validate(&self) -> NumberingResult<()> {
        if self.property_name.trim().is_empty() {
            return Err(NumberingError::Config("property_name must not be empty".into()));
        }
        if self.version_option.trim().is_empty() {
            return Err(NumberingError::Config("version_option must not be empty".into()));
        }
        if self.version.trim().is_empty() {
            return Err(NumberingError::Config("version must not be empty".into()));
        }
        if self.max_attempts == 0 {
            return Err(NumberingError::Config("max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}
