//! Applet configuration
//!
//! Read from a JSON file named by `MINIHSM_CONFIG`. Missing fields take
//! their defaults; a missing or broken file falls back to defaults.

use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "MINIHSM_CONFIG";

/// Largest retry count that fits the low nibble of a 63Cx status word
pub const MAX_TRIES_LIMIT: u8 = 15;

/// Errors while loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{field} must be between 1 and 15, got {value}")]
    InvalidTries { field: &'static str, value: u8 },
}

/// Policy knobs of the minihsm applet
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppletConfig {
    /// Refuse to create the PIN in the creation state unless a PUK was set first
    pub puk_required: bool,
    /// PIN retry counter maximum
    pub pin_max_tries: u8,
    /// PUK retry counter maximum
    pub puk_max_tries: u8,
}

impl Default for AppletConfig {
    fn default() -> Self {
        Self {
            puk_required: false,
            pin_max_tries: 3,
            puk_max_tries: 10,
        }
    }
}

impl AppletConfig {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Load from the file named by `MINIHSM_CONFIG`, or use defaults
    pub fn from_env() -> Self {
        let Ok(path) = std::env::var(CONFIG_ENV) else {
            return Self::default();
        };

        match Self::load(&path) {
            Ok(config) => {
                info!("Loaded applet config from {}", path);
                config
            }
            Err(e) => {
                warn!("Ignoring applet config {}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Check both retry maximums fit 1..=15
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("pin_max_tries", self.pin_max_tries),
            ("puk_max_tries", self.puk_max_tries),
        ] {
            if value == 0 || value > MAX_TRIES_LIMIT {
                return Err(ConfigError::InvalidTries { field, value });
            }
        }
        Ok(())
    }

    /// Copy with both retry maximums forced into 1..=15
    pub fn clamped(&self) -> Self {
        Self {
            puk_required: self.puk_required,
            pin_max_tries: self.pin_max_tries.clamp(1, MAX_TRIES_LIMIT),
            puk_max_tries: self.puk_max_tries.clamp(1, MAX_TRIES_LIMIT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppletConfig::default();
        assert!(!config.puk_required);
        assert_eq!(config.pin_max_tries, 3);
        assert_eq!(config.puk_max_tries, 10);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AppletConfig::from_json(r#"{ "puk_required": true }"#).unwrap();
        assert!(config.puk_required);
        assert_eq!(config.pin_max_tries, 3);
        assert_eq!(config.puk_max_tries, 10);
    }

    #[test]
    fn test_tries_must_fit_status_nibble() {
        let err = AppletConfig::from_json(r#"{ "puk_max_tries": 16 }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidTries { field: "puk_max_tries", value: 16 }
        ));

        let err = AppletConfig::from_json(r#"{ "pin_max_tries": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTries { field: "pin_max_tries", .. }));

        assert!(AppletConfig::from_json(r#"{ "pin_max_tries": 15 }"#).is_ok());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            AppletConfig::from_json("{ puk_required: yes"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            AppletConfig::load("/nonexistent/minihsm/config.json"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_clamped() {
        let config = AppletConfig {
            puk_required: true,
            pin_max_tries: 0,
            puk_max_tries: 200,
        };
        assert!(config.validate().is_err());
        let clamped = config.clamped();
        assert!(clamped.validate().is_ok());
        assert_eq!(clamped.pin_max_tries, 1);
        assert_eq!(clamped.puk_max_tries, 15);
        assert!(clamped.puk_required);
    }

    #[test]
    fn test_from_env_falls_back_to_defaults() {
        std::env::remove_var(CONFIG_ENV);
        assert_eq!(AppletConfig::from_env(), AppletConfig::default());

        std::env::set_var(CONFIG_ENV, "/nonexistent/minihsm/config.json");
        assert_eq!(AppletConfig::from_env(), AppletConfig::default());

        let path = std::env::temp_dir().join(format!("minihsm-env-{}.json", std::process::id()));
        fs::write(&path, r#"{ "pin_max_tries": 99 }"#).unwrap();
        std::env::set_var(CONFIG_ENV, &path);
        let invalid = AppletConfig::from_env();

        fs::write(&path, r#"{ "pin_max_tries": 6 }"#).unwrap();
        let loaded = AppletConfig::from_env();

        std::env::remove_var(CONFIG_ENV);
        let _ = fs::remove_file(&path);
        assert_eq!(invalid, AppletConfig::default());
        assert_eq!(loaded.pin_max_tries, 6);
    }

    #[test]
    fn test_load_file() {
        let path = std::env::temp_dir().join(format!("minihsm-config-{}.json", std::process::id()));
        fs::write(&path, r#"{ "pin_max_tries": 5, "puk_max_tries": 12 }"#).unwrap();
        let config = AppletConfig::load(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(config.pin_max_tries, 5);
        assert_eq!(config.puk_max_tries, 12);
        assert!(!config.puk_required);
    }
}
