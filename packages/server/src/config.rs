//! Server configuration.
//!
//! The defaults ship embedded in the binary. Setting `SEPTIC_MAP_CONFIG`
//! to a TOML file path replaces them; sections or keys the file omits fall
//! back to the built-in values.

use std::path::Path;

use septic_map_guard::GuardConfig;
use septic_map_lookup::EngineConfig;
use serde::Deserialize;

use crate::ServerError;

const DEFAULT_CONFIG_TOML: &str = include_str!("../config/default.toml");

/// Environment variable naming an override config file.
pub const CONFIG_PATH_ENV: &str = "SEPTIC_MAP_CONFIG";

/// Lookup policy plus request guard settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub engine: EngineConfig,
    pub guard: GuardConfig,
}

impl ServerConfig {
    /// Parses and validates a TOML config.
    ///
    /// # Errors
    ///
    /// * If `toml_str` is not valid TOML for this structure
    /// * If the engine or guard settings are inconsistent
    pub fn parse(toml_str: &str) -> Result<Self, ServerError> {
        let config: Self = toml::de::from_str(toml_str)?;
        config.engine.validate()?;
        if config.guard.rate_limit.max_requests == 0 || config.guard.rate_limit.interval_ms == 0 {
            return Err(ServerError::Config {
                message: "guard.rate_limit needs a non-zero interval_ms and max_requests"
                    .to_string(),
            });
        }
        Ok(config)
    }

    /// The built-in configuration.
    ///
    /// # Errors
    ///
    /// * If the embedded TOML is malformed
    pub fn embedded() -> Result<Self, ServerError> {
        Self::parse(DEFAULT_CONFIG_TOML)
    }

    /// Loads the file at `path`.
    ///
    /// # Errors
    ///
    /// * If the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self, ServerError> {
        let toml_str = std::fs::read_to_string(path)?;
        Self::parse(&toml_str)
    }

    /// Loads the override file named by `SEPTIC_MAP_CONFIG`, or the
    /// built-in configuration when it is unset.
    ///
    /// # Errors
    ///
    /// * If the selected configuration cannot be read or parsed
    pub fn load() -> Result<Self, ServerError> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                log::info!("Loading config from {path}");
                Self::from_file(Path::new(path.trim()))
            }
            _ => Self::embedded(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_config_matches_defaults() {
        assert_eq!(ServerConfig::embedded().unwrap(), ServerConfig::default());
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = ServerConfig::parse(
            r"
            [engine]
            search_radius_meters = 150.0

            [guard.rate_limit]
            max_requests = 30
            ",
        )
        .unwrap();

        assert!((config.engine.search_radius_meters - 150.0).abs() < f64::EPSILON);
        assert_eq!(config.engine.max_nearby_records, 20);
        assert_eq!(config.guard.rate_limit.max_requests, 30);
        assert_eq!(config.guard.rate_limit.interval_ms, 60_000);
        assert_eq!(config.guard.abuse.burst_threshold, 50);
    }

    #[test]
    fn rejects_invalid_engine_policy() {
        let err = ServerConfig::parse("[engine]\nsewer_confidence = 1.5\n").unwrap_err();
        assert!(matches!(err, ServerError::InvalidEngineConfig(_)));
    }

    #[test]
    fn rejects_zero_rate_limit() {
        let err = ServerConfig::parse("[guard.rate_limit]\nmax_requests = 0\n").unwrap_err();
        assert!(matches!(err, ServerError::Config { .. }));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = ServerConfig::parse("[engine\n").unwrap_err();
        assert!(matches!(err, ServerError::Toml(_)));
    }
}
