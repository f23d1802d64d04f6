//! Configuration file handling
//!
//! The file is TOML. Every section is optional and falls back to defaults:
//!
//! ```toml
//! identity = "alice"
//!
//! [discovery]
//! service_id = "FEED"
//! allow_duplicates = true
//! reference_power = -59
//!
//! [discovery.tick_interval]
//! secs = 1
//! nanos = 0
//!
//! [simulation]
//! pulse_interval_ms = 200
//! ```

use std::path::Path;
use std::time::Duration;

use nearcast_core::{DiscoveryConfig, Identity, ServiceId};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Identity advertised when none is given on the command line
    pub identity: Option<String>,
    pub discovery: DiscoveryConfig,
    pub simulation: SimulationConfig,
}

/// Settings for the in-memory radio demo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// How often advertisements are re-delivered to scanners
    pub pulse_interval_ms: u64,
    /// Run length when `--duration` is not given
    pub default_duration_secs: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            pulse_interval_ms: 200,
            default_duration_secs: 5,
        }
    }
}

impl SimulationConfig {
    pub fn pulse_interval(&self) -> Duration {
        Duration::from_millis(self.pulse_interval_ms.max(1))
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line flags on top of the file values
    pub fn apply_overrides(&mut self, cli: &Cli) -> Result<()> {
        if let Some(service_id) = &cli.service_id {
            self.discovery.service_id = ServiceId::parse(service_id)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        self.discovery.validate()?;
        if let Some(identity) = &self.identity {
            Identity::new(identity.as_str())?;
        }
        if self.simulation.default_duration_secs == 0 {
            return Err(CliError::Config(
                "simulation.default_duration_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Identity from the command line, or the configured one
    pub fn resolve_identity(&self, given: Option<&str>) -> Result<String> {
        given
            .map(str::to_string)
            .or_else(|| self.identity.clone())
            .ok_or_else(|| CliError::Config("no identity given".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_parse_full_file() {
        let config = AppConfig::from_toml(
            r#"
            identity = "alice"

            [discovery]
            service_id = "FEED"
            allow_duplicates = false
            reference_power = -65

            [discovery.tick_interval]
            secs = 2
            nanos = 0

            [simulation]
            pulse_interval_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.identity.as_deref(), Some("alice"));
        assert_eq!(config.discovery.service_id, ServiceId::from_short(0xFEED));
        assert!(!config.discovery.allow_duplicates);
        assert_eq!(config.discovery.reference_power, -65);
        assert_eq!(config.discovery.tick_interval, Duration::from_secs(2));
        assert_eq!(config.simulation.pulse_interval(), Duration::from_millis(50));
        assert_eq!(config.simulation.default_duration_secs, 5);
    }

    #[test]
    fn test_invalid_service_id_rejected() {
        let err = AppConfig::from_toml("[discovery]\nservice_id = \"not-a-uuid\"").unwrap_err();
        assert!(matches!(err, CliError::TomlParsing(_)));
    }

    #[test]
    fn test_empty_identity_rejected() {
        let err = AppConfig::from_toml("identity = \"\"").unwrap_err();
        assert!(matches!(err, CliError::Discovery(_)));
    }

    #[test]
    fn test_cli_service_id_overrides_file() {
        let mut config = AppConfig::default();
        let cli = Cli::parse_from(["nearcast", "discover", "--service-id", "180D"]);
        config.apply_overrides(&cli).unwrap();
        assert_eq!(config.discovery.service_id, ServiceId::from_short(0x180D));

        let cli = Cli::parse_from(["nearcast", "discover", "--service-id", "xyz"]);
        assert!(config.apply_overrides(&cli).is_err());
    }

    #[test]
    fn test_resolve_identity_prefers_command_line() {
        let config = AppConfig {
            identity: Some("configured".to_string()),
            ..AppConfig::default()
        };
        assert_eq!(config.resolve_identity(Some("given")).unwrap(), "given");
        assert_eq!(config.resolve_identity(None).unwrap(), "configured");
        assert!(AppConfig::default().resolve_identity(None).is_err());
    }
}
