//! Discovery configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DiscoveryError, Result};
use crate::types::ServiceId;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Default service identifier used when none is configured
pub const DEFAULT_SERVICE_ID: ServiceId =
    ServiceId::from_uuid(uuid::Uuid::from_u128(0x7A1C0001_4E45_4152_8000_00805F9B34FB));

/// Default calibrated power at one metre, in dBm
pub const DEFAULT_REFERENCE_POWER: i32 = -59;

/// Configuration fixed for the lifetime of a discovery controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Identifier shared by advertiser and scanner
    pub service_id: ServiceId,
    /// Keep reporting a peer on every advertisement, not only the first sighting
    pub allow_duplicates: bool,
    /// Upper bound on one connect/read cycle; `None` disables the bound
    pub cycle_timeout: Option<Duration>,
    /// Restoration identifier handed to the scanning radio on creation
    pub restore_identifier: Option<String>,
    /// Calibrated one-metre power used for proximity estimates
    pub reference_power: i32,
    /// How often timeouts are evaluated
    pub tick_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_id: DEFAULT_SERVICE_ID,
            allow_duplicates: true,
            cycle_timeout: Some(Duration::from_secs(10)),
            restore_identifier: Some("nearcast.central".to_string()),
            reference_power: DEFAULT_REFERENCE_POWER,
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl DiscoveryConfig {
    /// Create a configuration for the given service
    pub fn new(service_id: ServiceId) -> Self {
        Self {
            service_id,
            ..Self::default()
        }
    }

    /// Set whether duplicate advertisement reports are requested
    pub fn with_allow_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }

    /// Set the per-cycle timeout
    pub fn with_cycle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.cycle_timeout = timeout;
        self
    }

    /// Set the scanning radio restoration identifier
    pub fn with_restore_identifier(mut self, identifier: Option<String>) -> Self {
        self.restore_identifier = identifier;
        self
    }

    /// Set the reference power used for proximity estimates
    pub fn with_reference_power(mut self, power: i32) -> Self {
        self.reference_power = power;
        self
    }

    /// Set the timeout evaluation interval
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Reject values the state machines cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.reference_power == 0 {
            return Err(DiscoveryError::InvalidConfig {
                reason: "reference_power must be non-zero".to_string(),
            });
        }
        if self.tick_interval.is_zero() {
            return Err(DiscoveryError::InvalidConfig {
                reason: "tick_interval must be non-zero".to_string(),
            });
        }
        if self.cycle_timeout.is_some_and(|t| t.is_zero()) {
            return Err(DiscoveryError::InvalidConfig {
                reason: "cycle_timeout must be non-zero when set".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DiscoveryConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.allow_duplicates);
        assert_eq!(config.cycle_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_builder_methods() {
        let config = DiscoveryConfig::new(ServiceId::from_short(0x180D))
            .with_allow_duplicates(false)
            .with_cycle_timeout(None)
            .with_reference_power(-65)
            .with_restore_identifier(None);

        assert_eq!(config.service_id, ServiceId::from_short(0x180D));
        assert!(!config.allow_duplicates);
        assert!(config.cycle_timeout.is_none());
        assert_eq!(config.reference_power, -65);
        assert!(config.restore_identifier.is_none());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero_power = DiscoveryConfig::default().with_reference_power(0);
        assert!(zero_power.validate().is_err());

        let zero_tick = DiscoveryConfig::default().with_tick_interval(Duration::ZERO);
        assert!(zero_tick.validate().is_err());

        let zero_timeout = DiscoveryConfig::default().with_cycle_timeout(Some(Duration::ZERO));
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: DiscoveryConfig =
            serde_json::from_str(r#"{ "service_id": "180D", "allow_duplicates": false }"#)
                .unwrap();
        assert_eq!(config.service_id, ServiceId::from_short(0x180D));
        assert!(!config.allow_duplicates);
        assert_eq!(config.reference_power, DEFAULT_REFERENCE_POWER);
    }
}
