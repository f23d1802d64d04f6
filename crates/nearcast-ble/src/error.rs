//! Error types for the BLE driver

use nearcast_core::RadioError;
use nearcast_runtime::RuntimeError;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors raised by the BLE radio driver
#[derive(Error, Debug)]
pub enum BleError {
    #[cfg(feature = "platform")]
    #[error("btleplug error: {0}")]
    Btleplug(#[from] btleplug::Error),

    #[cfg(all(feature = "platform", target_os = "linux"))]
    #[error("BlueZ error: {0}")]
    Bluer(#[from] bluer::Error),

    #[error("BLE adapter not available")]
    AdapterNotAvailable,

    #[error("Radio not created")]
    RadioNotCreated,

    #[error("Peer not found: {peer}")]
    PeerNotFound { peer: String },

    #[error("Characteristic not found: {characteristic}")]
    CharacteristicNotFound { characteristic: String },

    #[error("Not supported on this platform: {0}")]
    Unsupported(&'static str),
}

impl BleError {
    /// Map to the error carried inside radio events
    pub fn to_radio_error(&self) -> RadioError {
        match self {
            #[cfg(feature = "platform")]
            BleError::Btleplug(btleplug::Error::NotConnected) => {
                RadioError::ConnectionFailed("not connected".to_string())
            }
            #[cfg(feature = "platform")]
            BleError::Btleplug(btleplug::Error::TimedOut(_)) => RadioError::Timeout,
            BleError::AdapterNotAvailable | BleError::RadioNotCreated => RadioError::Unavailable,
            BleError::PeerNotFound { .. } => RadioError::ConnectionFailed(self.to_string()),
            other => RadioError::stack(other.to_string()),
        }
    }
}

impl From<BleError> for RuntimeError {
    fn from(error: BleError) -> Self {
        RuntimeError::driver(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_adapter_maps_to_unavailable() {
        assert_eq!(
            BleError::AdapterNotAvailable.to_radio_error(),
            RadioError::Unavailable
        );
    }

    #[test]
    fn test_unknown_peer_maps_to_connection_failure() {
        let error = BleError::PeerNotFound {
            peer: "AA:BB".to_string(),
        };
        assert!(matches!(
            error.to_radio_error(),
            RadioError::ConnectionFailed(message) if message.contains("AA:BB")
        ));
    }

    #[test]
    fn test_converts_into_runtime_driver_error() {
        let error: RuntimeError = BleError::Unsupported("advertising").into();
        assert!(matches!(error, RuntimeError::Driver(message) if message.contains("advertising")));
    }
}
