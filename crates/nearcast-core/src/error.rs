//! Error types for nearcast discovery

use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors raised by the discovery core at its public boundary.
///
/// Radio failures never surface here: they are delivered as [`RadioError`]
/// payloads inside radio events and are absorbed by the role state machines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("Invalid service identifier: '{value}'")]
    InvalidServiceId { value: String },

    #[error("Identity cannot be empty")]
    EmptyIdentity,

    #[error("Identity exceeds maximum length of {max} bytes (got {len})")]
    IdentityTooLong { len: usize, max: usize },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

/// Failures reported by the radio stack through radio events
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RadioError {
    #[error("Radio unavailable")]
    Unavailable,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Radio operation timed out")]
    Timeout,

    #[error("Radio stack error: {0}")]
    Stack(String),
}

impl RadioError {
    /// Wrap an arbitrary stack error message
    pub fn stack(message: impl Into<String>) -> Self {
        RadioError::Stack(message.into())
    }
}

/// Result type for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = DiscoveryError::InvalidServiceId {
            value: "xyz".to_string(),
        };
        assert!(err.to_string().contains("xyz"));

        let err = DiscoveryError::IdentityTooLong { len: 600, max: 512 };
        assert_eq!(
            err.to_string(),
            "Identity exceeds maximum length of 512 bytes (got 600)"
        );

        assert_eq!(
            RadioError::stack("adapter gone").to_string(),
            "Radio stack error: adapter gone"
        );
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DiscoveryError>();
        assert_send_sync::<RadioError>();
    }
}
