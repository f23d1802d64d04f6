//! Runtime error types

use nearcast_core::DiscoveryError;
use thiserror::Error;

/// Errors surfaced by the discovery runtime
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Discovery service has stopped")]
    ServiceStopped,

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("Radio driver error: {0}")]
    Driver(String),
}

impl RuntimeError {
    pub fn driver(message: impl Into<String>) -> Self {
        RuntimeError::Driver(message.into())
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
