//! Nearcast Runtime
//!
//! Runs a [`DiscoveryController`](nearcast_core::DiscoveryController) on a
//! single tokio task:
//! - `DiscoveryService`: the task owning the controller and its driver
//! - `DiscoveryHandle`: non-blocking, cloneable access for callers
//! - `RadioDriver`: the seam concrete radio stacks implement
//! - `sim`: an in-memory radio medium for tests and demos

pub mod driver;
pub mod error;
pub mod handle;
pub mod service;

#[cfg(feature = "sim")]
pub mod sim;

pub use driver::{RadioDriver, RadioEventSender};
pub use error::{Result, RuntimeError};
pub use handle::DiscoveryHandle;
pub use service::DiscoveryService;

#[cfg(feature = "sim")]
pub use sim::{SimulatedAir, SimulatedRadio};

// Re-export core types for convenience
pub use nearcast_core::{
    DiscoveryConfig, DiscoverySnapshot, Identity, RadioNotification, ServiceId,
};
