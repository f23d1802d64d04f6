//! Nearcast BLE Driver
//!
//! Connects the discovery roles to the host Bluetooth stack:
//! - scanning, connecting and reading through `btleplug`
//! - GATT publishing and advertising through BlueZ (`bluer`) on Linux
//!
//! The stacks are only compiled with the `platform` feature, since both
//! need a system Bluetooth service. Identifier conversions, error mapping
//! and the advertiser table are always available.

pub mod convert;
pub mod error;
pub mod tracker;

#[cfg(feature = "platform")]
pub mod central;
#[cfg(feature = "platform")]
pub mod driver;
#[cfg(all(feature = "platform", target_os = "linux"))]
pub mod peripheral;

pub use error::{BleError, Result};
pub use tracker::PeerTracker;

#[cfg(feature = "platform")]
pub use central::BtleplugCentral;
#[cfg(feature = "platform")]
pub use driver::PlatformRadio;
#[cfg(all(feature = "platform", target_os = "linux"))]
pub use peripheral::BluerPeripheral;
