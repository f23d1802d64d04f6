//! Nearcast Core
//!
//! Sans-IO state machines for proximity discovery over a short-range radio.
//! A device advertises its identity as a readable attribute and scans for
//! other devices advertising the same service, connecting to one peer at a
//! time to read its identity.
//!
//! Nothing in this crate performs I/O. Operations and radio events are fed
//! into a [`DiscoveryController`], which queues [`Effect`]s for a driver to
//! execute.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod central;
pub mod config;
pub mod controller;
pub mod delegate;
pub mod effect;
pub mod error;
pub mod event;
pub mod peripheral;
pub mod proximity;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use central::{CentralRole, CentralState, ConnectedPhase, LinkState, ResultCallback};
pub use config::{DiscoveryConfig, DEFAULT_REFERENCE_POWER, DEFAULT_SERVICE_ID};
pub use controller::{DiscoveryController, DiscoverySnapshot};
pub use delegate::{CentralDelegate, PeripheralDelegate};
pub use effect::{CentralCommand, Effect, PeripheralCommand, RadioNotification};
pub use error::{DiscoveryError, RadioError, Result};
pub use event::{CentralEvent, PeripheralEvent, RadioEvent, RadioResult};
pub use peripheral::{PeripheralRole, PeripheralState};
pub use types::{
    Advertisement, EnableFlags, GattCharacteristic, GattDescriptor, GattService, Identity,
    LifecycleMode, PeerHandle, RadioHandle, RadioPowerState, ServiceId, MAX_IDENTITY_LEN,
};
