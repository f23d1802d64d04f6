//! Commands the roles emit for the radio stack to execute
//!
//! Every command is fire-and-forget: its outcome comes back later as a
//! [`RadioEvent`](crate::event::RadioEvent).

use crate::types::{Advertisement, GattService, PeerHandle, ServiceId};

// ----------------------------------------------------------------------------
// Role Commands
// ----------------------------------------------------------------------------

/// Commands for the advertising radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralCommand {
    /// Create the advertising radio handle; it answers with its power state
    CreateRadio,
    /// Register a service with the local GATT database
    PublishService(GattService),
    /// Remove every service registered through this handle
    RemoveAllServices,
    StartAdvertising(Advertisement),
    StopAdvertising,
    /// Drop the handle and its event binding
    ReleaseRadio,
}

/// Commands for the scanning radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralCommand {
    /// Create the scanning radio handle; it answers with its power state
    CreateRadio { restore_identifier: Option<String> },
    StartScan {
        services: Vec<ServiceId>,
        allow_duplicates: bool,
    },
    StopScan,
    Connect(PeerHandle),
    DiscoverServices {
        peer: PeerHandle,
        services: Vec<ServiceId>,
    },
    DiscoverCharacteristics {
        peer: PeerHandle,
        service: ServiceId,
        characteristics: Vec<ServiceId>,
    },
    ReadValue {
        peer: PeerHandle,
        characteristic: ServiceId,
    },
    ReadRssi(PeerHandle),
    SetNotify {
        peer: PeerHandle,
        characteristic: ServiceId,
        enabled: bool,
    },
    CancelConnection(PeerHandle),
    /// Drop the handle and its event binding
    ReleaseRadio,
}

/// Process-wide radio availability notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadioNotification {
    /// The scanning radio powered on
    RadioAvailable,
    /// The scanning radio reported any state other than powered on
    RadioUnavailable,
}

// ----------------------------------------------------------------------------
// Effects
// ----------------------------------------------------------------------------

/// Everything a state transition can ask the outside world to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Peripheral(PeripheralCommand),
    Central(CentralCommand),
    Notify(RadioNotification),
}

impl Effect {
    pub fn as_central(&self) -> Option<&CentralCommand> {
        match self {
            Effect::Central(command) => Some(command),
            _ => None,
        }
    }

    pub fn as_peripheral(&self) -> Option<&PeripheralCommand> {
        match self {
            Effect::Peripheral(command) => Some(command),
            _ => None,
        }
    }
}

impl From<PeripheralCommand> for Effect {
    fn from(command: PeripheralCommand) -> Self {
        Effect::Peripheral(command)
    }
}

impl From<CentralCommand> for Effect {
    fn from(command: CentralCommand) -> Self {
        Effect::Central(command)
    }
}

impl From<RadioNotification> for Effect {
    fn from(notification: RadioNotification) -> Self {
        Effect::Notify(notification)
    }
}
