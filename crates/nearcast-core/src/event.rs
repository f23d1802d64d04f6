//! Radio events consumed by the roles

use crate::error::RadioError;
use crate::types::{PeerHandle, RadioPowerState, ServiceId};

/// Outcome type carried by radio events
pub type RadioResult<T> = std::result::Result<T, RadioError>;

/// Events delivered by the advertising radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralEvent {
    PowerStateChanged(RadioPowerState),
    ServiceAdded(RadioResult<()>),
    AdvertisingStarted(RadioResult<()>),
}

/// Events delivered by the scanning radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralEvent {
    PowerStateChanged(RadioPowerState),
    PeerDiscovered {
        peer: PeerHandle,
        rssi: i16,
    },
    Connected(PeerHandle),
    ConnectFailed {
        peer: PeerHandle,
        error: RadioError,
    },
    ServicesDiscovered {
        peer: PeerHandle,
        services: RadioResult<Vec<ServiceId>>,
    },
    CharacteristicsDiscovered {
        peer: PeerHandle,
        service: ServiceId,
        characteristics: RadioResult<Vec<ServiceId>>,
    },
    ValueUpdated {
        peer: PeerHandle,
        characteristic: ServiceId,
        value: RadioResult<Vec<u8>>,
    },
    RssiRead {
        peer: PeerHandle,
        rssi: RadioResult<i16>,
    },
    NotifyStateUpdated {
        peer: PeerHandle,
        characteristic: ServiceId,
        result: RadioResult<()>,
    },
    /// Connection teardown completed, requested or not
    Disconnected {
        peer: PeerHandle,
        error: Option<RadioError>,
    },
}

/// Any event from either radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    Peripheral(PeripheralEvent),
    Central(CentralEvent),
}

impl From<PeripheralEvent> for RadioEvent {
    fn from(event: PeripheralEvent) -> Self {
        RadioEvent::Peripheral(event)
    }
}

impl From<CentralEvent> for RadioEvent {
    fn from(event: CentralEvent) -> Self {
        RadioEvent::Central(event)
    }
}
