//! Advertising lifecycle
//!
//! Publishes one service whose readable characteristic holds the local
//! identity and advertises the service identifier while the radio is on.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::delegate::PeripheralDelegate;
use crate::effect::{Effect, PeripheralCommand};
use crate::event::RadioResult;
use crate::types::{Advertisement, GattService, Identity, RadioHandle, RadioPowerState, ServiceId};

// ----------------------------------------------------------------------------
// Peripheral State
// ----------------------------------------------------------------------------

/// Observable state of the advertising role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeripheralState {
    #[default]
    Idle,
    WaitingForPower,
    Advertising,
}

/// The advertising role
#[derive(Debug)]
pub struct PeripheralRole {
    service_id: ServiceId,
    state: PeripheralState,
    radio: RadioHandle,
    power: RadioPowerState,
    enabled: bool,
    identity: Option<Identity>,
    /// Identity currently registered with the radio, if any
    published: Option<Identity>,
}

impl PeripheralRole {
    pub fn new(service_id: ServiceId) -> Self {
        Self {
            service_id,
            state: PeripheralState::Idle,
            radio: RadioHandle::Absent,
            power: RadioPowerState::Unknown,
            enabled: false,
            identity: None,
            published: None,
        }
    }

    pub fn state(&self) -> PeripheralState {
        self.state
    }

    pub fn radio(&self) -> RadioHandle {
        self.radio
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Start advertising `identity`, creating the radio handle on first use
    pub fn enable(&mut self, identity: Identity, out: &mut Vec<Effect>) {
        info!("Enabling advertising as '{}'", identity);
        self.identity = Some(identity);
        self.enabled = true;

        match self.radio {
            RadioHandle::Absent => {
                self.radio = RadioHandle::Initializing;
                self.state = PeripheralState::WaitingForPower;
                out.push(PeripheralCommand::CreateRadio.into());
            }
            RadioHandle::Initializing => {
                self.state = PeripheralState::WaitingForPower;
            }
            RadioHandle::Ready if self.power.is_powered_on() => self.start_advertising(out),
            RadioHandle::Ready => {
                self.state = PeripheralState::WaitingForPower;
            }
        }
    }

    /// Stop advertising and release the radio handle. Safe in any state.
    pub fn disable(&mut self, out: &mut Vec<Effect>) {
        self.enabled = false;
        if self.radio.is_absent() {
            self.state = PeripheralState::Idle;
            return;
        }

        if self.state == PeripheralState::Advertising {
            out.push(PeripheralCommand::StopAdvertising.into());
        }
        out.push(PeripheralCommand::ReleaseRadio.into());

        self.radio = RadioHandle::Absent;
        self.power = RadioPowerState::Unknown;
        self.published = None;
        self.state = PeripheralState::Idle;
        info!("Advertising disabled");
    }

    fn start_advertising(&mut self, out: &mut Vec<Effect>) {
        let Some(identity) = self.identity.clone() else {
            warn!("Advertising enabled without an identity; staying idle");
            self.state = PeripheralState::WaitingForPower;
            return;
        };
        if self.state == PeripheralState::Advertising && self.published.as_ref() == Some(&identity) {
            debug!("Already advertising '{}'", identity);
            return;
        }

        match &self.published {
            Some(published) if *published == identity => {
                debug!("Service already published for this radio handle");
            }
            Some(_) => {
                out.push(PeripheralCommand::RemoveAllServices.into());
                self.publish(identity, out);
            }
            None => self.publish(identity, out),
        }

        out.push(
            PeripheralCommand::StartAdvertising(Advertisement {
                service_ids: vec![self.service_id],
            })
            .into(),
        );
        self.state = PeripheralState::Advertising;
    }

    fn publish(&mut self, identity: Identity, out: &mut Vec<Effect>) {
        let service = GattService::identity_service(self.service_id, &identity);
        out.push(PeripheralCommand::PublishService(service).into());
        self.published = Some(identity);
    }
}

impl PeripheralDelegate for PeripheralRole {
    fn on_power_state_changed(&mut self, state: RadioPowerState, out: &mut Vec<Effect>) {
        if self.radio.is_absent() {
            debug!("Ignoring power state {:?} from a released advertising radio", state);
            return;
        }
        self.radio = RadioHandle::Ready;
        self.power = state;

        if state.is_powered_on() {
            if self.enabled {
                self.start_advertising(out);
            }
        } else {
            info!("Advertising radio unavailable ({:?})", state);
            if self.enabled {
                self.state = PeripheralState::WaitingForPower;
            }
        }
    }

    fn on_service_added(&mut self, result: RadioResult<()>, _out: &mut Vec<Effect>) {
        if let Err(e) = result {
            warn!("Failed to publish discovery service: {}", e);
            // republish on the next power-on
            self.published = None;
        }
    }

    fn on_advertising_started(&mut self, result: RadioResult<()>, _out: &mut Vec<Effect>) {
        match result {
            Ok(()) => info!("Advertising service {}", self.service_id),
            Err(e) => {
                warn!("Failed to start advertising: {}", e);
                if self.state == PeripheralState::Advertising {
                    self.state = PeripheralState::WaitingForPower;
                }
            }
        }
    }
}
