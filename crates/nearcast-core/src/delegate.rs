//! Event handler interfaces for the two radio roles
//!
//! Each radio handle delivers its events to exactly one delegate. The
//! controller owns one implementation of each and routes
//! [`RadioEvent`](crate::event::RadioEvent)s to them.

use crate::effect::Effect;
use crate::error::RadioError;
use crate::event::RadioResult;
use crate::types::{PeerHandle, RadioPowerState, ServiceId};

/// Callbacks of the advertising radio
pub trait PeripheralDelegate {
    fn on_power_state_changed(&mut self, state: RadioPowerState, out: &mut Vec<Effect>);

    fn on_service_added(&mut self, result: RadioResult<()>, out: &mut Vec<Effect>);

    fn on_advertising_started(&mut self, result: RadioResult<()>, out: &mut Vec<Effect>);
}

/// Callbacks of the scanning radio
pub trait CentralDelegate {
    fn on_power_state_changed(&mut self, state: RadioPowerState, out: &mut Vec<Effect>);

    fn on_peer_discovered(&mut self, peer: PeerHandle, rssi: i16, out: &mut Vec<Effect>);

    fn on_connected(&mut self, peer: PeerHandle, out: &mut Vec<Effect>);

    fn on_connect_failed(&mut self, peer: PeerHandle, error: RadioError, out: &mut Vec<Effect>);

    fn on_services_discovered(
        &mut self,
        peer: PeerHandle,
        services: RadioResult<Vec<ServiceId>>,
        out: &mut Vec<Effect>,
    );

    fn on_characteristics_discovered(
        &mut self,
        peer: PeerHandle,
        service: ServiceId,
        characteristics: RadioResult<Vec<ServiceId>>,
        out: &mut Vec<Effect>,
    );

    fn on_value_updated(
        &mut self,
        peer: PeerHandle,
        characteristic: ServiceId,
        value: RadioResult<Vec<u8>>,
        out: &mut Vec<Effect>,
    );

    fn on_rssi_read(&mut self, peer: PeerHandle, rssi: RadioResult<i16>, out: &mut Vec<Effect>);

    fn on_notify_state_updated(
        &mut self,
        peer: PeerHandle,
        characteristic: ServiceId,
        result: RadioResult<()>,
        out: &mut Vec<Effect>,
    );

    fn on_disconnected(
        &mut self,
        peer: PeerHandle,
        error: Option<RadioError>,
        out: &mut Vec<Effect>,
    );
}
