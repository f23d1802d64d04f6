//! Discovery controller composing the two roles
//!
//! The controller is the single owner of both role state machines. Callers
//! drive it with operations and radio events, then drain the resulting
//! effects and hand them to a radio driver.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::central::{CentralRole, CentralState};
use crate::config::DiscoveryConfig;
use crate::delegate::{CentralDelegate, PeripheralDelegate};
use crate::effect::Effect;
use crate::error::Result;
use crate::event::{CentralEvent, PeripheralEvent, RadioEvent};
use crate::peripheral::{PeripheralRole, PeripheralState};
use crate::proximity;
use crate::types::{EnableFlags, Identity, LifecycleMode, PeerHandle};

/// Point-in-time view of a controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySnapshot {
    pub peripheral: PeripheralState,
    pub central: CentralState,
    pub enabled: EnableFlags,
    pub lifecycle: LifecycleMode,
    pub active_peer: Option<PeerHandle>,
    pub current_rssi: Option<f64>,
    /// Proximity estimate against the configured reference power
    pub proximity: f64,
    pub last_discovered: Option<String>,
}

/// Owns the advertising and scanning roles and their pending effects
#[derive(Debug)]
pub struct DiscoveryController {
    config: DiscoveryConfig,
    peripheral: PeripheralRole,
    central: CentralRole,
    lifecycle: LifecycleMode,
    effects: Vec<Effect>,
}

impl DiscoveryController {
    pub fn new(config: DiscoveryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            peripheral: PeripheralRole::new(config.service_id),
            central: CentralRole::new(&config),
            lifecycle: LifecycleMode::Foreground,
            effects: Vec::new(),
            config,
        })
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    pub fn start_advertising(&mut self, identity: Identity) {
        self.peripheral.enable(identity, &mut self.effects);
    }

    pub fn stop_advertising(&mut self) {
        self.peripheral.disable(&mut self.effects);
    }

    /// Start discovering peers; `on_result` receives every decoded identity
    pub fn start_discovering<F>(&mut self, on_result: F)
    where
        F: FnMut(String) + Send + 'static,
    {
        self.central.enable(Box::new(on_result), &mut self.effects);
    }

    pub fn stop_discovering(&mut self) {
        self.central.disable(&mut self.effects);
    }

    pub fn app_backgrounded(&mut self) {
        debug!("Application moved to background");
        self.lifecycle = LifecycleMode::Background;
    }

    pub fn app_foregrounded(&mut self) {
        debug!("Application moved to foreground");
        self.lifecycle = LifecycleMode::Foreground;
    }

    /// Tear down the active peer connection, optionally advertising too
    pub fn disconnect_peer(&mut self, stop_advertising_too: bool) {
        self.central.disconnect_peer(&mut self.effects);
        if stop_advertising_too {
            self.peripheral.disable(&mut self.effects);
        }
    }

    /// Release everything; the controller may be re-enabled afterwards
    pub fn shutdown(&mut self) {
        info!("Shutting down discovery");
        self.disconnect_peer(true);
        self.central.disable(&mut self.effects);
    }

    pub fn tick(&mut self, now: Instant) {
        self.central.tick(now, &mut self.effects);
    }

    /// Route a radio event to the delegate of the role that produced it
    pub fn handle_event(&mut self, event: RadioEvent) {
        let out = &mut self.effects;
        match event {
            RadioEvent::Peripheral(event) => {
                let role = &mut self.peripheral;
                match event {
                    PeripheralEvent::PowerStateChanged(state) => {
                        role.on_power_state_changed(state, out)
                    }
                    PeripheralEvent::ServiceAdded(result) => role.on_service_added(result, out),
                    PeripheralEvent::AdvertisingStarted(result) => {
                        role.on_advertising_started(result, out)
                    }
                }
            }
            RadioEvent::Central(event) => {
                let role = &mut self.central;
                match event {
                    CentralEvent::PowerStateChanged(state) => {
                        role.on_power_state_changed(state, out)
                    }
                    CentralEvent::PeerDiscovered { peer, rssi } => {
                        role.on_peer_discovered(peer, rssi, out)
                    }
                    CentralEvent::Connected(peer) => role.on_connected(peer, out),
                    CentralEvent::ConnectFailed { peer, error } => {
                        role.on_connect_failed(peer, error, out)
                    }
                    CentralEvent::ServicesDiscovered { peer, services } => {
                        role.on_services_discovered(peer, services, out)
                    }
                    CentralEvent::CharacteristicsDiscovered {
                        peer,
                        service,
                        characteristics,
                    } => role.on_characteristics_discovered(peer, service, characteristics, out),
                    CentralEvent::ValueUpdated {
                        peer,
                        characteristic,
                        value,
                    } => role.on_value_updated(peer, characteristic, value, out),
                    CentralEvent::RssiRead { peer, rssi } => role.on_rssi_read(peer, rssi, out),
                    CentralEvent::NotifyStateUpdated {
                        peer,
                        characteristic,
                        result,
                    } => role.on_notify_state_updated(peer, characteristic, result, out),
                    CentralEvent::Disconnected { peer, error } => {
                        role.on_disconnected(peer, error, out)
                    }
                }
            }
        }
    }

    /// Take every effect emitted since the last drain, in emission order
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    pub fn has_pending_effects(&self) -> bool {
        !self.effects.is_empty()
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn peripheral_state(&self) -> PeripheralState {
        self.peripheral.state()
    }

    pub fn central_state(&self) -> CentralState {
        self.central.state()
    }

    pub fn enable_flags(&self) -> EnableFlags {
        EnableFlags {
            advertising: self.peripheral.is_enabled(),
            discovery: self.central.is_enabled(),
        }
    }

    pub fn lifecycle_mode(&self) -> LifecycleMode {
        self.lifecycle
    }

    pub fn active_peer(&self) -> Option<&PeerHandle> {
        self.central.active_peer()
    }

    pub fn current_rssi(&self) -> Option<f64> {
        self.central.current_rssi()
    }

    /// Estimated distance factor of the latest signal sample
    pub fn proximity(&self, reference_power: i32) -> f64 {
        proximity::accuracy(reference_power, self.central.current_rssi().unwrap_or(0.0))
    }

    pub fn last_discovered(&self) -> Option<&str> {
        self.central.last_discovered()
    }

    pub fn peripheral(&self) -> &PeripheralRole {
        &self.peripheral
    }

    pub fn central(&self) -> &CentralRole {
        &self.central
    }

    pub fn snapshot(&self) -> DiscoverySnapshot {
        DiscoverySnapshot {
            peripheral: self.peripheral_state(),
            central: self.central_state(),
            enabled: self.enable_flags(),
            lifecycle: self.lifecycle,
            active_peer: self.active_peer().cloned(),
            current_rssi: self.current_rssi(),
            proximity: self.proximity(self.config.reference_power),
            last_discovered: self.last_discovered().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{CentralCommand, PeripheralCommand, RadioNotification};
    use crate::proximity::UNKNOWN_ACCURACY;
    use crate::types::{RadioPowerState, ServiceId};

    fn controller() -> DiscoveryController {
        DiscoveryController::new(DiscoveryConfig::new(ServiceId::from_short(0xFEED))).unwrap()
    }

    fn central(event: CentralEvent) -> RadioEvent {
        event.into()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = DiscoveryConfig::default().with_reference_power(0);
        assert!(DiscoveryController::new(config).is_err());
    }

    #[test]
    fn test_fresh_controller_is_idle() {
        let controller = controller();
        assert_eq!(controller.peripheral_state(), PeripheralState::Idle);
        assert_eq!(controller.central_state(), CentralState::Idle);
        assert_eq!(controller.enable_flags(), EnableFlags::default());
        assert!(!controller.has_pending_effects());
        assert_eq!(controller.proximity(-59), UNKNOWN_ACCURACY);
    }

    #[test]
    fn test_enable_flags_follow_operations() {
        let mut controller = controller();
        controller.start_advertising(Identity::new("alice").unwrap());
        controller.start_discovering(|_| {});
        assert_eq!(
            controller.enable_flags(),
            EnableFlags {
                advertising: true,
                discovery: true
            }
        );

        controller.stop_advertising();
        assert!(!controller.enable_flags().advertising);
        assert!(controller.enable_flags().discovery);
    }

    #[test]
    fn test_drain_preserves_emission_order() {
        let mut controller = controller();
        controller.start_advertising(Identity::new("alice").unwrap());
        controller.start_discovering(|_| {});

        let effects = controller.drain_effects();
        assert_eq!(effects.len(), 2);
        assert_eq!(effects[0], Effect::Peripheral(PeripheralCommand::CreateRadio));
        assert!(matches!(
            effects[1],
            Effect::Central(CentralCommand::CreateRadio { .. })
        ));
        assert!(controller.drain_effects().is_empty());
    }

    #[test]
    fn test_handle_event_routes_by_role() {
        let mut controller = controller();
        controller.start_advertising(Identity::new("alice").unwrap());
        controller.start_discovering(|_| {});
        controller.drain_effects();

        controller.handle_event(central(CentralEvent::PowerStateChanged(
            RadioPowerState::PoweredOn,
        )));
        assert_eq!(controller.central_state(), CentralState::Scanning);
        assert_eq!(controller.peripheral_state(), PeripheralState::WaitingForPower);

        controller.handle_event(PeripheralEvent::PowerStateChanged(RadioPowerState::PoweredOn).into());
        assert_eq!(controller.peripheral_state(), PeripheralState::Advertising);

        let effects = controller.drain_effects();
        assert!(effects.contains(&Effect::Notify(RadioNotification::RadioAvailable)));
    }

    #[test]
    fn test_lifecycle_hooks_only_record_mode() {
        let mut controller = controller();
        controller.app_backgrounded();
        assert_eq!(controller.lifecycle_mode(), LifecycleMode::Background);
        assert!(!controller.has_pending_effects());

        controller.app_foregrounded();
        assert_eq!(controller.lifecycle_mode(), LifecycleMode::Foreground);
    }

    #[test]
    fn test_disconnect_with_advertising_teardown() {
        let mut controller = controller();
        controller.start_advertising(Identity::new("alice").unwrap());
        controller.handle_event(PeripheralEvent::PowerStateChanged(RadioPowerState::PoweredOn).into());
        controller.drain_effects();

        controller.disconnect_peer(false);
        assert!(!controller.has_pending_effects());

        controller.disconnect_peer(true);
        assert_eq!(
            controller.drain_effects(),
            vec![
                Effect::Peripheral(PeripheralCommand::StopAdvertising),
                Effect::Peripheral(PeripheralCommand::ReleaseRadio),
            ]
        );
        assert_eq!(controller.peripheral_state(), PeripheralState::Idle);
    }

    #[test]
    fn test_shutdown_releases_both_radios() {
        let mut controller = controller();
        controller.start_advertising(Identity::new("alice").unwrap());
        controller.start_discovering(|_| {});
        controller.shutdown();

        let effects = controller.drain_effects();
        assert!(effects.contains(&Effect::Peripheral(PeripheralCommand::ReleaseRadio)));
        assert!(effects.contains(&Effect::Central(CentralCommand::ReleaseRadio)));
        assert_eq!(controller.enable_flags(), EnableFlags::default());
    }

    #[test]
    fn test_snapshot_reports_proximity_of_latest_sample() {
        let mut controller = controller();
        controller.start_discovering(|_| {});
        controller.handle_event(central(CentralEvent::PowerStateChanged(
            RadioPowerState::PoweredOn,
        )));
        controller.handle_event(central(CentralEvent::PeerDiscovered {
            peer: PeerHandle::new("a"),
            rssi: -59,
        }));

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.active_peer, Some(PeerHandle::new("a")));
        assert_eq!(snapshot.current_rssi, Some(-59.0));
        assert!((snapshot.proximity - 1.01076).abs() < 1e-9);
    }
}
