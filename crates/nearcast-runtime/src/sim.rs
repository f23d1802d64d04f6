//! In-memory radio medium
//!
//! [`SimulatedAir`] is a shared medium that any number of named devices join.
//! Each device gets a [`SimulatedRadio`] driver whose advertisements are
//! visible to the scanners of every other device on the same air. Power,
//! signal strength, connection failures and payload corruption can be
//! controlled per device.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use nearcast_core::{
    CentralCommand, CentralEvent, GattService, PeerHandle, PeripheralCommand, PeripheralEvent,
    RadioError, RadioPowerState, ServiceId,
};
use tokio::sync::RwLock;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::driver::{RadioDriver, RadioEventSender};
use crate::error::{Result, RuntimeError};

/// Signal strength reported for a device unless configured otherwise
pub const DEFAULT_SIMULATED_RSSI: i16 = -60;

#[derive(Debug)]
struct SimDevice {
    /// Handle other devices see this one under
    token: PeerHandle,
    events: Option<RadioEventSender>,
    powered: bool,
    rssi: i16,
    fail_connects: bool,
    corrupt_payload: bool,
    peripheral_radio: bool,
    central_radio: bool,
    services: Vec<GattService>,
    advertising: Option<Vec<ServiceId>>,
    scanning: Option<Vec<ServiceId>>,
    /// Open links keyed by the remote device name
    connections: Vec<String>,
}

impl SimDevice {
    fn new() -> Self {
        Self {
            token: PeerHandle::new(Uuid::new_v4().to_string()),
            events: None,
            powered: true,
            rssi: DEFAULT_SIMULATED_RSSI,
            fail_connects: false,
            corrupt_payload: false,
            peripheral_radio: false,
            central_radio: false,
            services: Vec::new(),
            advertising: None,
            scanning: None,
            connections: Vec::new(),
        }
    }

    fn emit_peripheral(&self, event: PeripheralEvent) {
        if !self.peripheral_radio {
            return;
        }
        if let Some(events) = &self.events {
            events.send(event);
        }
    }

    fn emit_central(&self, event: CentralEvent) {
        if !self.central_radio {
            return;
        }
        if let Some(events) = &self.events {
            events.send(event);
        }
    }

    fn power_state(&self) -> RadioPowerState {
        RadioPowerState::from(self.powered)
    }

    fn advertises_any(&self, filter: &[ServiceId]) -> bool {
        match &self.advertising {
            Some(ids) if self.powered => filter.is_empty() || ids.iter().any(|id| filter.contains(id)),
            _ => false,
        }
    }

    fn find_value(&self, characteristic: ServiceId) -> Option<Vec<u8>> {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.id == characteristic && c.readable)
            .map(|c| c.value.clone())
    }
}

#[derive(Debug, Default)]
struct AirState {
    devices: HashMap<String, SimDevice>,
    /// Rotates the order advertisers are heard in, so a busy scanner
    /// eventually reaches every one of them
    pulses: usize,
}

impl AirState {
    fn device(&self, name: &str) -> Result<&SimDevice> {
        self.devices
            .get(name)
            .ok_or_else(|| RuntimeError::driver(format!("unknown simulated device '{name}'")))
    }

    fn device_mut(&mut self, name: &str) -> Result<&mut SimDevice> {
        self.devices
            .get_mut(name)
            .ok_or_else(|| RuntimeError::driver(format!("unknown simulated device '{name}'")))
    }

    fn name_of(&self, peer: &PeerHandle) -> Option<&str> {
        self.devices
            .iter()
            .find(|(_, d)| d.token == *peer)
            .map(|(name, _)| name.as_str())
    }

    /// Report every matching advertiser to the scanner `name`
    fn report_advertisers_to(&self, name: &str) {
        let Some(scanner) = self.devices.get(name) else {
            return;
        };
        let Some(filter) = &scanner.scanning else {
            return;
        };
        if !scanner.powered {
            return;
        }
        let mut heard: Vec<(&String, &SimDevice)> = self
            .devices
            .iter()
            .filter(|(other, device)| *other != name && device.advertises_any(filter))
            .collect();
        if heard.is_empty() {
            return;
        }
        heard.sort_by(|a, b| a.0.cmp(b.0));
        let rotation = self.pulses % heard.len();
        heard.rotate_left(rotation);

        for (other, device) in heard {
            trace!("{} hears {}", name, other);
            scanner.emit_central(CentralEvent::PeerDiscovered {
                peer: device.token.clone(),
                rssi: device.rssi,
            });
        }
    }

    /// Drop every link touching `name`, reporting it to the affected scanners
    fn drop_links(&mut self, name: &str) {
        let Some(token) = self.devices_token(name) else {
            return;
        };

        let remotes = self
            .devices
            .get_mut(name)
            .map(|d| std::mem::take(&mut d.connections))
            .unwrap_or_default();
        if let Some(device) = self.devices.get(name) {
            for remote in &remotes {
                if let Some(peer) = self.devices_token(remote) {
                    device.emit_central(CentralEvent::Disconnected {
                        peer,
                        error: Some(RadioError::Unavailable),
                    });
                }
            }
        }

        for (other, device) in self.devices.iter_mut() {
            if other != name && device.connections.iter().any(|c| c == name) {
                device.connections.retain(|c| c != name);
                device.emit_central(CentralEvent::Disconnected {
                    peer: token.clone(),
                    error: Some(RadioError::ConnectionFailed("link lost".to_string())),
                });
            }
        }
    }

    fn devices_token(&self, name: &str) -> Option<PeerHandle> {
        self.devices.get(name).map(|d| d.token.clone())
    }
}

// ----------------------------------------------------------------------------
// Simulated Air
// ----------------------------------------------------------------------------

/// Shared in-memory radio medium
#[derive(Debug, Clone, Default)]
pub struct SimulatedAir {
    state: Arc<RwLock<AirState>>,
}

impl SimulatedAir {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a new device to the air and return its driver
    pub async fn device(&self, name: impl Into<String>) -> SimulatedRadio {
        let name = name.into();
        self.state
            .write()
            .await
            .devices
            .entry(name.clone())
            .or_insert_with(SimDevice::new);
        SimulatedRadio {
            air: self.clone(),
            name,
            pending_events: None,
        }
    }

    /// Handle under which other devices see `name`
    pub async fn peer_handle(&self, name: &str) -> Option<PeerHandle> {
        self.state.read().await.devices_token(name)
    }

    /// Toggle the radio power of `name`, notifying both of its roles
    pub async fn set_powered(&self, name: &str, powered: bool) -> Result<()> {
        let mut state = self.state.write().await;
        {
            let device = state.device_mut(name)?;
            if device.powered == powered {
                return Ok(());
            }
            device.powered = powered;
            debug!("{} radio powered {}", name, if powered { "on" } else { "off" });
        }

        if !powered {
            state.drop_links(name);
            let device = state.device_mut(name)?;
            device.advertising = None;
            device.scanning = None;
        }

        let device = state.device(name)?;
        let power = device.power_state();
        device.emit_peripheral(PeripheralEvent::PowerStateChanged(power));
        device.emit_central(CentralEvent::PowerStateChanged(power));
        Ok(())
    }

    pub async fn set_rssi(&self, name: &str, rssi: i16) -> Result<()> {
        self.state.write().await.device_mut(name)?.rssi = rssi;
        Ok(())
    }

    /// Make every connection attempt towards `name` fail
    pub async fn set_connect_failures(&self, name: &str, fail: bool) -> Result<()> {
        self.state.write().await.device_mut(name)?.fail_connects = fail;
        Ok(())
    }

    /// Make reads from `name` return bytes that are not valid UTF-8
    pub async fn set_corrupt_payload(&self, name: &str, corrupt: bool) -> Result<()> {
        self.state.write().await.device_mut(name)?.corrupt_payload = corrupt;
        Ok(())
    }

    /// Re-deliver every visible advertisement to every scanner.
    ///
    /// Stands in for the periodic duplicate reports a real scanner produces.
    pub async fn pulse(&self) {
        let mut state = self.state.write().await;
        state.pulses = state.pulses.wrapping_add(1);
        for name in state.devices.keys() {
            state.report_advertisers_to(name);
        }
    }

    /// Number of open links held by the scanner `name`
    pub async fn open_links(&self, name: &str) -> usize {
        self.state
            .read()
            .await
            .devices
            .get(name)
            .map_or(0, |d| d.connections.len())
    }
}

// ----------------------------------------------------------------------------
// Simulated Radio
// ----------------------------------------------------------------------------

/// Radio driver for one device on a [`SimulatedAir`]
#[derive(Debug, Clone)]
pub struct SimulatedRadio {
    air: SimulatedAir,
    name: String,
    /// Sender handed over on attach, joined to the air with the first command
    pending_events: Option<RadioEventSender>,
}

impl SimulatedRadio {
    fn register(&mut self, state: &mut AirState) -> Result<()> {
        if let Some(events) = self.pending_events.take() {
            state.device_mut(&self.name)?.events = Some(events);
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn air(&self) -> &SimulatedAir {
        &self.air
    }
}

#[async_trait]
impl RadioDriver for SimulatedRadio {
    fn attach(&mut self, events: RadioEventSender) -> Result<()> {
        self.pending_events = Some(events);
        Ok(())
    }

    async fn execute_peripheral(&mut self, command: PeripheralCommand) -> Result<()> {
        let air = self.air.clone();
        let mut state = air.state.write().await;
        self.register(&mut state)?;
        trace!("{} peripheral: {:?}", self.name, command);

        match command {
            PeripheralCommand::CreateRadio => {
                let device = state.device_mut(&self.name)?;
                device.peripheral_radio = true;
                device.emit_peripheral(PeripheralEvent::PowerStateChanged(device.power_state()));
            }
            PeripheralCommand::PublishService(service) => {
                let device = state.device_mut(&self.name)?;
                device.services.push(service);
                device.emit_peripheral(PeripheralEvent::ServiceAdded(Ok(())));
            }
            PeripheralCommand::RemoveAllServices => {
                state.device_mut(&self.name)?.services.clear();
            }
            PeripheralCommand::StartAdvertising(advertisement) => {
                let device = state.device_mut(&self.name)?;
                if !device.powered {
                    device.emit_peripheral(PeripheralEvent::AdvertisingStarted(Err(
                        RadioError::Unavailable,
                    )));
                    return Ok(());
                }
                device.advertising = Some(advertisement.service_ids);
                device.emit_peripheral(PeripheralEvent::AdvertisingStarted(Ok(())));

                let scanners: Vec<String> = state
                    .devices
                    .keys()
                    .filter(|n| **n != self.name)
                    .cloned()
                    .collect();
                for scanner in scanners {
                    state.report_advertisers_to(&scanner);
                }
            }
            PeripheralCommand::StopAdvertising => {
                state.device_mut(&self.name)?.advertising = None;
            }
            PeripheralCommand::ReleaseRadio => {
                let device = state.device_mut(&self.name)?;
                device.peripheral_radio = false;
                device.advertising = None;
                device.services.clear();
            }
        }
        Ok(())
    }

    async fn execute_central(&mut self, command: CentralCommand) -> Result<()> {
        let air = self.air.clone();
        let mut state = air.state.write().await;
        self.register(&mut state)?;
        trace!("{} central: {:?}", self.name, command);

        match command {
            CentralCommand::CreateRadio { .. } => {
                let device = state.device_mut(&self.name)?;
                device.central_radio = true;
                device.emit_central(CentralEvent::PowerStateChanged(device.power_state()));
            }
            CentralCommand::StartScan { services, .. } => {
                state.device_mut(&self.name)?.scanning = Some(services);
                state.report_advertisers_to(&self.name);
            }
            CentralCommand::StopScan => {
                state.device_mut(&self.name)?.scanning = None;
            }
            CentralCommand::Connect(peer) => {
                let target = state.name_of(&peer).map(str::to_string);
                let reachable = target.as_deref().and_then(|name| {
                    state
                        .devices
                        .get(name)
                        .filter(|d| d.powered && d.advertising.is_some() && !d.fail_connects)
                        .map(|_| name.to_string())
                });
                let device = state.device_mut(&self.name)?;
                match reachable {
                    Some(name) if device.powered => {
                        device.connections.push(name);
                        device.emit_central(CentralEvent::Connected(peer));
                    }
                    _ => device.emit_central(CentralEvent::ConnectFailed {
                        peer,
                        error: RadioError::ConnectionFailed("peer unreachable".to_string()),
                    }),
                }
            }
            CentralCommand::DiscoverServices { peer, services } => {
                let found = match state.name_of(&peer) {
                    Some(name) => Ok(state
                        .device(name)?
                        .services
                        .iter()
                        .map(|s| s.id)
                        .filter(|id| services.is_empty() || services.contains(id))
                        .collect()),
                    None => Err(RadioError::ConnectionFailed("peer gone".to_string())),
                };
                state
                    .device(&self.name)?
                    .emit_central(CentralEvent::ServicesDiscovered {
                        peer,
                        services: found,
                    });
            }
            CentralCommand::DiscoverCharacteristics {
                peer,
                service,
                characteristics,
            } => {
                let found = match state.name_of(&peer) {
                    Some(name) => Ok(state
                        .device(name)?
                        .services
                        .iter()
                        .filter(|s| s.id == service)
                        .flat_map(|s| s.characteristics.iter().map(|c| c.id))
                        .filter(|id| characteristics.is_empty() || characteristics.contains(id))
                        .collect()),
                    None => Err(RadioError::ConnectionFailed("peer gone".to_string())),
                };
                state
                    .device(&self.name)?
                    .emit_central(CentralEvent::CharacteristicsDiscovered {
                        peer,
                        service,
                        characteristics: found,
                    });
            }
            CentralCommand::ReadValue {
                peer,
                characteristic,
            } => {
                let value = match state.name_of(&peer).map(|name| state.device(name)) {
                    Some(Ok(target)) if target.corrupt_payload => Ok(vec![0xC3, 0x28, 0xFF]),
                    Some(Ok(target)) => target
                        .find_value(characteristic)
                        .ok_or_else(|| RadioError::stack("characteristic not readable")),
                    _ => Err(RadioError::ConnectionFailed("peer gone".to_string())),
                };
                state
                    .device(&self.name)?
                    .emit_central(CentralEvent::ValueUpdated {
                        peer,
                        characteristic,
                        value,
                    });
            }
            CentralCommand::ReadRssi(peer) => {
                let rssi = state
                    .name_of(&peer)
                    .and_then(|name| state.devices.get(name))
                    .map(|d| d.rssi)
                    .ok_or_else(|| RadioError::ConnectionFailed("peer gone".to_string()));
                state
                    .device(&self.name)?
                    .emit_central(CentralEvent::RssiRead { peer, rssi });
            }
            CentralCommand::SetNotify {
                peer,
                characteristic,
                ..
            } => {
                state
                    .device(&self.name)?
                    .emit_central(CentralEvent::NotifyStateUpdated {
                        peer,
                        characteristic,
                        result: Ok(()),
                    });
            }
            CentralCommand::CancelConnection(peer) => {
                let target = state.name_of(&peer).map(str::to_string);
                let device = state.device_mut(&self.name)?;
                if let Some(target) = target {
                    device.connections.retain(|c| *c != target);
                }
                device.emit_central(CentralEvent::Disconnected { peer, error: None });
            }
            CentralCommand::ReleaseRadio => {
                let device = state.device_mut(&self.name)?;
                device.central_radio = false;
                device.scanning = None;
                device.connections.clear();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearcast_core::{Advertisement, Identity, RadioEvent};
    use tokio::sync::mpsc;

    async fn attached(air: &SimulatedAir, name: &str) -> (SimulatedRadio, mpsc::UnboundedReceiver<RadioEvent>) {
        let mut radio = air.device(name).await;
        let (tx, rx) = RadioEventSender::channel();
        radio.attach(tx).unwrap();
        (radio, rx)
    }

    fn service_id() -> ServiceId {
        ServiceId::from_short(0xFEED)
    }

    #[tokio::test]
    async fn test_create_radio_reports_power() {
        let air = SimulatedAir::new();
        let (mut radio, mut rx) = attached(&air, "a").await;

        radio.execute_central(CentralCommand::CreateRadio { restore_identifier: None }).await.unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            RadioEvent::Central(CentralEvent::PowerStateChanged(RadioPowerState::PoweredOn))
        );
    }

    #[tokio::test]
    async fn test_events_of_released_radio_are_not_delivered() {
        let air = SimulatedAir::new();
        let (mut radio, mut rx) = attached(&air, "a").await;
        radio.execute_peripheral(PeripheralCommand::CreateRadio).await.unwrap();
        radio.execute_central(CentralCommand::CreateRadio { restore_identifier: None }).await.unwrap();
        let _peripheral_power = rx.try_recv().unwrap();
        let _central_power = rx.try_recv().unwrap();

        air.set_powered("a", false).await.unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            RadioEvent::Peripheral(PeripheralEvent::PowerStateChanged(RadioPowerState::Unavailable))
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            RadioEvent::Central(CentralEvent::PowerStateChanged(RadioPowerState::Unavailable))
        );

        radio.execute_peripheral(PeripheralCommand::ReleaseRadio).await.unwrap();
        radio.execute_central(CentralCommand::ReleaseRadio).await.unwrap();
        air.set_powered("a", true).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    async fn advertise(radio: &mut SimulatedRadio, identity: &str) {
        radio.execute_peripheral(PeripheralCommand::CreateRadio).await.unwrap();
        radio
            .execute_peripheral(PeripheralCommand::PublishService(GattService::identity_service(
                service_id(),
                &Identity::new(identity).unwrap(),
            )))
            .await
            .unwrap();
        radio
            .execute_peripheral(PeripheralCommand::StartAdvertising(Advertisement {
                service_ids: vec![service_id()],
            }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_scanner_hears_advertiser() {
        let air = SimulatedAir::new();
        let (mut advertiser, _) = attached(&air, "alice").await;
        let (mut scanner, mut rx) = attached(&air, "bob").await;
        air.set_rssi("alice", -42).await.unwrap();
        advertise(&mut advertiser, "alice").await;

        scanner.execute_central(CentralCommand::CreateRadio { restore_identifier: None }).await.unwrap();
        scanner
            .execute_central(CentralCommand::StartScan {
                services: vec![service_id()],
                allow_duplicates: true,
            })
            .await
            .unwrap();

        let alice = air.peer_handle("alice").await.unwrap();
        let _power = rx.try_recv().unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            RadioEvent::Central(CentralEvent::PeerDiscovered { peer: alice, rssi: -42 })
        );
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_not_utf8() {
        let air = SimulatedAir::new();
        let (mut advertiser, _) = attached(&air, "alice").await;
        let (mut scanner, mut rx) = attached(&air, "bob").await;
        advertise(&mut advertiser, "alice").await;
        air.set_corrupt_payload("alice", true).await.unwrap();

        scanner.execute_central(CentralCommand::CreateRadio { restore_identifier: None }).await.unwrap();
        let alice = air.peer_handle("alice").await.unwrap();
        scanner
            .execute_central(CentralCommand::ReadValue {
                peer: alice,
                characteristic: service_id(),
            })
            .await
            .unwrap();

        let _power = rx.try_recv().unwrap();
        match rx.try_recv().unwrap() {
            RadioEvent::Central(CentralEvent::ValueUpdated { value: Ok(bytes), .. }) => {
                assert!(String::from_utf8(bytes).is_err());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_failure_injection() {
        let air = SimulatedAir::new();
        let (mut advertiser, _) = attached(&air, "alice").await;
        let (mut scanner, mut rx) = attached(&air, "bob").await;
        advertise(&mut advertiser, "alice").await;
        air.set_connect_failures("alice", true).await.unwrap();

        scanner.execute_central(CentralCommand::CreateRadio { restore_identifier: None }).await.unwrap();
        let alice = air.peer_handle("alice").await.unwrap();
        scanner.execute_central(CentralCommand::Connect(alice.clone())).await.unwrap();

        let _power = rx.try_recv().unwrap();
        assert!(matches!(
            rx.try_recv().unwrap(),
            RadioEvent::Central(CentralEvent::ConnectFailed { peer, .. }) if peer == alice
        ));
        assert_eq!(air.open_links("bob").await, 0);

        air.set_connect_failures("alice", false).await.unwrap();
        scanner.execute_central(CentralCommand::Connect(alice.clone())).await.unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            RadioEvent::Central(CentralEvent::Connected(alice))
        );
        assert_eq!(air.open_links("bob").await, 1);
    }

    #[tokio::test]
    async fn test_power_loss_drops_links() {
        let air = SimulatedAir::new();
        let (mut advertiser, _) = attached(&air, "alice").await;
        let (mut scanner, mut rx) = attached(&air, "bob").await;
        advertise(&mut advertiser, "alice").await;

        scanner.execute_central(CentralCommand::CreateRadio { restore_identifier: None }).await.unwrap();
        let alice = air.peer_handle("alice").await.unwrap();
        scanner.execute_central(CentralCommand::Connect(alice.clone())).await.unwrap();
        let _power = rx.try_recv().unwrap();
        let _connected = rx.try_recv().unwrap();

        air.set_powered("alice", false).await.unwrap();
        assert!(matches!(
            rx.try_recv().unwrap(),
            RadioEvent::Central(CentralEvent::Disconnected { peer, error: Some(_) }) if peer == alice
        ));
        assert_eq!(air.open_links("bob").await, 0);
    }

    #[tokio::test]
    async fn test_unknown_device_is_a_driver_error() {
        let air = SimulatedAir::new();
        assert!(matches!(
            air.set_powered("nobody", false).await,
            Err(RuntimeError::Driver(_))
        ));
    }
}
