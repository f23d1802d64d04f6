//! Scanning, connecting and reading lifecycle
//!
//! One discovery cycle binds a single peer: connect, resolve the discovery
//! service and characteristic, read the identity once, then tear the
//! connection down and accept the next discovered peer.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::config::DiscoveryConfig;
use crate::delegate::CentralDelegate;
use crate::effect::{CentralCommand, Effect, RadioNotification};
use crate::error::RadioError;
use crate::event::RadioResult;
use crate::types::{PeerHandle, RadioHandle, RadioPowerState, ServiceId};

/// Callback receiving every successfully decoded peer identity
pub type ResultCallback = Box<dyn FnMut(String) + Send>;

// ----------------------------------------------------------------------------
// Central State
// ----------------------------------------------------------------------------

/// Sub-state while connected to the active peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectedPhase {
    CharacteristicDiscovery,
    ReadPending,
}

/// Observable state of the scanning role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CentralState {
    #[default]
    Idle,
    WaitingForPower,
    Scanning,
    Connecting,
    Connected(ConnectedPhase),
    Disconnecting,
}

/// Link-level state of the active peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CyclePhase {
    AwaitingConnection,
    DiscoveringServices,
    DiscoveringCharacteristics,
    ReadPending,
    /// Notify-off sent, waiting for the acknowledgement before cancelling
    Unsubscribing,
    Disconnecting,
}

#[derive(Debug, Clone)]
struct ResolvedService {
    id: ServiceId,
    characteristics: Option<Vec<ServiceId>>,
}

#[derive(Debug, Clone)]
struct ActivePeer {
    handle: PeerHandle,
    link: LinkState,
    phase: CyclePhase,
    services: Option<Vec<ResolvedService>>,
    /// Stamped by the first `tick` that sees this cycle
    started_at: Option<Instant>,
}

// ----------------------------------------------------------------------------
// Central Role
// ----------------------------------------------------------------------------

/// The scanning role
pub struct CentralRole {
    service_id: ServiceId,
    allow_duplicates: bool,
    restore_identifier: Option<String>,
    cycle_timeout: Option<Duration>,
    radio: RadioHandle,
    power: RadioPowerState,
    enabled: bool,
    scanning: bool,
    active: Option<ActivePeer>,
    current_rssi: Option<f64>,
    last_discovered: Option<String>,
    on_result: Option<ResultCallback>,
}

impl fmt::Debug for CentralRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CentralRole")
            .field("service_id", &self.service_id)
            .field("state", &self.state())
            .field("radio", &self.radio)
            .field("power", &self.power)
            .field("active", &self.active_peer())
            .field("current_rssi", &self.current_rssi)
            .finish_non_exhaustive()
    }
}

impl CentralRole {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            service_id: config.service_id,
            allow_duplicates: config.allow_duplicates,
            restore_identifier: config.restore_identifier.clone(),
            cycle_timeout: config.cycle_timeout,
            radio: RadioHandle::Absent,
            power: RadioPowerState::Unknown,
            enabled: false,
            scanning: false,
            active: None,
            current_rssi: None,
            last_discovered: None,
            on_result: None,
        }
    }

    pub fn state(&self) -> CentralState {
        if !self.enabled {
            return CentralState::Idle;
        }
        match self.active.as_ref().map(|a| a.phase) {
            Some(CyclePhase::AwaitingConnection | CyclePhase::DiscoveringServices) => {
                CentralState::Connecting
            }
            Some(CyclePhase::DiscoveringCharacteristics) => {
                CentralState::Connected(ConnectedPhase::CharacteristicDiscovery)
            }
            Some(CyclePhase::ReadPending) => CentralState::Connected(ConnectedPhase::ReadPending),
            Some(CyclePhase::Unsubscribing | CyclePhase::Disconnecting) => {
                CentralState::Disconnecting
            }
            None if self.scanning => CentralState::Scanning,
            None => CentralState::WaitingForPower,
        }
    }

    pub fn radio(&self) -> RadioHandle {
        self.radio
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// The peer bound to the current discovery cycle
    pub fn active_peer(&self) -> Option<&PeerHandle> {
        self.active.as_ref().map(|a| &a.handle)
    }

    pub fn active_link(&self) -> Option<LinkState> {
        self.active.as_ref().map(|a| a.link)
    }

    /// Latest signal strength sample, if any was taken
    pub fn current_rssi(&self) -> Option<f64> {
        self.current_rssi
    }

    /// Identity decoded in the most recent successful cycle
    pub fn last_discovered(&self) -> Option<&str> {
        self.last_discovered.as_deref()
    }

    /// Start discovering, creating the radio handle on first use
    pub fn enable(&mut self, on_result: ResultCallback, out: &mut Vec<Effect>) {
        info!("Enabling discovery for service {}", self.service_id);
        self.on_result = Some(on_result);
        self.enabled = true;

        match self.radio {
            RadioHandle::Absent => {
                self.radio = RadioHandle::Initializing;
                out.push(
                    CentralCommand::CreateRadio {
                        restore_identifier: self.restore_identifier.clone(),
                    }
                    .into(),
                );
            }
            RadioHandle::Ready if self.power.is_powered_on() && !self.scanning => {
                self.start_scan(out)
            }
            _ => {}
        }
    }

    /// Cancel any connection and scan and release the radio. Safe in any state.
    pub fn disable(&mut self, out: &mut Vec<Effect>) {
        self.enabled = false;
        self.on_result = None;

        if let Some(active) = self.active.take() {
            debug!("Cancelling connection to {} on disable", active.handle);
            out.push(CentralCommand::CancelConnection(active.handle).into());
        }
        if self.scanning {
            out.push(CentralCommand::StopScan.into());
            self.scanning = false;
        }
        if !self.radio.is_absent() {
            out.push(CentralCommand::ReleaseRadio.into());
            self.radio = RadioHandle::Absent;
            self.power = RadioPowerState::Unknown;
            info!("Discovery disabled");
        }
    }

    /// Tear down the connection to the active peer.
    ///
    /// Completion is asynchronous: the slot is freed when the radio reports
    /// the disconnect, except for a peer whose link never came up, which is
    /// released immediately.
    pub fn disconnect_peer(&mut self, out: &mut Vec<Effect>) {
        let target = self.service_id;
        let Some(active) = self.active.as_mut() else {
            debug!("No peer available to clean up");
            return;
        };

        if active.link != LinkState::Connected {
            debug!("Peer {} is not connected; releasing handle", active.handle);
            self.active = None;
            return;
        }
        if matches!(
            active.phase,
            CyclePhase::Unsubscribing | CyclePhase::Disconnecting
        ) {
            return;
        }

        let has_target = match &active.services {
            None => {
                out.push(CentralCommand::CancelConnection(active.handle.clone()).into());
                active.phase = CyclePhase::Disconnecting;
                return;
            }
            Some(services) => services.iter().any(|s| {
                s.characteristics
                    .as_ref()
                    .is_some_and(|chars| chars.contains(&target))
            }),
        };

        if has_target {
            out.push(
                CentralCommand::SetNotify {
                    peer: active.handle.clone(),
                    characteristic: target,
                    enabled: false,
                }
                .into(),
            );
            active.phase = CyclePhase::Unsubscribing;
        } else {
            out.push(CentralCommand::CancelConnection(active.handle.clone()).into());
            active.phase = CyclePhase::Disconnecting;
        }
    }

    /// Abandon a cycle that has outlived the configured timeout.
    ///
    /// A cycle is timed from the first tick that observes it. Once a cancel
    /// is outstanding the slot is only freed by the disconnect report or a
    /// power loss, so no new connect overlaps the teardown.
    pub fn tick(&mut self, now: Instant, out: &mut Vec<Effect>) {
        let (Some(timeout), Some(active)) = (self.cycle_timeout, self.active.as_mut()) else {
            return;
        };
        if active.phase == CyclePhase::Disconnecting {
            return;
        }
        let started_at = *active.started_at.get_or_insert(now);
        if now.saturating_duration_since(started_at) < timeout {
            return;
        }

        warn!(
            "Discovery cycle with {} exceeded {:?}; abandoning",
            active.handle, timeout
        );
        out.push(CentralCommand::CancelConnection(active.handle.clone()).into());
        self.active = None;
    }

    fn start_scan(&mut self, out: &mut Vec<Effect>) {
        out.push(
            CentralCommand::StartScan {
                services: vec![self.service_id],
                allow_duplicates: self.allow_duplicates,
            }
            .into(),
        );
        self.scanning = true;
        info!("Scanning for service {}", self.service_id);
    }

    fn is_active(&self, peer: &PeerHandle) -> bool {
        self.active.as_ref().is_some_and(|a| a.handle == *peer)
    }

    fn active_mut(&mut self, peer: &PeerHandle) -> Option<&mut ActivePeer> {
        self.active.as_mut().filter(|a| a.handle == *peer)
    }
}

impl CentralDelegate for CentralRole {
    fn on_power_state_changed(&mut self, state: RadioPowerState, out: &mut Vec<Effect>) {
        if self.radio.is_absent() {
            debug!("Ignoring power state {:?} from a released scanning radio", state);
            return;
        }
        self.radio = RadioHandle::Ready;
        self.power = state;

        if state.is_powered_on() {
            out.push(RadioNotification::RadioAvailable.into());
            if self.enabled && !self.scanning {
                self.start_scan(out);
            }
        } else {
            info!("Scanning radio unavailable ({:?})", state);
            out.push(RadioNotification::RadioUnavailable.into());
            if let Some(active) = self.active.take() {
                debug!("Dropping active peer {} on power loss", active.handle);
            }
            self.scanning = false;
        }
    }

    fn on_peer_discovered(&mut self, peer: PeerHandle, rssi: i16, out: &mut Vec<Effect>) {
        if !self.enabled || !self.scanning {
            trace!("Ignoring discovery of {} while not scanning", peer);
            return;
        }
        if self.active.is_some() {
            if self.is_active(&peer) {
                self.current_rssi = Some(f64::from(rssi));
            }
            trace!("Dropping discovery of {} while a cycle is active", peer);
            return;
        }

        debug!("Discovered peer {} (rssi {})", peer, rssi);
        self.current_rssi = Some(f64::from(rssi));
        out.push(CentralCommand::Connect(peer.clone()).into());
        self.active = Some(ActivePeer {
            handle: peer,
            link: LinkState::Connecting,
            phase: CyclePhase::AwaitingConnection,
            services: None,
            started_at: None,
        });
    }

    fn on_connected(&mut self, peer: PeerHandle, out: &mut Vec<Effect>) {
        let target = self.service_id;
        match self.active_mut(&peer) {
            Some(active) if active.link == LinkState::Connecting => {
                debug!("Connected to {}", peer);
                active.link = LinkState::Connected;
                active.phase = CyclePhase::DiscoveringServices;
                out.push(
                    CentralCommand::DiscoverServices {
                        peer: peer.clone(),
                        services: vec![target],
                    }
                    .into(),
                );
                out.push(CentralCommand::ReadRssi(peer).into());
            }
            Some(_) => trace!("Duplicate connect report for {}", peer),
            None => {
                debug!("Connection to inactive peer {}; cancelling", peer);
                out.push(CentralCommand::CancelConnection(peer).into());
            }
        }
    }

    fn on_connect_failed(&mut self, peer: PeerHandle, error: RadioError, _out: &mut Vec<Effect>) {
        if self.is_active(&peer) {
            warn!("Failed to connect to {}: {}", peer, error);
            self.active = None;
        } else {
            debug!("Ignoring connect failure for inactive peer {}", peer);
        }
    }

    fn on_services_discovered(
        &mut self,
        peer: PeerHandle,
        services: RadioResult<Vec<ServiceId>>,
        out: &mut Vec<Effect>,
    ) {
        let target = self.service_id;
        let Some(active) = self.active_mut(&peer) else {
            return;
        };

        let services = match services {
            Ok(services) => services,
            Err(e) => {
                warn!("Service discovery on {} failed: {}", peer, e);
                self.disconnect_peer(out);
                return;
            }
        };

        let has_target = services.contains(&target);
        active.services = Some(
            services
                .into_iter()
                .map(|id| ResolvedService {
                    id,
                    characteristics: None,
                })
                .collect(),
        );

        if has_target {
            out.push(
                CentralCommand::DiscoverCharacteristics {
                    peer,
                    service: target,
                    characteristics: vec![target],
                }
                .into(),
            );
            active.phase = CyclePhase::DiscoveringCharacteristics;
        } else {
            debug!("Peer {} does not expose the discovery service", peer);
            self.disconnect_peer(out);
        }
    }

    fn on_characteristics_discovered(
        &mut self,
        peer: PeerHandle,
        service: ServiceId,
        characteristics: RadioResult<Vec<ServiceId>>,
        out: &mut Vec<Effect>,
    ) {
        let target = self.service_id;
        let Some(active) = self.active_mut(&peer) else {
            return;
        };

        let characteristics = match characteristics {
            Ok(characteristics) => characteristics,
            Err(e) => {
                warn!("Characteristic discovery on {} failed: {}", peer, e);
                self.disconnect_peer(out);
                return;
            }
        };

        let has_target = service == target && characteristics.contains(&target);
        let services = active.services.get_or_insert_with(Vec::new);
        match services.iter_mut().find(|s| s.id == service) {
            Some(resolved) => resolved.characteristics = Some(characteristics),
            None => services.push(ResolvedService {
                id: service,
                characteristics: Some(characteristics),
            }),
        }

        if has_target {
            out.push(
                CentralCommand::ReadValue {
                    peer,
                    characteristic: target,
                }
                .into(),
            );
            active.phase = CyclePhase::ReadPending;
        } else {
            debug!("Peer {} lacks the identity characteristic", peer);
            self.disconnect_peer(out);
        }
    }

    fn on_value_updated(
        &mut self,
        peer: PeerHandle,
        characteristic: ServiceId,
        value: RadioResult<Vec<u8>>,
        out: &mut Vec<Effect>,
    ) {
        let reading = self
            .active
            .as_ref()
            .is_some_and(|a| a.handle == peer && a.phase == CyclePhase::ReadPending);
        if !reading || characteristic != self.service_id {
            trace!("Ignoring unsolicited value from {}", peer);
            return;
        }

        match value {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(identity) => {
                    info!("Discovered identity '{}' from {}", identity, peer);
                    self.last_discovered = Some(identity.clone());
                    if let Some(on_result) = self.on_result.as_mut() {
                        on_result(identity);
                    }
                }
                Err(_) => debug!("Dropping undecodable identity from {}", peer),
            },
            Err(e) => warn!("Reading identity from {} failed: {}", peer, e),
        }

        self.disconnect_peer(out);
    }

    fn on_rssi_read(&mut self, peer: PeerHandle, rssi: RadioResult<i16>, _out: &mut Vec<Effect>) {
        if !self.is_active(&peer) {
            return;
        }
        match rssi {
            Ok(rssi) => self.current_rssi = Some(f64::from(rssi)),
            Err(e) => debug!("RSSI read on {} failed: {}", peer, e),
        }
    }

    fn on_notify_state_updated(
        &mut self,
        peer: PeerHandle,
        _characteristic: ServiceId,
        result: RadioResult<()>,
        out: &mut Vec<Effect>,
    ) {
        let Some(active) = self.active_mut(&peer) else {
            return;
        };
        if active.phase != CyclePhase::Unsubscribing {
            return;
        }
        if let Err(e) = result {
            debug!("Unsubscribe on {} failed: {}; cancelling anyway", peer, e);
        }
        out.push(CentralCommand::CancelConnection(peer).into());
        active.phase = CyclePhase::Disconnecting;
    }

    fn on_disconnected(
        &mut self,
        peer: PeerHandle,
        error: Option<RadioError>,
        _out: &mut Vec<Effect>,
    ) {
        if !self.is_active(&peer) {
            trace!("Disconnect of inactive peer {}", peer);
            return;
        }
        match error {
            Some(e) => warn!("Peer {} disconnected: {}", peer, e),
            None => debug!("Peer {} disconnected", peer),
        }
        self.active = None;
    }
}
