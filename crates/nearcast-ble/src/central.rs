//! Scanning radio backed by btleplug
//!
//! Commands that wait on the remote device are spawned onto their own task
//! and report back through the attached event sender, so the discovery
//! service never blocks on a connection or a read.

use std::sync::Arc;
use std::time::Instant;

use btleplug::api::{
    Central, CentralEvent as BtleEvent, CharPropFlags, Characteristic, Manager as _,
    Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use nearcast_core::{
    CentralCommand, CentralEvent, PeerHandle, RadioError, RadioPowerState, ServiceId,
};
use nearcast_runtime::RadioEventSender;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::convert::{advertises_any, matching_ids, peer_handle, to_uuid, to_uuids};
use crate::error::{BleError, Result};
use crate::tracker::PeerTracker;

type PeerTable = Arc<RwLock<PeerTracker<Peripheral>>>;

// ----------------------------------------------------------------------------
// Central Radio
// ----------------------------------------------------------------------------

/// btleplug implementation of the scanning radio
#[derive(Default)]
pub struct BtleplugCentral {
    events: Option<RadioEventSender>,
    adapter: Option<Adapter>,
    peers: PeerTable,
    wanted: Arc<RwLock<Vec<ServiceId>>>,
    event_task: Option<JoinHandle<()>>,
}

impl BtleplugCentral {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, events: RadioEventSender) {
        self.events = Some(events);
    }

    fn sender(&self) -> Result<RadioEventSender> {
        self.events.clone().ok_or(BleError::RadioNotCreated)
    }

    fn adapter(&self) -> Result<&Adapter> {
        self.adapter.as_ref().ok_or(BleError::RadioNotCreated)
    }

    async fn lookup(&self, peer: &PeerHandle) -> Option<Peripheral> {
        self.peers.read().await.get(peer)
    }

    async fn open_adapter() -> Result<Adapter> {
        let manager = Manager::new().await?;
        manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(BleError::AdapterNotAvailable)
    }

    pub async fn execute(&mut self, command: CentralCommand) -> Result<()> {
        let events = self.sender()?;
        trace!("Executing {:?}", command);

        match command {
            CentralCommand::CreateRadio { restore_identifier } => {
                if let Some(identifier) = restore_identifier {
                    debug!("Restore identifier '{}' is not used by this stack", identifier);
                }
                match Self::open_adapter().await {
                    Ok(adapter) => {
                        self.event_task = Some(self.spawn_event_stream(&adapter, events.clone()).await?);
                        self.adapter = Some(adapter);
                        info!("BLE central adapter initialized");
                        events.send(CentralEvent::PowerStateChanged(RadioPowerState::PoweredOn));
                    }
                    Err(e) => {
                        warn!("BLE central adapter unavailable: {}", e);
                        events.send(CentralEvent::PowerStateChanged(RadioPowerState::Unavailable));
                    }
                }
            }
            CentralCommand::StartScan {
                services,
                allow_duplicates,
            } => {
                *self.wanted.write().await = services.clone();
                let filter = ScanFilter {
                    services: to_uuids(&services),
                };
                self.adapter()?.start_scan(filter).await?;
                debug!("Started BLE scan (duplicates: {})", allow_duplicates);
            }
            CentralCommand::StopScan => {
                self.adapter()?.stop_scan().await?;
            }
            CentralCommand::Connect(peer) => {
                let Some(peripheral) = self.lookup(&peer).await else {
                    events.send(CentralEvent::ConnectFailed {
                        error: not_found(&peer),
                        peer,
                    });
                    return Ok(());
                };
                self.peers.write().await.set_linked(&peer, true);
                let peers = self.peers.clone();
                tokio::spawn(async move {
                    match peripheral.connect().await {
                        Ok(()) => events.send(CentralEvent::Connected(peer)),
                        Err(e) => {
                            peers.write().await.set_linked(&peer, false);
                            events.send(CentralEvent::ConnectFailed {
                                peer,
                                error: BleError::from(e).to_radio_error(),
                            })
                        }
                    };
                });
            }
            CentralCommand::DiscoverServices { peer, services } => {
                let Some(peripheral) = self.lookup(&peer).await else {
                    events.send(CentralEvent::ServicesDiscovered {
                        services: Err(not_found(&peer)),
                        peer,
                    });
                    return Ok(());
                };
                tokio::spawn(async move {
                    let found = match peripheral.discover_services().await {
                        Ok(()) => Ok(matching_ids(
                            peripheral.services().into_iter().map(|s| s.uuid),
                            &services,
                        )),
                        Err(e) => Err(BleError::from(e).to_radio_error()),
                    };
                    events.send(CentralEvent::ServicesDiscovered {
                        peer,
                        services: found,
                    });
                });
            }
            CentralCommand::DiscoverCharacteristics {
                peer,
                service,
                characteristics,
            } => {
                let found = match self.lookup(&peer).await {
                    Some(peripheral) => Ok(matching_ids(
                        peripheral
                            .characteristics()
                            .into_iter()
                            .filter(|c| c.service_uuid == to_uuid(service))
                            .map(|c| c.uuid),
                        &characteristics,
                    )),
                    None => Err(not_found(&peer)),
                };
                events.send(CentralEvent::CharacteristicsDiscovered {
                    peer,
                    service,
                    characteristics: found,
                });
            }
            CentralCommand::ReadValue {
                peer,
                characteristic,
            } => {
                let target = match self.lookup(&peer).await {
                    Some(peripheral) => find_characteristic(&peripheral, characteristic)
                        .map(|c| (peripheral, c)),
                    None => Err(not_found(&peer)),
                };
                match target {
                    Ok((peripheral, c)) => {
                        tokio::spawn(async move {
                            let value = peripheral
                                .read(&c)
                                .await
                                .map_err(|e| BleError::from(e).to_radio_error());
                            events.send(CentralEvent::ValueUpdated {
                                peer,
                                characteristic,
                                value,
                            });
                        });
                    }
                    Err(error) => {
                        events.send(CentralEvent::ValueUpdated {
                            peer,
                            characteristic,
                            value: Err(error),
                        });
                    }
                }
            }
            CentralCommand::ReadRssi(peer) => {
                let Some(peripheral) = self.lookup(&peer).await else {
                    events.send(CentralEvent::RssiRead {
                        rssi: Err(not_found(&peer)),
                        peer,
                    });
                    return Ok(());
                };
                tokio::spawn(async move {
                    let rssi = match peripheral.properties().await {
                        Ok(properties) => properties
                            .and_then(|p| p.rssi)
                            .ok_or_else(|| RadioError::stack("signal strength unavailable")),
                        Err(e) => Err(BleError::from(e).to_radio_error()),
                    };
                    events.send(CentralEvent::RssiRead { peer, rssi });
                });
            }
            CentralCommand::SetNotify {
                peer,
                characteristic,
                enabled,
            } => {
                let target = match self.lookup(&peer).await {
                    Some(peripheral) => find_characteristic(&peripheral, characteristic)
                        .map(|c| (peripheral, c)),
                    None => Err(not_found(&peer)),
                };
                let (peripheral, c) = match target {
                    Ok(target) => target,
                    Err(error) => {
                        events.send(CentralEvent::NotifyStateUpdated {
                            peer,
                            characteristic,
                            result: Err(error),
                        });
                        return Ok(());
                    }
                };
                tokio::spawn(async move {
                    let result = if !c.properties.contains(CharPropFlags::NOTIFY) {
                        Ok(())
                    } else if enabled {
                        peripheral.subscribe(&c).await
                    } else {
                        peripheral.unsubscribe(&c).await
                    };
                    events.send(CentralEvent::NotifyStateUpdated {
                        peer,
                        characteristic,
                        result: result.map_err(|e| BleError::from(e).to_radio_error()),
                    });
                });
            }
            CentralCommand::CancelConnection(peer) => {
                let Some(peripheral) = self.lookup(&peer).await else {
                    events.send(CentralEvent::Disconnected { peer, error: None });
                    return Ok(());
                };
                let peers = self.peers.clone();
                tokio::spawn(async move {
                    let error = peripheral
                        .disconnect()
                        .await
                        .err()
                        .map(|e| BleError::from(e).to_radio_error());
                    peers.write().await.set_linked(&peer, false);
                    events.send(CentralEvent::Disconnected { peer, error });
                });
            }
            CentralCommand::ReleaseRadio => self.release().await,
        }
        Ok(())
    }

    async fn release(&mut self) {
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
        if let Some(adapter) = self.adapter.take() {
            if let Err(e) = adapter.stop_scan().await {
                debug!("Stopping scan on release failed: {}", e);
            }
        }
        self.peers.write().await.clear();
        self.wanted.write().await.clear();
        info!("BLE central released");
    }

    async fn spawn_event_stream(
        &self,
        adapter: &Adapter,
        events: RadioEventSender,
    ) -> Result<JoinHandle<()>> {
        let mut stream = adapter.events().await?;
        let adapter = adapter.clone();
        let peers = self.peers.clone();
        let wanted = self.wanted.clone();

        Ok(tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                match event {
                    BtleEvent::DeviceDiscovered(id) | BtleEvent::DeviceUpdated(id) => {
                        report_discovery(&adapter, &id, &peers, &wanted, &events).await;
                    }
                    BtleEvent::DeviceDisconnected(id) => {
                        let Ok(peripheral) = adapter.peripheral(&id).await else {
                            continue;
                        };
                        let peer = peer_handle(peripheral.address());
                        let mut table = peers.write().await;
                        if table.contains(&peer) {
                            table.set_linked(&peer, false);
                            drop(table);
                            events.send(CentralEvent::Disconnected { peer, error: None });
                        }
                    }
                    _ => {}
                }
            }
            debug!("BLE central event stream ended");
        }))
    }
}

async fn report_discovery(
    adapter: &Adapter,
    id: &PeripheralId,
    peers: &PeerTable,
    wanted: &RwLock<Vec<ServiceId>>,
    events: &RadioEventSender,
) {
    let Ok(peripheral) = adapter.peripheral(id).await else {
        return;
    };
    let Ok(Some(properties)) = peripheral.properties().await else {
        return;
    };
    if !advertises_any(&properties.services, &wanted.read().await) {
        return;
    }
    let Some(rssi) = properties.rssi else {
        trace!("Skipping {:?} without signal strength", id);
        return;
    };

    let peer = peer_handle(peripheral.address());
    peers
        .write()
        .await
        .observe(peer.clone(), peripheral, Instant::now());
    events.send(CentralEvent::PeerDiscovered { peer, rssi });
}

fn find_characteristic(
    peripheral: &Peripheral,
    characteristic: ServiceId,
) -> std::result::Result<Characteristic, RadioError> {
    let uuid = to_uuid(characteristic);
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid)
        .ok_or_else(|| {
            BleError::CharacteristicNotFound {
                characteristic: characteristic.to_string(),
            }
            .to_radio_error()
        })
}

fn not_found(peer: &PeerHandle) -> RadioError {
    BleError::PeerNotFound {
        peer: peer.to_string(),
    }
    .to_radio_error()
}
