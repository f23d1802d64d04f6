//! Advertising radio backed by BlueZ through bluer

use bluer::adv::{Advertisement, AdvertisementHandle};
use bluer::gatt::local::{
    Application, ApplicationHandle, Characteristic, CharacteristicRead, CharacteristicReadRequest,
    Descriptor, DescriptorRead, DescriptorReadRequest, Service,
};
use bluer::{Adapter, Session};
use nearcast_core::{
    GattCharacteristic, GattDescriptor, GattService, PeripheralCommand, PeripheralEvent,
    RadioPowerState,
};
use nearcast_runtime::RadioEventSender;
use tracing::{debug, info, trace, warn};

use crate::convert::{to_uuid, to_uuids};
use crate::error::{BleError, Result};

// ----------------------------------------------------------------------------
// Linux Implementation
// ----------------------------------------------------------------------------

/// BlueZ implementation of the advertising radio
#[derive(Default)]
pub struct BluerPeripheral {
    events: Option<RadioEventSender>,
    session: Option<Session>,
    adapter: Option<Adapter>,
    services: Vec<GattService>,
    application: Option<ApplicationHandle>,
    advertisement: Option<AdvertisementHandle>,
}

impl BluerPeripheral {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, events: RadioEventSender) {
        self.events = Some(events);
    }

    fn adapter(&self) -> Result<&Adapter> {
        self.adapter.as_ref().ok_or(BleError::RadioNotCreated)
    }

    async fn open(&mut self) -> Result<bool> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        let powered = adapter.is_powered().await?;
        info!("Using Bluetooth adapter {} for advertising", adapter.name());

        self.session = Some(session);
        self.adapter = Some(adapter);
        Ok(powered)
    }

    /// Register every published service as one GATT application
    async fn serve(&mut self) -> Result<()> {
        // dropping the previous handle unregisters it
        self.application = None;
        let application = build_application(&self.services);
        let handle = self.adapter()?.serve_gatt_application(application).await?;
        self.application = Some(handle);
        Ok(())
    }

    pub async fn execute(&mut self, command: PeripheralCommand) -> Result<()> {
        let events = self.events.clone().ok_or(BleError::RadioNotCreated)?;
        trace!("Executing {:?}", command);

        match command {
            PeripheralCommand::CreateRadio => {
                let power = match self.open().await {
                    Ok(powered) => RadioPowerState::from(powered),
                    Err(e) => {
                        warn!("BlueZ adapter unavailable: {}", e);
                        RadioPowerState::Unavailable
                    }
                };
                events.send(PeripheralEvent::PowerStateChanged(power));
            }
            PeripheralCommand::PublishService(service) => {
                self.services.push(service);
                let result = self.serve().await.map_err(|e| e.to_radio_error());
                events.send(PeripheralEvent::ServiceAdded(result));
            }
            PeripheralCommand::RemoveAllServices => {
                self.services.clear();
                self.application = None;
                debug!("Removed all GATT services");
            }
            PeripheralCommand::StartAdvertising(advertisement) => {
                let advertisement = Advertisement {
                    service_uuids: to_uuids(&advertisement.service_ids).into_iter().collect(),
                    discoverable: Some(true),
                    ..Default::default()
                };
                let result = match self.adapter() {
                    Ok(adapter) => adapter.advertise(advertisement).await.map_err(BleError::from),
                    Err(e) => Err(e),
                };
                let result = match result {
                    Ok(handle) => {
                        self.advertisement = Some(handle);
                        Ok(())
                    }
                    Err(e) => Err(e.to_radio_error()),
                };
                events.send(PeripheralEvent::AdvertisingStarted(result));
            }
            PeripheralCommand::StopAdvertising => {
                // dropping the handle stops advertising
                self.advertisement = None;
            }
            PeripheralCommand::ReleaseRadio => {
                self.advertisement = None;
                self.application = None;
                self.services.clear();
                self.adapter = None;
                self.session = None;
                info!("BlueZ peripheral released");
            }
        }
        Ok(())
    }
}

fn build_application(services: &[GattService]) -> Application {
    Application {
        services: services
            .iter()
            .map(|service| Service {
                uuid: to_uuid(service.id),
                primary: service.primary,
                characteristics: service
                    .characteristics
                    .iter()
                    .map(build_characteristic)
                    .collect(),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

fn build_characteristic(characteristic: &GattCharacteristic) -> Characteristic {
    let value = characteristic.value.clone();
    Characteristic {
        uuid: to_uuid(characteristic.id),
        read: characteristic.readable.then(move || CharacteristicRead {
            read: true,
            fun: Box::new(move |_req: CharacteristicReadRequest| {
                let value = value.clone();
                Box::pin(async move { Ok(value) })
            }),
            ..Default::default()
        }),
        descriptors: characteristic
            .descriptors
            .iter()
            .map(build_descriptor)
            .collect(),
        ..Default::default()
    }
}

fn build_descriptor(descriptor: &GattDescriptor) -> Descriptor {
    let value = descriptor.value.clone();
    Descriptor {
        uuid: to_uuid(descriptor.id),
        read: Some(DescriptorRead {
            read: true,
            fun: Box::new(move |_req: DescriptorReadRequest| {
                let value = value.clone();
                Box::pin(async move { Ok(value) })
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
