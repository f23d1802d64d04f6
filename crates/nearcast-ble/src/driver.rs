//! Radio driver combining the platform central and peripheral stacks

use async_trait::async_trait;
use nearcast_core::{CentralCommand, PeripheralCommand};
use nearcast_runtime::{RadioDriver, RadioEventSender};

use crate::central::BtleplugCentral;

#[cfg(target_os = "linux")]
use crate::peripheral::BluerPeripheral;

#[cfg(not(target_os = "linux"))]
use nearcast_core::{PeripheralEvent, RadioPowerState};

/// Driver for the host Bluetooth adapter
#[derive(Default)]
pub struct PlatformRadio {
    central: BtleplugCentral,
    #[cfg(target_os = "linux")]
    peripheral: BluerPeripheral,
    #[cfg(not(target_os = "linux"))]
    events: Option<RadioEventSender>,
}

impl PlatformRadio {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RadioDriver for PlatformRadio {
    fn attach(&mut self, events: RadioEventSender) -> nearcast_runtime::Result<()> {
        self.central.attach(events.clone());
        #[cfg(target_os = "linux")]
        self.peripheral.attach(events);
        #[cfg(not(target_os = "linux"))]
        {
            self.events = Some(events);
        }
        Ok(())
    }

    #[cfg(target_os = "linux")]
    async fn execute_peripheral(&mut self, command: PeripheralCommand) -> nearcast_runtime::Result<()> {
        Ok(self.peripheral.execute(command).await?)
    }

    #[cfg(not(target_os = "linux"))]
    async fn execute_peripheral(&mut self, command: PeripheralCommand) -> nearcast_runtime::Result<()> {
        if matches!(command, PeripheralCommand::CreateRadio) {
            tracing::warn!("Advertising is not supported on this platform");
            if let Some(events) = &self.events {
                events.send(PeripheralEvent::PowerStateChanged(RadioPowerState::Unavailable));
            }
        }
        Ok(())
    }

    async fn execute_central(&mut self, command: CentralCommand) -> nearcast_runtime::Result<()> {
        Ok(self.central.execute(command).await?)
    }
}
