//! Discovery service task
//!
//! The service is the only execution context that touches the controller.
//! Caller inputs, radio events and timeout ticks are multiplexed onto one
//! task, and every effect a transition emits is flushed to the driver before
//! the next input is taken.

use nearcast_core::{
    DiscoveryConfig, DiscoveryController, DiscoverySnapshot, Effect, Identity, RadioEvent,
    RadioNotification, ResultCallback,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::driver::{RadioDriver, RadioEventSender};
use crate::error::Result;
use crate::handle::DiscoveryHandle;

/// Capacity of the radio availability broadcast
const NOTIFICATION_CAPACITY: usize = 16;

// ----------------------------------------------------------------------------
// Service Inputs
// ----------------------------------------------------------------------------

pub(crate) enum Input {
    StartAdvertising(Identity),
    StopAdvertising,
    StartDiscovering(ResultCallback),
    StopDiscovering,
    AppBackgrounded,
    AppForegrounded,
    DisconnectPeer { stop_advertising: bool },
    Snapshot(oneshot::Sender<DiscoverySnapshot>),
    Shutdown(oneshot::Sender<()>),
}

impl std::fmt::Debug for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Input::StartAdvertising(identity) => write!(f, "StartAdvertising({identity})"),
            Input::StopAdvertising => f.write_str("StopAdvertising"),
            Input::StartDiscovering(_) => f.write_str("StartDiscovering"),
            Input::StopDiscovering => f.write_str("StopDiscovering"),
            Input::AppBackgrounded => f.write_str("AppBackgrounded"),
            Input::AppForegrounded => f.write_str("AppForegrounded"),
            Input::DisconnectPeer { stop_advertising } => {
                write!(f, "DisconnectPeer {{ stop_advertising: {stop_advertising} }}")
            }
            Input::Snapshot(_) => f.write_str("Snapshot"),
            Input::Shutdown(_) => f.write_str("Shutdown"),
        }
    }
}

// ----------------------------------------------------------------------------
// Discovery Service
// ----------------------------------------------------------------------------

/// Task owning a [`DiscoveryController`] and its radio driver
pub struct DiscoveryService {
    controller: DiscoveryController,
    driver: Box<dyn RadioDriver>,
    inputs: mpsc::UnboundedReceiver<Input>,
    radio_events: mpsc::UnboundedReceiver<RadioEvent>,
    notifications: broadcast::Sender<RadioNotification>,
}

impl DiscoveryService {
    /// Validate `config`, attach `driver` and start the service task
    pub fn spawn<D>(config: DiscoveryConfig, driver: D) -> Result<(DiscoveryHandle, JoinHandle<()>)>
    where
        D: RadioDriver + 'static,
    {
        let (handle, service) = Self::new(config, Box::new(driver))?;
        let task = tokio::spawn(service.run());
        Ok((handle, task))
    }

    fn new(config: DiscoveryConfig, mut driver: Box<dyn RadioDriver>) -> Result<(DiscoveryHandle, Self)> {
        let controller = DiscoveryController::new(config)?;

        let (events_tx, radio_events) = RadioEventSender::channel();
        driver.attach(events_tx)?;

        let (inputs_tx, inputs) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let handle = DiscoveryHandle::new(inputs_tx, notifications.clone());

        Ok((
            handle,
            Self {
                controller,
                driver,
                inputs,
                radio_events,
                notifications,
            },
        ))
    }

    /// Run until shut down or until every handle is dropped
    pub async fn run(mut self) {
        info!(
            "Discovery service starting for {}",
            self.controller.config().service_id
        );

        let mut ticker = time::interval(self.controller.config().tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let shutdown_ack = loop {
            tokio::select! {
                input = self.inputs.recv() => match input {
                    Some(Input::Shutdown(ack)) => break Some(ack),
                    Some(input) => self.apply(input),
                    None => {
                        info!("All discovery handles dropped");
                        break None;
                    }
                },
                Some(event) = self.radio_events.recv() => {
                    self.controller.handle_event(event);
                }
                _ = ticker.tick() => {
                    self.controller.tick(time::Instant::now().into_std());
                }
            }
            self.flush().await;
        };

        self.controller.shutdown();
        self.flush().await;
        if let Err(e) = self.driver.shutdown().await {
            warn!("Radio driver shutdown failed: {}", e);
        }
        info!("Discovery service stopped");

        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    fn apply(&mut self, input: Input) {
        debug!("Applying {:?}", input);
        match input {
            Input::StartAdvertising(identity) => self.controller.start_advertising(identity),
            Input::StopAdvertising => self.controller.stop_advertising(),
            Input::StartDiscovering(on_result) => self.controller.start_discovering(on_result),
            Input::StopDiscovering => self.controller.stop_discovering(),
            Input::AppBackgrounded => self.controller.app_backgrounded(),
            Input::AppForegrounded => self.controller.app_foregrounded(),
            Input::DisconnectPeer { stop_advertising } => {
                self.controller.disconnect_peer(stop_advertising)
            }
            Input::Snapshot(reply) => {
                let _ = reply.send(self.controller.snapshot());
            }
            // handled by the run loop
            Input::Shutdown(_) => {}
        }
    }

    /// Hand every pending effect to the driver or the notification channel
    async fn flush(&mut self) {
        for effect in self.controller.drain_effects() {
            let outcome = match effect {
                Effect::Peripheral(command) => self.driver.execute_peripheral(command).await,
                Effect::Central(command) => self.driver.execute_central(command).await,
                Effect::Notify(notification) => {
                    debug!("Publishing {:?}", notification);
                    // no subscribers is fine
                    let _ = self.notifications.send(notification);
                    Ok(())
                }
            };
            if let Err(e) = outcome {
                warn!("Radio command failed: {}", e);
            }
        }
    }
}
