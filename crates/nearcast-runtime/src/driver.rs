//! Radio driver interface
//!
//! A driver executes role commands against a concrete radio stack and
//! reports every outcome back as a [`RadioEvent`]. Commands are
//! fire-and-forget: `execute_*` returns once the command has been handed to
//! the stack, never after waiting for its completion.

use async_trait::async_trait;
use nearcast_core::{CentralCommand, PeripheralCommand, RadioEvent};
use tokio::sync::mpsc;

use crate::error::Result;

/// Channel end a driver uses to report radio events
#[derive(Debug, Clone)]
pub struct RadioEventSender {
    inner: mpsc::UnboundedSender<RadioEvent>,
}

impl RadioEventSender {
    pub(crate) fn new(inner: mpsc::UnboundedSender<RadioEvent>) -> Self {
        Self { inner }
    }

    /// Create a sender and the matching receiver
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RadioEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Report an event; returns false once the service has stopped
    pub fn send(&self, event: impl Into<RadioEvent>) -> bool {
        self.inner.send(event.into()).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Executes role commands against a radio stack
#[async_trait]
pub trait RadioDriver: Send {
    /// Bind the event channel; called once before any command
    fn attach(&mut self, events: RadioEventSender) -> Result<()>;

    async fn execute_peripheral(&mut self, command: PeripheralCommand) -> Result<()>;

    async fn execute_central(&mut self, command: CentralCommand) -> Result<()>;

    /// Release anything still held once the service stops
    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}
