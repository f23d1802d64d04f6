//! Caller-facing handle to a running discovery service

use nearcast_core::{DiscoverySnapshot, Identity, RadioNotification};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::{Result, RuntimeError};
use crate::service::Input;

/// Cloneable handle to a [`DiscoveryService`](crate::DiscoveryService).
///
/// Operations enqueue an input and return immediately; they never wait for
/// the radio. Only [`snapshot`](Self::snapshot) and
/// [`shutdown`](Self::shutdown) await a reply from the service task.
#[derive(Debug, Clone)]
pub struct DiscoveryHandle {
    inputs: mpsc::UnboundedSender<Input>,
    notifications: broadcast::Sender<RadioNotification>,
}

impl DiscoveryHandle {
    pub(crate) fn new(
        inputs: mpsc::UnboundedSender<Input>,
        notifications: broadcast::Sender<RadioNotification>,
    ) -> Self {
        Self {
            inputs,
            notifications,
        }
    }

    fn send(&self, input: Input) -> Result<()> {
        self.inputs
            .send(input)
            .map_err(|_| RuntimeError::ServiceStopped)
    }

    /// Advertise `identity` to nearby scanners.
    ///
    /// The identity is validated here, so an empty or oversized value is
    /// rejected before anything reaches the radio.
    pub fn start_advertising(&self, identity: impl Into<String>) -> Result<()> {
        let identity = Identity::new(identity)?;
        self.send(Input::StartAdvertising(identity))
    }

    pub fn stop_advertising(&self) -> Result<()> {
        self.send(Input::StopAdvertising)
    }

    /// Discover peers; `on_result` runs on the service task for every identity read
    pub fn start_discovering<F>(&self, on_result: F) -> Result<()>
    where
        F: FnMut(String) + Send + 'static,
    {
        self.send(Input::StartDiscovering(Box::new(on_result)))
    }

    pub fn stop_discovering(&self) -> Result<()> {
        self.send(Input::StopDiscovering)
    }

    pub fn app_backgrounded(&self) -> Result<()> {
        self.send(Input::AppBackgrounded)
    }

    pub fn app_foregrounded(&self) -> Result<()> {
        self.send(Input::AppForegrounded)
    }

    pub fn disconnect_peer(&self, stop_advertising: bool) -> Result<()> {
        self.send(Input::DisconnectPeer { stop_advertising })
    }

    /// Receive radio availability notifications
    pub fn subscribe(&self) -> broadcast::Receiver<RadioNotification> {
        self.notifications.subscribe()
    }

    /// Current controller state, observed on the service task
    pub async fn snapshot(&self) -> Result<DiscoverySnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Input::Snapshot(tx))?;
        rx.await.map_err(|_| RuntimeError::ServiceStopped)
    }

    /// Tear both roles down and stop the service task
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Input::Shutdown(tx))?;
        rx.await.map_err(|_| RuntimeError::ServiceStopped)
    }

    pub fn is_running(&self) -> bool {
        !self.inputs.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearcast_core::DiscoveryError;

    fn handle() -> (DiscoveryHandle, mpsc::UnboundedReceiver<Input>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(4);
        (DiscoveryHandle::new(tx, notifications), rx)
    }

    #[test]
    fn test_empty_identity_never_reaches_service() {
        let (handle, mut rx) = handle();
        let err = handle.start_advertising("").unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Discovery(DiscoveryError::EmptyIdentity)
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_operations_enqueue_without_waiting() {
        let (handle, mut rx) = handle();
        handle.start_advertising("alice").unwrap();
        handle.start_discovering(|_| {}).unwrap();
        handle.disconnect_peer(true).unwrap();

        assert!(matches!(rx.try_recv(), Ok(Input::StartAdvertising(_))));
        assert!(matches!(rx.try_recv(), Ok(Input::StartDiscovering(_))));
        assert!(matches!(
            rx.try_recv(),
            Ok(Input::DisconnectPeer {
                stop_advertising: true
            })
        ));
    }

    #[test]
    fn test_send_after_service_stopped() {
        let (handle, rx) = handle();
        drop(rx);
        assert!(!handle.is_running());
        assert!(matches!(
            handle.stop_discovering(),
            Err(RuntimeError::ServiceStopped)
        ));
    }

    #[tokio::test]
    async fn test_snapshot_fails_when_service_gone() {
        let (handle, rx) = handle();
        drop(rx);
        assert!(matches!(
            handle.snapshot().await,
            Err(RuntimeError::ServiceStopped)
        ));
    }
}
