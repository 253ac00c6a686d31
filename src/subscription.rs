use crate::error::{BridgeError, Result};
use crate::types::Notification;
use tokio::sync::broadcast;

/// Receiver for level reports as they arrive from the bridge
///
/// Every parsed `DL` notification is delivered, whether or not a command is
/// waiting on it.
pub struct NotificationReceiver {
    rx: broadcast::Receiver<Notification>,
}

impl NotificationReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<Notification>) -> Self {
        Self { rx }
    }

    /// Receive the next notification
    ///
    /// Fails with `NotConnected` once the session is gone.
    pub async fn recv(&mut self) -> Result<Notification> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => BridgeError::NotConnected,
            broadcast::error::RecvError::Lagged(n) => {
                BridgeError::ChannelError(format!("Lagged by {} notifications", n))
            }
        })
    }

    /// Try to receive a notification without waiting
    ///
    /// Returns `None` if nothing is queued.
    pub fn try_recv(&mut self) -> Result<Option<Notification>> {
        match self.rx.try_recv() {
            Ok(notification) => Ok(Some(notification)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(BridgeError::NotConnected),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Err(BridgeError::ChannelError(
                format!("Lagged by {} notifications", n),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;
    use tokio::time::Instant;

    fn report(level: f64) -> Notification {
        Notification::new(Address::parse("1.2.3").unwrap(), level, Instant::now()).unwrap()
    }

    #[tokio::test]
    async fn delivers_in_order_then_reports_close() {
        let (tx, rx) = broadcast::channel(8);
        let mut receiver = NotificationReceiver::new(rx);

        tx.send(report(1.0)).unwrap();
        tx.send(report(2.0)).unwrap();
        assert_eq!(receiver.recv().await.unwrap().brightness(), 1.0);
        assert_eq!(receiver.try_recv().unwrap().unwrap().brightness(), 2.0);
        assert!(receiver.try_recv().unwrap().is_none());

        drop(tx);
        assert!(matches!(receiver.recv().await, Err(BridgeError::NotConnected)));
    }

    #[tokio::test]
    async fn slow_receiver_sees_lag() {
        let (tx, rx) = broadcast::channel(2);
        let mut receiver = NotificationReceiver::new(rx);
        for level in 0..5 {
            tx.send(report(level as f64)).unwrap();
        }
        assert!(matches!(receiver.try_recv(), Err(BridgeError::ChannelError(_))));
        assert_eq!(receiver.recv().await.unwrap().brightness(), 3.0);
    }
}
