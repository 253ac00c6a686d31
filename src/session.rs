use crate::config::BridgeConfig;
use crate::connection::Connection;
use crate::error::{BridgeError, Result};
use crate::notification_log::NotificationLog;
use crate::protocol::Command;
use crate::subscription::NotificationReceiver;
use crate::types::Notification;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

const NOTIFICATION_CHANNEL_CAPACITY: usize = 100;

/// Session with one bridge
///
/// Holds the live connection and the state that outlives it: the config used
/// to reconnect, the notification log and the subscriber channel. A dropped
/// connection is replaced on the next write.
pub struct Session {
    config: BridgeConfig,
    log: Arc<NotificationLog>,
    notification_tx: broadcast::Sender<Notification>,
    connection: Mutex<Option<Connection>>,
}

impl Session {
    /// Validate `config`, connect and log in
    pub async fn connect(config: BridgeConfig) -> Result<Self> {
        config.validate()?;

        let log = Arc::new(NotificationLog::new(config.retention));
        let (notification_tx, _) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        let connection = Connection::open(&config, log.clone(), notification_tx.clone()).await?;
        tracing::info!("Connected to bridge at {}", connection.peer());

        Ok(Self {
            config,
            log,
            notification_tx,
            connection: Mutex::new(Some(connection)),
        })
    }

    /// Get the config used to connect and reconnect
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Get the shared notification log
    pub fn log(&self) -> Arc<NotificationLog> {
        self.log.clone()
    }

    /// Write a command, reconnecting and resending once if the write fails
    pub async fn send(&self, command: &Command) -> Result<()> {
        let mut connection = self.connection.lock().await;
        let current = connection.as_mut().ok_or(BridgeError::NotConnected)?;

        let first_error = match current.write_command(command).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        tracing::warn!("{}; reconnecting to {}:{}", first_error, self.config.host, self.config.port);

        let mut fresh = Connection::open(&self.config, self.log.clone(), self.notification_tx.clone())
            .await
            .map_err(|e| {
                tracing::error!("Reconnect failed: {}", e);
                BridgeError::WriteFailure(format!("{}; reconnect failed: {}", first_error, e))
            })?;
        tracing::info!("Reconnected to bridge at {}", fresh.peer());

        let result = fresh.write_command(command).await;
        *connection = Some(fresh);
        result
    }

    /// Whether a connection is open and the bridge has not hung up
    pub async fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(Connection::is_alive)
    }

    /// Subscribe to every level report from now on
    pub fn subscribe(&self) -> NotificationReceiver {
        NotificationReceiver::new(self.notification_tx.subscribe())
    }

    /// Close the connection; later sends fail with `NotConnected`
    pub async fn close(&self) {
        if let Some(connection) = self.connection.lock().await.take() {
            tracing::info!("Closing connection to {}", connection.peer());
            connection.shutdown().await;
        }
    }
}
