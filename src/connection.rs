use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::notification_log::NotificationLog;
use crate::protocol::{parse_line, Command, LineReader};
use crate::types::Notification;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpSocket};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

/// One authenticated TCP connection to the bridge
///
/// Owns the write half; a spawned task owns the read half and feeds parsed
/// notifications into the shared log. Dropping the connection stops that task.
pub struct Connection {
    writer: OwnedWriteHalf,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    peer: SocketAddr,
}

impl Connection {
    /// Connect over IPv4 with keep-alive, send the login frame and start reading
    pub async fn open(
        config: &BridgeConfig,
        log: Arc<NotificationLog>,
        notification_tx: broadcast::Sender<Notification>,
    ) -> Result<Self> {
        let peer = resolve_ipv4(&config.host, config.port).await?;
        tracing::info!("Connecting to bridge at {}", peer);

        let socket = TcpSocket::new_v4()
            .map_err(|e| BridgeError::Connection(format!("Failed to create socket: {}", e)))?;
        socket
            .set_keepalive(true)
            .map_err(|e| BridgeError::Connection(format!("Failed to enable keep-alive: {}", e)))?;

        let stream = timeout(config.connect_timeout(), socket.connect(peer))
            .await
            .map_err(|_| BridgeError::Connection(format!("Timed out connecting to {}", peer)))?
            .map_err(|e| BridgeError::Connection(format!("Failed to connect to {}: {}", peer, e)))?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not disable Nagle for {}: {}", peer, e);
        }

        let (read_half, mut writer) = stream.into_split();

        let login = Command::Login {
            username: config.username.clone(),
            password: config.password.clone(),
        };
        writer
            .write_all(login.encode().as_bytes())
            .await
            .map_err(|e| BridgeError::Connection(format!("Failed to send login to {}: {}", peer, e)))?;
        tracing::debug!("Sent login for {}", config.username);

        let alive = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_loop(read_half, log, notification_tx, alive.clone()));

        Ok(Self {
            writer,
            alive,
            reader,
            peer,
        })
    }

    /// Write one command line
    ///
    /// Fails without touching the socket once the read side has seen the
    /// bridge hang up.
    pub async fn write_command(&mut self, command: &Command) -> Result<()> {
        if !self.is_alive() {
            return Err(BridgeError::WriteFailure(format!(
                "connection to {} is closed",
                self.peer
            )));
        }

        tracing::debug!("Sending: {}", command);
        let line = command.encode();
        let result: std::io::Result<()> = async {
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.flush().await
        }
        .await;

        result.map_err(|e| {
            self.alive.store(false, Ordering::SeqCst);
            BridgeError::WriteFailure(format!("write to {} failed: {}", self.peer, e))
        })
    }

    /// Whether the bridge is still believed to be reachable
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Get the bridge's socket address
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Shut down the write side and stop reading
    pub async fn shutdown(mut self) {
        self.alive.store(false, Ordering::SeqCst);
        self.reader.abort();
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!("Error shutting down connection to {}: {}", self.peer, e);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn resolve_ipv4(host: &str, port: u16) -> Result<SocketAddr> {
    let mut addrs = lookup_host((host, port))
        .await
        .map_err(|e| BridgeError::Connection(format!("Failed to resolve {}: {}", host, e)))?;

    addrs
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| BridgeError::Connection(format!("No IPv4 address for {}", host)))
}

/// Read lines off the bridge and record every dimmer level report
async fn read_loop(
    reader: OwnedReadHalf,
    log: Arc<NotificationLog>,
    notification_tx: broadcast::Sender<Notification>,
    alive: Arc<AtomicBool>,
) {
    let mut lines = LineReader::new(BufReader::new(reader));

    loop {
        match lines.next_line().await {
            Ok(None) => {
                tracing::info!("Bridge closed the connection");
                break;
            }
            Ok(Some(line)) => handle_line(&line, &log, &notification_tx),
            Err(e) => {
                tracing::error!("Bridge read error: {}", e);
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
}

fn handle_line(
    line: &str,
    log: &NotificationLog,
    notification_tx: &broadcast::Sender<Notification>,
) {
    match parse_line(line, Instant::now()) {
        Ok(Some(notification)) => {
            tracing::debug!(
                address = %notification.address(),
                brightness = notification.brightness(),
                "Received level report"
            );
            log.append(notification.clone());
            let _ = notification_tx.send(notification);
        }
        Ok(None) => {
            tracing::trace!("Ignoring line: {}", line);
        }
        Err(e) => {
            tracing::warn!("Dropping line: {}", e);
        }
    }
}
