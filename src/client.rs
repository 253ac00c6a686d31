use crate::config::{BridgeConfig, QueryStrategy};
use crate::correlator::{Correlator, PendingRequest};
use crate::error::Result;
use crate::protocol::Command;
use crate::session::Session;
use crate::subscription::NotificationReceiver;
use crate::types::{validate_level, Address, Notification};
use std::sync::Arc;

/// Client for a HomeWorks lighting bridge
///
/// Each command writes one line to the bridge and then waits for the level
/// report that answers it. The returned `Notification` is that report.
#[derive(Clone)]
pub struct BridgeClient {
    session: Arc<Session>,
    correlator: Correlator,
}

impl BridgeClient {
    /// Connect to the bridge described by `config` and log in
    ///
    /// Completes once the socket is open and the login line is written; the
    /// bridge does not acknowledge logins.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use homeworks_bridge::{Address, BridgeClient, BridgeConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let config = BridgeConfig::new("192.168.1.50", 23, "admin", "secret");
    ///     let client = BridgeClient::connect(config).await?;
    ///
    ///     let kitchen: Address = "[01:04:02]".parse()?;
    ///     let report = client.set_light(&kitchen, 75).await?;
    ///     println!("{} is at {}%", report.address(), report.brightness());
    ///
    ///     client.close().await;
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(config: BridgeConfig) -> Result<Self> {
        let session = Session::connect(config).await?;
        let correlator = Correlator::new(
            session.log(),
            session.config().poll_interval(),
            session.config().response_timeout(),
        );

        Ok(Self {
            session: Arc::new(session),
            correlator,
        })
    }

    /// Get the session configuration
    pub fn config(&self) -> &BridgeConfig {
        self.session.config()
    }

    /// Fade a light to `brightness` percent and wait for the bridge to report it
    pub async fn set_light(&self, address: &Address, brightness: u8) -> Result<Notification> {
        let brightness = validate_level(brightness)?;
        tracing::info!("Setting light {} to {}%", address, brightness);

        let command = Command::FadeDim {
            level: brightness,
            fade_seconds: self.config().light_fade_seconds,
            delay_seconds: self.config().light_delay_seconds,
            address: address.clone(),
        };
        self.execute(command, address, Some(f64::from(brightness))).await
    }

    /// Read the current level of a light
    ///
    /// With `QueryStrategy::CacheFirst` a level already in the log is returned
    /// without contacting the bridge.
    pub async fn get_light(&self, address: &Address) -> Result<Notification> {
        if self.config().query_strategy == QueryStrategy::CacheFirst {
            if let Some(cached) = self.correlator.cached(address) {
                tracing::debug!("Answering read for {} from cache", address);
                return Ok(cached);
            }
        }

        tracing::info!("Reading brightness for {}", address);
        let command = Command::ReadDimLevel {
            address: address.clone(),
        };
        self.execute(command, address, None).await
    }

    /// Move a shade to `level` percent, with no fade or delay
    pub async fn set_shade(&self, address: &Address, level: u8) -> Result<Notification> {
        let level = validate_level(level)?;
        tracing::info!("Setting shade {} to {}%", address, level);

        let command = Command::FadeDim {
            level,
            fade_seconds: 0,
            delay_seconds: 0,
            address: address.clone(),
        };
        self.execute(command, address, Some(f64::from(level))).await
    }

    /// Latest level seen for `address`, without sending anything
    pub fn cached_level(&self, address: &Address) -> Option<Notification> {
        self.correlator.cached(address)
    }

    /// Subscribe to every level report the bridge sends
    pub fn subscribe(&self) -> NotificationReceiver {
        self.session.subscribe()
    }

    /// Whether the session is open and the bridge has not hung up
    pub async fn is_connected(&self) -> bool {
        self.session.is_connected().await
    }

    /// Close the session; pending commands run into their timeout
    pub async fn close(&self) {
        self.session.close().await;
    }

    async fn execute(
        &self,
        command: Command,
        address: &Address,
        expected_brightness: Option<f64>,
    ) -> Result<Notification> {
        let mut request = PendingRequest::issue(address.clone(), expected_brightness);
        self.session.send(&command).await?;
        self.correlator.await_match(&mut request).await
    }
}
