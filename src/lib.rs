//! Rust library for controlling lights and shades through a HomeWorks lighting bridge
//!
//! The bridge speaks a line based text protocol over TCP. Commands are
//! fire-and-forget: the bridge never answers a command directly, it only
//! pushes `DL` level reports for whatever changed. This crate keeps one
//! session open, records those reports, and pairs each command with the
//! report that answers it using the address, the level and the time the
//! command was issued.
//!
//! It supports:
//!
//! - Setting dimmer levels with a fade (`fadedim`)
//! - Setting shade positions
//! - Reading dimmer levels (`rdl`), optionally answered from the last report
//! - Transparent reconnect when a write finds the session dropped
//! - Subscribing to every level report
//!
//! # Quick Start
//!
//! ```no_run
//! use homeworks_bridge::{Address, BridgeClient, BridgeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = BridgeClient::connect(BridgeConfig::new("192.168.1.50", 23, "admin", "secret")).await?;
//!
//!     let hall: Address = "1.4.2".parse()?;
//!     client.set_light(&hall, 40).await?;
//!
//!     let level = client.get_light(&hall).await?;
//!     println!("Hall is at {}%", level.brightness());
//!
//!     let blinds: Address = "[01:06:01]".parse()?;
//!     client.set_shade(&blinds, 0).await?;
//!
//!     // Watch level reports as they arrive
//!     let mut reports = client.subscribe();
//!     while let Ok(report) = reports.recv().await {
//!         println!("{} -> {}", report.address(), report.brightness());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Retention and query strategy
//!
//! How many reports are kept and whether reads may be answered from them are
//! configuration, see [`RetentionPolicy`] and [`QueryStrategy`]. The defaults
//! keep the latest 200 reports and always ask the bridge.
//!
//! # Architecture
//!
//! - **Client**: command API (`set_light`, `get_light`, `set_shade`)
//! - **Correlator**: waits for the report answering a command, or times out
//! - **Session**: owns the connection, reconnects on write failure
//! - **Connection**: TCP socket, login, background read task
//! - **Protocol**: command encoding, line framing, `DL` parsing
//! - **Notification log**: shared, bounded record of level reports

mod client;
mod config;
mod connection;
mod correlator;
mod error;
mod notification_log;
mod protocol;
mod session;
mod subscription;
mod types;

// Public exports
pub use client::BridgeClient;
pub use config::{BridgeConfig, QueryStrategy, RetentionPolicy, DEFAULT_PORT};
pub use correlator::{Correlator, PendingRequest, RequestState};
pub use error::{BridgeError, Result};
pub use notification_log::NotificationLog;
pub use protocol::{parse_line, Command, LineReader};
pub use session::Session;
pub use subscription::NotificationReceiver;
pub use types::{Address, Notification, MAX_LEVEL};
