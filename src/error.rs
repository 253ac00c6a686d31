use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur when talking to a lighting bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Could not establish or log in to the TCP session
    #[error("Connection error: {0}")]
    Connection(String),

    /// Writing a command failed, and so did the reconnect-and-resend attempt
    #[error("Write failure: {0}")]
    WriteFailure(String),

    /// No matching notification arrived within the response budget
    #[error("No response from address {address}")]
    NoResponse {
        /// Address the pending request was waiting on
        address: String,
    },

    /// A `DL` line could not be parsed into an address and level
    #[error("Malformed notification: {0}")]
    MalformedNotification(String),

    /// The session has been closed
    #[error("Not connected")]
    NotConnected,

    /// Address text is not a colon or dot separated list of numbers
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Level is outside 0..=100
    #[error("Invalid level {0}, expected 0-100")]
    InvalidLevel(u8),

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel receive error
    #[error("Channel error: {0}")]
    ChannelError(String),
}
