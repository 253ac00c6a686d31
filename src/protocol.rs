use crate::error::{BridgeError, Result};
use crate::types::{Address, Notification};
use std::fmt;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tokio::time::Instant;

/// Tag of dimmer level reports
const DIMMER_LEVEL_TAG: &str = "DL";

/// Bridge-to-client line separator
const LINE_SEPARATOR: &str = "\r\n";

/// Console prompt the bridge may print in front of a report
const PROMPT_MARKER: &str = "> ";

/// Longest inbound line kept, excluding the terminator
const MAX_LINE_LENGTH: usize = 4096;

/// Client-to-bridge commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// First frame of a session
    Login { username: String, password: String },
    /// Fade a dimmer or shade to `level` percent
    FadeDim {
        level: u8,
        fade_seconds: u32,
        delay_seconds: u32,
        address: Address,
    },
    /// Ask the bridge to report a dimmer level
    ReadDimLevel { address: Address },
}

impl Command {
    /// Wire form, newline terminated
    pub fn encode(&self) -> String {
        match self {
            Command::Login { username, password } => format!("{},{}\n", username, password),
            other => format!("{}\n", other),
        }
    }
}

// Login renders without its password
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Login { username, .. } => write!(f, "{},<redacted>", username),
            Command::FadeDim {
                level,
                fade_seconds,
                delay_seconds,
                address,
            } => write!(
                f,
                "fadedim,{},{},{},{}",
                level, fade_seconds, delay_seconds, address
            ),
            Command::ReadDimLevel { address } => write!(f, "rdl,{}", address),
        }
    }
}

/// Reads `\r\n` terminated lines off a buffered stream
///
/// Each complete line is decoded on its own, so a multi-byte character split
/// across TCP reads survives. Lines longer than 4 KiB are discarded.
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    /// Wrap a buffered reader, e.g. a `BufReader` around the socket's read half
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Next non-empty line without its terminator, `None` at end of stream
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            self.buf.clear();
            let limit = (MAX_LINE_LENGTH + LINE_SEPARATOR.len()) as u64;
            let n = (&mut self.reader)
                .take(limit)
                .read_until(b'\n', &mut self.buf)
                .await?;
            if n == 0 {
                return Ok(None);
            }

            if self.buf.last() != Some(&b'\n') && self.buf.len() as u64 == limit {
                tracing::warn!("Discarding line longer than {} bytes", MAX_LINE_LENGTH);
                self.skip_line().await?;
                continue;
            }

            if let Some(line) = decode_line(&self.buf) {
                return Ok(Some(line));
            }
        }
    }

    async fn skip_line(&mut self) -> io::Result<()> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    self.reader.consume(end + 1);
                    return Ok(());
                }
                None => {
                    let len = available.len();
                    self.reader.consume(len);
                }
            }
        }
    }
}

/// Strip the terminator and decode; blank lines yield `None`
fn decode_line(bytes: &[u8]) -> Option<String> {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    let line = String::from_utf8_lossy(bytes);
    if line.trim().is_empty() {
        None
    } else {
        Some(line.into_owned())
    }
}

/// Parse one inbound line
///
/// Returns `Ok(None)` for lines that are not dimmer level reports and
/// `Err(MalformedNotification)` for `DL` lines that cannot be read.
pub fn parse_line(line: &str, observed_at: Instant) -> Result<Option<Notification>> {
    let line = strip_prompt(line.trim_start());
    if !line.starts_with(DIMMER_LEVEL_TAG) {
        return Ok(None);
    }

    let malformed = || BridgeError::MalformedNotification(line.to_string());

    let (_, rest) = line.split_once('[').ok_or_else(malformed)?;
    let (address_text, tail) = rest.split_once(']').ok_or_else(malformed)?;
    let level_text = tail.trim_start().strip_prefix(',').ok_or_else(malformed)?;

    let address = Address::parse(address_text).map_err(|_| malformed())?;
    let brightness: f64 = level_text.trim().parse().map_err(|_| malformed())?;

    Notification::new(address, brightness, observed_at)
        .map(Some)
        .map_err(|_| malformed())
}

fn strip_prompt(line: &str) -> &str {
    match line.split_once(PROMPT_MARKER) {
        Some((prompt, rest)) if !prompt.is_empty() && prompt.bytes().all(|b| b.is_ascii_alphanumeric()) => {
            rest.trim_start()
        }
        _ => line,
    }
}
