use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::time::Instant;

/// Highest level accepted by `fadedim`
pub const MAX_LEVEL: u8 = 100;

/// Canonical bridge address such as `1.4.2`
///
/// The bridge reports addresses as bracketed, colon separated two digit
/// groups (`[01:04:02]`). Both that form and the dotted form accepted by
/// commands parse to the same `Address`, so a caller's address compares equal
/// to the one found in a notification.
///
/// ```
/// use homeworks_bridge::Address;
///
/// let from_wire: Address = "[01:04:02]".parse().unwrap();
/// let from_caller: Address = "1.4.2".parse().unwrap();
/// assert_eq!(from_wire, from_caller);
/// assert_eq!(from_wire.to_string(), "1.4.2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and normalise an address
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(trimmed);

        if inner.is_empty() {
            return Err(BridgeError::InvalidAddress(text.to_string()));
        }

        let mut groups = Vec::new();
        for group in inner.split([':', '.']) {
            let group = group.trim();
            if group.is_empty() || !group.bytes().all(|b| b.is_ascii_digit()) {
                return Err(BridgeError::InvalidAddress(text.to_string()));
            }
            let value: u32 = group
                .parse()
                .map_err(|_| BridgeError::InvalidAddress(text.to_string()))?;
            groups.push(value.to_string());
        }

        Ok(Self(groups.join(".")))
    }

    /// The dotted form used on the wire in commands
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = BridgeError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Address {
    type Error = BridgeError;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// A dimmer level report pushed by the bridge
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    address: Address,
    brightness: f64,
    observed_at: Instant,
}

impl Notification {
    /// Create a notification; `brightness` must be finite
    pub fn new(address: Address, brightness: f64, observed_at: Instant) -> Result<Self> {
        if !brightness.is_finite() {
            return Err(BridgeError::MalformedNotification(format!(
                "non-finite brightness for {}",
                address
            )));
        }
        Ok(Self {
            address,
            brightness,
            observed_at,
        })
    }

    /// Address the report is for
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Reported level, 0-100
    pub fn brightness(&self) -> f64 {
        self.brightness
    }

    /// When the report was read off the socket
    pub fn observed_at(&self) -> Instant {
        self.observed_at
    }

    /// Whether the reported level equals `level`
    pub fn has_brightness(&self, level: f64) -> bool {
        (self.brightness - level).abs() < f64::EPSILON
    }
}

/// Check a caller supplied percentage
pub(crate) fn validate_level(level: u8) -> Result<u8> {
    if level > MAX_LEVEL {
        return Err(BridgeError::InvalidLevel(level));
    }
    Ok(level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_normalises_wire_form() {
        let address = Address::parse("[01:04:02]").unwrap();
        assert_eq!(address.as_str(), "1.4.2");
    }

    #[test]
    fn address_accepts_dotted_and_bare_colon_forms() {
        assert_eq!(Address::parse("1.4.2").unwrap().as_str(), "1.4.2");
        assert_eq!(Address::parse("01:10:00:02").unwrap().as_str(), "1.10.0.2");
        assert_eq!(Address::parse(" [ 01 : 04 ] ").unwrap().as_str(), "1.4");
    }

    #[test]
    fn address_rejects_garbage() {
        for bad in ["", "[]", "1..2", "a.b", "[01:x4]", "1.4.", "[01:04"] {
            assert!(
                matches!(Address::parse(bad), Err(BridgeError::InvalidAddress(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn address_serde_uses_string_form() {
        let address: Address = serde_json::from_str("\"[02:01:03]\"").unwrap();
        assert_eq!(address.as_str(), "2.1.3");
        assert_eq!(serde_json::to_string(&address).unwrap(), "\"2.1.3\"");
        assert!(serde_json::from_str::<Address>("\"nope\"").is_err());
    }

    #[test]
    fn notification_rejects_non_finite_levels() {
        let address = Address::parse("1.1.1").unwrap();
        let now = Instant::now();
        assert!(Notification::new(address.clone(), f64::NAN, now).is_err());
        assert!(Notification::new(address.clone(), f64::INFINITY, now).is_err());

        let ok = Notification::new(address, 42.0, now).unwrap();
        assert!(ok.has_brightness(42.0));
        assert!(!ok.has_brightness(43.0));
    }

    #[test]
    fn level_validation() {
        assert_eq!(validate_level(0).unwrap(), 0);
        assert_eq!(validate_level(100).unwrap(), 100);
        assert!(matches!(validate_level(101), Err(BridgeError::InvalidLevel(101))));
    }
}
