//! MAC addresses.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MAC_MASK: u64 = 0xFFFF_FFFF_FFFF;

/// Byte order used when converting addresses to and from bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// Least significant byte first.
    #[default]
    Little,
    /// Most significant byte first.
    Big,
}

/// A 48-bit MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct MacAddress(u64);

impl MacAddress {
    /// Create an address from the low 48 bits of `value`.
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self(value & MAC_MASK)
    }

    /// Create an address from the first six bytes of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than six bytes are given.
    pub fn from_bytes(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        let Some(bytes) = bytes.get(..6) else {
            return Err(Error::invalid_value(
                hex::encode(bytes),
                "a MAC address needs 6 bytes",
            ));
        };
        let fold = |acc: u64, byte: &u8| (acc << 8) | u64::from(*byte);
        let value = match order {
            ByteOrder::Big => bytes.iter().fold(0, fold),
            ByteOrder::Little => bytes.iter().rev().fold(0, fold),
        };
        Ok(Self(value))
    }

    /// Numeric value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The six address bytes in `order`.
    #[must_use]
    pub fn to_bytes(self, order: ByteOrder) -> [u8; 6] {
        let be = self.0.to_be_bytes();
        let mut out = [0u8; 6];
        out.copy_from_slice(&be[2..]);
        if order == ByteOrder::Little {
            out.reverse();
        }
        out
    }
}

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(?:[0-9a-f]{2}:){5}[0-9a-f]{2}$").expect("Invalid regex pattern")
    })
}

impl FromStr for MacAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if !pattern().is_match(s) {
            return Err(Error::invalid_value(s, "not a MAC address"));
        }
        let value = u64::from_str_radix(&s.replace(':', ""), 16)
            .map_err(|e| Error::invalid_value(s, e.to_string()))?;
        Ok(Self(value))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_bytes(ByteOrder::Big);
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]
        )
    }
}

impl Serialize for MacAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
