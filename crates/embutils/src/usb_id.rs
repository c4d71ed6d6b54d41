//! USB vendor/product identifiers.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A USB VID/PID pair packed as `vid << 16 | pid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UsbId(u32);

impl UsbId {
    /// Create an identifier from its vendor and product ids.
    #[must_use]
    pub const fn new(vid: u16, pid: u16) -> Self {
        Self(((vid as u32) << 16) | pid as u32)
    }

    /// Create an identifier from its packed value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Vendor id.
    #[must_use]
    pub const fn vid(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Product id.
    #[must_use]
    pub const fn pid(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Packed value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)([0-9a-f]{4}):([0-9a-f]{4})").expect("Invalid regex pattern")
    })
}

impl FromStr for UsbId {
    type Err = Error;

    /// Finds the first `VVVV:PPPP` group in `s`, so full descriptions such as
    /// `USB VID:PID=0483:5740 SER=123` are accepted.
    fn from_str(s: &str) -> Result<Self> {
        let caps = pattern()
            .captures(s)
            .ok_or_else(|| Error::invalid_value(s, "no USB VID:PID found"))?;
        let vid = u16::from_str_radix(&caps[1], 16)
            .map_err(|e| Error::invalid_value(s, e.to_string()))?;
        let pid = u16::from_str_radix(&caps[2], 16)
            .map_err(|e| Error::invalid_value(s, e.to_string()))?;
        Ok(Self::new(vid, pid))
    }
}

impl fmt::Display for UsbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VID:PID={:04X}:{:04X}", self.vid(), self.pid())
    }
}

impl From<u32> for UsbId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<UsbId> for u32 {
    fn from(id: UsbId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let id = UsbId::new(0x0483, 0x5740);
        assert_eq!(id.vid(), 0x0483);
        assert_eq!(id.pid(), 0x5740);
        assert_eq!(id.raw(), 0x0483_5740);
        assert_eq!(UsbId::from_raw(0xDEAD_BEEF).vid(), 0xDEAD);
    }

    #[test]
    fn test_display() {
        assert_eq!(UsbId::new(0x0483, 0x5740).to_string(), "VID:PID=0483:5740");
        assert_eq!(UsbId::new(0xabcd, 0x1).to_string(), "VID:PID=ABCD:0001");
    }

    #[test]
    fn test_parse_from_description() {
        let id: UsbId = "USB VID:PID=10C4:EA60 SER=0001 LOCATION=1-1".parse().unwrap();
        assert_eq!(id, UsbId::new(0x10C4, 0xEA60));

        let id: UsbId = "dead:beef".parse().unwrap();
        assert_eq!(id.raw(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_parse_display_round_trip() {
        let id = UsbId::new(0x2341, 0x0043);
        assert_eq!(id.to_string().parse::<UsbId>().unwrap(), id);
    }

    #[test]
    fn test_parse_invalid() {
        assert!("".parse::<UsbId>().is_err());
        assert!("12:34".parse::<UsbId>().is_err());
        assert!("zzzz:1234".parse::<UsbId>().is_err());
    }
}
