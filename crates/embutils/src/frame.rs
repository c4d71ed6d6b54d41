//! Example packet layout for serial streams.
//!
//! Layout on the wire, before stream framing:
//!
//! | source | destination | length | payload | crc (LE) |
//! |--------|-------------|--------|---------|----------|
//! | u8     | u8          | u8     | length  | u16      |
//!
//! The CRC is CRC-16/CCITT-FALSE over every byte before it.

use std::fmt;
use std::sync::OnceLock;

use crate::codec::Serialized;
use crate::crc::{Crc, CrcPreset};
use crate::error::{Error, Result};

/// Largest payload a frame can carry.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Bytes a frame adds around its payload.
pub const FRAME_OVERHEAD: usize = 5;

fn frame_crc(data: &[u8]) -> u16 {
    static CRC: OnceLock<Crc> = OnceLock::new();
    let value = CRC
        .get_or_init(|| Crc::from(CrcPreset::Crc16CcittFalse))
        .compute(data);
    // The model width is 16 bits, so the value always fits.
    (value & 0xFFFF) as u16
}

/// Source, destination and payload protected by a CRC-16.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SimpleFrame {
    source: u8,
    destination: u8,
    payload: Vec<u8>,
}

impl SimpleFrame {
    /// Create a frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadTooLarge`] when the payload exceeds 255 bytes.
    pub fn new(source: u8, destination: u8, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        Ok(Self {
            source,
            destination,
            payload,
        })
    }

    /// Source node.
    #[must_use]
    pub fn source(&self) -> u8 {
        self.source
    }

    /// Destination node.
    #[must_use]
    pub fn destination(&self) -> u8 {
        self.destination
    }

    /// Payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload length.
    #[must_use]
    pub fn length(&self) -> u8 {
        // Bounded by the constructor.
        self.payload.len() as u8
    }

    /// CRC over the header and payload.
    #[must_use]
    pub fn crc(&self) -> u16 {
        frame_crc(&self.core())
    }

    fn core(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.payload.len() + FRAME_OVERHEAD);
        data.extend_from_slice(&[self.source, self.destination, self.length()]);
        data.extend_from_slice(&self.payload);
        data
    }
}

impl Serialized for SimpleFrame {
    fn serialize(&self) -> Vec<u8> {
        let mut data = self.core();
        let crc = frame_crc(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        data
    }

    fn deserialize(data: &[u8]) -> Option<Self> {
        if data.len() < FRAME_OVERHEAD {
            return None;
        }
        let (core, crc) = data.split_at(data.len() - 2);
        if frame_crc(core) != u16::from_le_bytes([crc[0], crc[1]]) {
            return None;
        }
        if usize::from(core[2]) != core.len() - 3 {
            return None;
        }
        Some(Self {
            source: core[0],
            destination: core[1],
            payload: core[3..].to_vec(),
        })
    }
}

impl fmt::Debug for SimpleFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SimpleFrame(raw=0x{})", hex::encode(self.serialize()))
    }
}
