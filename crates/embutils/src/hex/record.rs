//! Single Intel HEX records.

use std::fmt;

use crate::error::{Error, Result};

/// Kind of an Intel HEX record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// `00`: data bytes at an offset.
    Data,
    /// `01`: end of file.
    EndOfFile,
    /// `02`: segment base address (bits 4..20).
    ExtendedSegmentAddress,
    /// `03`: CS:IP start address.
    StartSegmentAddress,
    /// `04`: upper 16 bits of the linear address.
    ExtendedLinearAddress,
    /// `05`: 32-bit EIP start address.
    StartLinearAddress,
}

impl RecordKind {
    /// The record type code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Data => 0x00,
            Self::EndOfFile => 0x01,
            Self::ExtendedSegmentAddress => 0x02,
            Self::StartSegmentAddress => 0x03,
            Self::ExtendedLinearAddress => 0x04,
            Self::StartLinearAddress => 0x05,
        }
    }

    /// Kind for a type code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => Self::Data,
            0x01 => Self::EndOfFile,
            0x02 => Self::ExtendedSegmentAddress,
            0x03 => Self::StartSegmentAddress,
            0x04 => Self::ExtendedLinearAddress,
            0x05 => Self::StartLinearAddress,
            _ => return None,
        })
    }

    /// Payload size required by the kind, if fixed.
    fn fixed_len(self) -> Option<usize> {
        match self {
            Self::Data => None,
            Self::EndOfFile => Some(0),
            Self::ExtendedSegmentAddress | Self::ExtendedLinearAddress => Some(2),
            Self::StartSegmentAddress | Self::StartLinearAddress => Some(4),
        }
    }
}

/// One line of an Intel HEX file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Record kind.
    pub kind: RecordKind,
    /// 16-bit address field.
    pub address: u16,
    /// Payload, at most 255 bytes.
    pub data: Vec<u8>,
}

impl Record {
    /// A data record.
    #[must_use]
    pub fn data(address: u16, data: Vec<u8>) -> Self {
        Self {
            kind: RecordKind::Data,
            address,
            data,
        }
    }

    /// The end-of-file record.
    #[must_use]
    pub fn end_of_file() -> Self {
        Self {
            kind: RecordKind::EndOfFile,
            address: 0,
            data: Vec::new(),
        }
    }

    /// An extended linear address record for the upper 16 address bits.
    #[must_use]
    pub fn extended_linear(upper: u16) -> Self {
        Self {
            kind: RecordKind::ExtendedLinearAddress,
            address: 0,
            data: upper.to_be_bytes().to_vec(),
        }
    }

    /// A start address record.
    #[must_use]
    pub fn start(start: StartAddress) -> Self {
        let (kind, value) = match start {
            StartAddress::Segment { cs, ip } => (
                RecordKind::StartSegmentAddress,
                (u32::from(cs) << 16) | u32::from(ip),
            ),
            StartAddress::Linear(eip) => (RecordKind::StartLinearAddress, eip),
        };
        Self {
            kind,
            address: 0,
            data: value.to_be_bytes().to_vec(),
        }
    }

    /// Parse one line (`:LLAAAATT...CC`). `line` is used in error messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is malformed, the length field disagrees
    /// with the payload, the checksum is wrong or the kind is unknown.
    pub fn parse(text: &str, line: usize) -> Result<Self> {
        let text = text.trim();
        let body = text
            .strip_prefix(':')
            .ok_or_else(|| Error::hex_parse(line, "record does not start with ':'"))?;
        let bytes =
            hex::decode(body).map_err(|e| Error::hex_parse(line, format!("bad hex digits: {e}")))?;
        if bytes.len() < 5 {
            return Err(Error::hex_parse(line, "record too short"));
        }

        let len = usize::from(bytes[0]);
        if bytes.len() != len + 5 {
            return Err(Error::hex_parse(
                line,
                format!("length field {len} does not match {} data bytes", bytes.len() - 5),
            ));
        }
        if checksum(&bytes[..bytes.len() - 1]) != bytes[bytes.len() - 1] {
            return Err(Error::hex_parse(line, "checksum mismatch"));
        }

        let kind = RecordKind::from_code(bytes[3])
            .ok_or_else(|| Error::hex_parse(line, format!("unknown record type {:02X}", bytes[3])))?;
        let data = bytes[4..4 + len].to_vec();
        if let Some(expected) = kind.fixed_len() {
            if data.len() != expected {
                return Err(Error::hex_parse(
                    line,
                    format!("{kind:?} record needs {expected} data bytes"),
                ));
            }
        }

        Ok(Self {
            kind,
            address: u16::from_be_bytes([bytes[1], bytes[2]]),
            data,
        })
    }

    /// Payload interpreted as a big-endian number (address records).
    #[must_use]
    pub fn value(&self) -> u32 {
        self.data
            .iter()
            .take(4)
            .fold(0, |acc, byte| (acc << 8) | u32::from(*byte))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Lengths above 255 are rejected by the writer before formatting.
        let len = u8::try_from(self.data.len()).map_err(|_| fmt::Error)?;
        let mut bytes = Vec::with_capacity(self.data.len() + 5);
        bytes.push(len);
        bytes.extend_from_slice(&self.address.to_be_bytes());
        bytes.push(self.kind.code());
        bytes.extend_from_slice(&self.data);
        bytes.push(checksum(&bytes));
        write!(f, ":{}", hex::encode_upper(bytes))
    }
}

/// Execution start address stored in a HEX file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAddress {
    /// 80x86 CS:IP pair.
    Segment {
        /// Code segment.
        cs: u16,
        /// Instruction pointer.
        ip: u16,
    },
    /// 32-bit linear address.
    Linear(u32),
}

/// Two's complement of the byte sum.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |acc, byte| acc.wrapping_add(*byte))
        .wrapping_neg()
}
