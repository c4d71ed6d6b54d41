//! Intel HEX firmware images.
//!
//! [`IntelHex`] keeps a sparse byte map of the image, so gaps between
//! sections cost nothing and images can be merged byte by byte. The
//! [`files`] module offers the file level conversions used by the CLI.

pub mod files;
mod record;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

pub use record::{checksum, Record, RecordKind, StartAddress};

/// Default number of data bytes per record when writing.
pub const DEFAULT_RECORD_BYTES: u8 = 32;

/// Default limit on the size of a flattened image (64 MiB).
pub const DEFAULT_MAX_BIN_BYTES: u64 = 0x0400_0000;

/// Padding runs are hashed from this many fill bytes at a time.
const DIGEST_FILL_BYTES: usize = 4096;

/// What to do when a merge finds data on both sides of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overlap {
    /// Fail with [`Error::HexOverlap`].
    Error,
    /// Keep the existing byte.
    Ignore,
    /// Take the incoming byte.
    #[default]
    Replace,
}

/// A sparse firmware image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntelHex {
    data: BTreeMap<u32, u8>,
    start: Option<StartAddress>,
}

impl IntelHex {
    /// An empty image.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An image holding `data` at `offset`.
    #[must_use]
    pub fn from_bin(data: &[u8], offset: u32) -> Self {
        let mut image = Self::new();
        image.write(offset, data);
        image
    }

    /// Load a raw binary file placed at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read.
    pub fn from_bin_file(path: &Path, offset: u32) -> Result<Self> {
        let data = fs::read(path)?;
        debug!(path = %path.display(), len = data.len(), offset, "Loaded binary file");
        Ok(Self::from_bin(&data, offset))
    }

    /// Load an Intel HEX file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or is not valid Intel HEX.
    pub fn from_hex_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let image = Self::parse(&text)?;
        debug!(path = %path.display(), len = image.len(), "Loaded HEX file");
        Ok(image)
    }

    /// Parse Intel HEX text. Blank lines are skipped; parsing stops at the
    /// end-of-file record.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed records or a missing end-of-file record.
    pub fn parse(text: &str) -> Result<Self> {
        let mut image = Self::new();
        let mut base = 0u32;
        let mut finished = false;

        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            let record = Record::parse(line, line_no)?;
            match record.kind {
                RecordKind::Data => {
                    let address = base.wrapping_add(u32::from(record.address));
                    for (offset, byte) in (0u32..).zip(&record.data) {
                        image.data.insert(address.wrapping_add(offset), *byte);
                    }
                }
                RecordKind::EndOfFile => {
                    finished = true;
                    break;
                }
                RecordKind::ExtendedSegmentAddress => base = record.value() << 4,
                RecordKind::ExtendedLinearAddress => base = record.value() << 16,
                RecordKind::StartSegmentAddress => {
                    let value = record.value();
                    image.start = Some(StartAddress::Segment {
                        cs: (value >> 16) as u16,
                        ip: (value & 0xFFFF) as u16,
                    });
                }
                RecordKind::StartLinearAddress => {
                    image.start = Some(StartAddress::Linear(record.value()));
                }
            }
        }

        if !finished {
            return Err(Error::hex_parse(
                text.lines().count(),
                "missing end of file record",
            ));
        }
        Ok(image)
    }

    /// Number of populated bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when no byte is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Lowest populated address.
    #[must_use]
    pub fn min_address(&self) -> Option<u32> {
        self.data.keys().next().copied()
    }

    /// Highest populated address.
    #[must_use]
    pub fn max_address(&self) -> Option<u32> {
        self.data.keys().next_back().copied()
    }

    /// Start address record, if any.
    #[must_use]
    pub fn start_address(&self) -> Option<StartAddress> {
        self.start
    }

    /// Set or clear the start address.
    pub fn set_start_address(&mut self, start: Option<StartAddress>) {
        self.start = start;
    }

    /// Byte at `address`.
    #[must_use]
    pub fn get(&self, address: u32) -> Option<u8> {
        self.data.get(&address).copied()
    }

    /// Write `bytes` starting at `address`, replacing existing data.
    pub fn write(&mut self, address: u32, bytes: &[u8]) {
        for (offset, byte) in (0u32..).zip(bytes) {
            self.data.insert(address.wrapping_add(offset), *byte);
        }
    }

    /// `len` bytes starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HexMissingData`] at the first unpopulated address of
    /// the range.
    pub fn read(&self, address: u32, len: usize) -> Result<Vec<u8>> {
        (0u32..)
            .take(len)
            .map(|offset| {
                let at = address.checked_add(offset).ok_or_else(|| {
                    Error::invalid_value(
                        format!("0x{address:08X}+{len}"),
                        "range exceeds the 32-bit address space",
                    )
                })?;
                self.get(at).ok_or(Error::HexMissingData { address: at })
            })
            .collect()
    }

    /// Contiguous populated ranges as `(start, end)` with `end` exclusive.
    #[must_use]
    pub fn segments(&self) -> Vec<(u32, u64)> {
        let mut segments: Vec<(u32, u64)> = Vec::new();
        for &address in self.data.keys() {
            match segments.last_mut() {
                Some((_, end)) if *end == u64::from(address) => *end += 1,
                _ => segments.push((address, u64::from(address) + 1)),
            }
        }
        segments
    }

    /// Merge `other` into this image.
    ///
    /// # Errors
    ///
    /// With [`Overlap::Error`], returns [`Error::HexOverlap`] at the first
    /// address populated in both images; nothing is modified in that case.
    pub fn merge(&mut self, other: &Self, overlap: Overlap) -> Result<()> {
        if overlap == Overlap::Error {
            if let Some(address) = other.data.keys().find(|a| self.data.contains_key(a)) {
                return Err(Error::HexOverlap { address: *address });
            }
        }
        for (&address, &byte) in &other.data {
            match overlap {
                Overlap::Ignore => {
                    self.data.entry(address).or_insert(byte);
                }
                Overlap::Error | Overlap::Replace => {
                    self.data.insert(address, byte);
                }
            }
        }
        if other.start.is_some() && (self.start.is_none() || overlap == Overlap::Replace) {
            self.start = other.start;
        }
        Ok(())
    }

    /// Bytes from the lowest to the highest populated address, inclusive.
    #[must_use]
    pub fn span(&self) -> u64 {
        match (self.min_address(), self.max_address()) {
            (Some(min), Some(max)) => u64::from(max - min) + 1,
            _ => 0,
        }
    }

    /// Flat binary from the lowest to the highest address, gaps filled with
    /// `padding`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HexSpanTooLarge`] when the binary would be larger
    /// than `max_bytes`.
    pub fn to_bin(&self, padding: u8, max_bytes: u64) -> Result<Vec<u8>> {
        let span = self.span();
        if span > max_bytes {
            return Err(Error::HexSpanTooLarge {
                span,
                max: max_bytes,
            });
        }
        let Some(min) = self.min_address() else {
            return Ok(Vec::new());
        };
        let len = usize::try_from(span).map_err(|_| Error::HexSpanTooLarge {
            span,
            max: max_bytes,
        })?;
        let mut out = vec![padding; len];
        for (&address, &byte) in &self.data {
            out[(address - min) as usize] = byte;
        }
        Ok(out)
    }

    /// BLAKE3 digest of the `0xFF` padded binary, as hex.
    ///
    /// Hashed incrementally, so sparse images with large gaps are never
    /// flattened in memory.
    #[must_use]
    pub fn digest(&self) -> String {
        const FILL: [u8; DIGEST_FILL_BYTES] = [0xFF; DIGEST_FILL_BYTES];

        let mut hasher = blake3::Hasher::new();
        let mut run = Vec::with_capacity(DIGEST_FILL_BYTES);
        let mut next: Option<u64> = None;
        for (&address, &byte) in &self.data {
            let address = u64::from(address);
            if let Some(expected) = next.filter(|expected| *expected != address) {
                hasher.update(&run);
                run.clear();
                let mut gap = address - expected;
                while gap > 0 {
                    let n = usize::try_from(gap).map_or(DIGEST_FILL_BYTES, |gap| {
                        gap.min(DIGEST_FILL_BYTES)
                    });
                    hasher.update(&FILL[..n]);
                    gap -= n as u64;
                }
            }
            run.push(byte);
            if run.len() == DIGEST_FILL_BYTES {
                hasher.update(&run);
                run.clear();
            }
            next = Some(address + 1);
        }
        hasher.update(&run);
        hasher.finalize().to_hex().to_string()
    }

    /// Intel HEX text with at most `record_bytes` data bytes per record.
    ///
    /// # Errors
    ///
    /// Returns an error if `record_bytes` is 0.
    pub fn to_hex_string(&self, record_bytes: u8) -> Result<String> {
        if record_bytes == 0 {
            return Err(Error::invalid_value("0", "record size must be at least 1 byte"));
        }

        let mut out = String::new();
        let mut upper: Option<u16> = None;
        let mut chunk: Vec<u8> = Vec::new();
        let mut chunk_start = 0u32;

        for (&address, &byte) in &self.data {
            let high = (address >> 16) as u16;
            let contiguous = !chunk.is_empty()
                && u64::from(chunk_start) + chunk.len() as u64 == u64::from(address)
                && (chunk_start >> 16) as u16 == high
                && chunk.len() < usize::from(record_bytes);
            if !contiguous {
                flush_chunk(&mut out, chunk_start, &mut chunk);
                chunk_start = address;
            }
            if upper != Some(high) {
                let _ = writeln!(out, "{}", Record::extended_linear(high));
                upper = Some(high);
            }
            chunk.push(byte);
        }
        flush_chunk(&mut out, chunk_start, &mut chunk);

        if let Some(start) = self.start {
            let _ = writeln!(out, "{}", Record::start(start));
        }
        let _ = writeln!(out, "{}", Record::end_of_file());
        Ok(out)
    }

    /// Write the image as an Intel HEX file.
    ///
    /// # Errors
    ///
    /// Returns an error if `record_bytes` is 0 or the file can't be written.
    pub fn write_hex_file(&self, path: &Path, record_bytes: u8) -> Result<()> {
        fs::write(path, self.to_hex_string(record_bytes)?)?;
        debug!(path = %path.display(), len = self.len(), "Wrote HEX file");
        Ok(())
    }
}

fn flush_chunk(out: &mut String, start: u32, chunk: &mut Vec<u8>) {
    if !chunk.is_empty() {
        let record = Record::data((start & 0xFFFF) as u16, std::mem::take(chunk));
        let _ = writeln!(out, "{record}");
    }
}
