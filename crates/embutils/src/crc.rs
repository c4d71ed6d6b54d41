//! Generic table-driven CRC.
//!
//! Any model from 1 to 64 bits wide can be described with a [`CrcModel`].
//! Widths below 8 bits use a byte-aligned register so the same 256-entry
//! table works for them.
//!
//! ```
//! use embutils::crc::{Crc, CrcPreset};
//!
//! let crc = Crc::from(CrcPreset::Crc32);
//! assert_eq!(crc.compute(b"123456789"), 0xCBF4_3926);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bits::{bitmask, reverse_bits};
use crate::error::{Error, Result};

/// Parameters of a CRC model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrcModel {
    /// Model name.
    pub name: String,
    /// Register width in bits (1..=64).
    pub width: u32,
    /// Generator polynomial, without the implicit top bit.
    pub poly: u64,
    /// Initial register value.
    pub init: u64,
    /// Value XORed into the final result.
    pub xor_out: u64,
    /// Reflect every input byte.
    pub reflect_in: bool,
    /// Reflect the final register before the XOR.
    pub reflect_out: bool,
}

impl Default for CrcModel {
    fn default() -> Self {
        CrcPreset::default().model()
    }
}

/// Well known CRC models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrcPreset {
    /// CRC-4/ITU.
    Crc4Itu,
    /// CRC-5/EPC.
    Crc5Epc,
    /// CRC-5/USB.
    Crc5Usb,
    /// CRC-8 (SMBus).
    Crc8,
    /// CRC-8/EBU.
    Crc8Ebu,
    /// CRC-16/CCITT-FALSE.
    #[default]
    Crc16CcittFalse,
    /// CRC-16/MAXIM.
    Crc16Maxim,
    /// CRC-32 (zlib, Ethernet).
    Crc32,
    /// CRC-32/POSIX (cksum).
    Crc32Posix,
}

impl CrcPreset {
    /// All presets, in width order.
    pub const ALL: [Self; 9] = [
        Self::Crc4Itu,
        Self::Crc5Epc,
        Self::Crc5Usb,
        Self::Crc8,
        Self::Crc8Ebu,
        Self::Crc16CcittFalse,
        Self::Crc16Maxim,
        Self::Crc32,
        Self::Crc32Posix,
    ];

    /// Catalogue name of the preset.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Crc4Itu => "CRC-4/ITU",
            Self::Crc5Epc => "CRC-5/EPC",
            Self::Crc5Usb => "CRC-5/USB",
            Self::Crc8 => "CRC-8",
            Self::Crc8Ebu => "CRC-8/EBU",
            Self::Crc16CcittFalse => "CRC-16/CCITT-FALSE",
            Self::Crc16Maxim => "CRC-16/MAXIM",
            Self::Crc32 => "CRC-32",
            Self::Crc32Posix => "CRC-32/POSIX",
        }
    }

    /// CRC of the ASCII string `123456789`.
    #[must_use]
    pub fn check(self) -> u64 {
        match self {
            Self::Crc4Itu => 0x7,
            Self::Crc5Epc => 0x00,
            Self::Crc5Usb => 0x19,
            Self::Crc8 => 0xF4,
            Self::Crc8Ebu => 0x97,
            Self::Crc16CcittFalse => 0x29B1,
            Self::Crc16Maxim => 0x44C2,
            Self::Crc32 => 0xCBF4_3926,
            Self::Crc32Posix => 0x765E_7680,
        }
    }

    /// Model parameters.
    #[must_use]
    pub fn model(self) -> CrcModel {
        let (width, poly, init, xor_out, reflect) = match self {
            Self::Crc4Itu => (4, 0x03, 0x0, 0x0, true),
            Self::Crc5Epc => (5, 0x09, 0x09, 0x00, false),
            Self::Crc5Usb => (5, 0x05, 0x1F, 0x1F, true),
            Self::Crc8 => (8, 0x07, 0x00, 0x00, false),
            Self::Crc8Ebu => (8, 0x1D, 0xFF, 0x00, true),
            Self::Crc16CcittFalse => (16, 0x1021, 0xFFFF, 0x0000, false),
            Self::Crc16Maxim => (16, 0x8005, 0x0000, 0xFFFF, true),
            Self::Crc32 => (32, 0x04C1_1DB7, 0xFFFF_FFFF, 0xFFFF_FFFF, true),
            Self::Crc32Posix => (32, 0x04C1_1DB7, 0x0000_0000, 0xFFFF_FFFF, false),
        };
        CrcModel {
            name: self.name().to_string(),
            width,
            poly,
            init,
            xor_out,
            reflect_in: reflect,
            reflect_out: reflect,
        }
    }
}

impl FromStr for CrcPreset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = normalize_name(s);
        Self::ALL
            .into_iter()
            .find(|preset| normalize_name(preset.name()) == wanted)
            .ok_or_else(|| Error::invalid_value(s, "unknown CRC model"))
    }
}

impl fmt::Display for CrcPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// A CRC calculator for one model, with its lookup table.
#[derive(Clone)]
pub struct Crc {
    model: CrcModel,
    mask: u64,
    table: [u64; 256],
}

impl Crc {
    /// Build a calculator. Numeric parameters are masked to the width.
    ///
    /// # Errors
    ///
    /// Returns an error if the width is not within 1..=64.
    pub fn new(mut model: CrcModel) -> Result<Self> {
        if !(1..=64).contains(&model.width) {
            return Err(Error::invalid_value(
                model.width.to_string(),
                "CRC width must be between 1 and 64 bits",
            ));
        }
        let mask = bitmask(model.width - 1, true);
        model.poly &= mask;
        model.init &= mask;
        model.xor_out &= mask;
        let table = lookup_table(&model, mask);
        Ok(Self { model, mask, table })
    }

    /// Model parameters.
    #[must_use]
    pub fn model(&self) -> &CrcModel {
        &self.model
    }

    /// Model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.model.name
    }

    /// Register width in bits.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.model.width
    }

    /// The precomputed table.
    #[must_use]
    pub fn lookup_table(&self) -> &[u64; 256] {
        &self.table
    }

    /// CRC of `data` starting from the model's initial value.
    #[must_use]
    pub fn compute(&self, data: &[u8]) -> u64 {
        self.compute_from(data, self.model.init)
    }

    /// CRC of `data` starting from `init`, for chained block computation.
    #[must_use]
    pub fn compute_from(&self, data: &[u8], init: u64) -> u64 {
        let width = self.model.width;
        let init = init & self.mask;

        let crc = if width >= 8 {
            let shift = width - 8;
            data.iter().fold(init, |crc, &byte| {
                let byte = self.input(byte);
                let pos = (((crc >> shift) ^ byte) & 0xFF) as usize;
                self.mask & ((crc << 8) ^ self.table[pos])
            })
        } else if self.model.reflect_in {
            let crc = data.iter().fold(reverse_bits(init, width), |crc, &byte| {
                let pos = ((crc ^ u64::from(byte)) & 0xFF) as usize;
                self.mask & ((crc >> 8) ^ self.table[pos])
            });
            reverse_bits(crc, width)
        } else {
            let shift = 8 - width;
            let crc = data.iter().fold(init << shift, |crc, &byte| {
                let pos = ((crc ^ u64::from(byte)) & 0xFF) as usize;
                (self.mask << shift) & ((crc << width) ^ (self.table[pos] << shift))
            });
            crc >> shift
        };

        let crc = if self.model.reflect_out {
            reverse_bits(crc, width)
        } else {
            crc
        };
        crc ^ self.model.xor_out
    }

    fn input(&self, byte: u8) -> u64 {
        if self.model.reflect_in {
            reverse_bits(u64::from(byte), 8)
        } else {
            u64::from(byte)
        }
    }

    /// Number of hex digits used to print values of this width.
    fn digits(&self) -> usize {
        2 * self.model.width.div_ceil(8) as usize
    }
}

impl From<CrcPreset> for Crc {
    fn from(preset: CrcPreset) -> Self {
        let model = preset.model();
        let mask = bitmask(model.width - 1, true);
        let table = lookup_table(&model, mask);
        Self { model, mask, table }
    }
}

impl Default for Crc {
    fn default() -> Self {
        Self::from(CrcPreset::default())
    }
}

impl fmt::Debug for Crc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crc").field("model", &self.model).finish_non_exhaustive()
    }
}

impl fmt::Display for Crc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.digits();
        let m = &self.model;
        write!(
            f,
            "Crc(name={}, width={}, poly=0x{:0digits$X}, init=0x{:0digits$X}, \
             xor_out=0x{:0digits$X}, reflect_in={}, reflect_out={})",
            m.name, m.width, m.poly, m.init, m.xor_out, m.reflect_in, m.reflect_out
        )
    }
}

fn lookup_table(model: &CrcModel, mask: u64) -> [u64; 256] {
    let mut table = [0u64; 256];
    let width = model.width;

    if width >= 8 {
        let shift = width - 8;
        let check = bitmask(width - 1, false);
        for (idx, entry) in (0u64..).zip(table.iter_mut()) {
            let mut value = idx << shift;
            for _ in 0..8 {
                value = if value & check == 0 {
                    value << 1
                } else {
                    (value << 1) ^ model.poly
                };
            }
            *entry = mask & value;
        }
    } else {
        let shift = 8 - width;
        let poly = model.poly << shift;
        for (idx, entry) in (0u64..).zip(table.iter_mut()) {
            let mut value = if model.reflect_in {
                reverse_bits(idx, 8)
            } else {
                idx
            };
            for _ in 0..8 {
                value = if value & 0x80 == 0 {
                    (value << 1) & 0xFF
                } else {
                    ((value << 1) ^ poly) & 0xFF
                };
            }
            if model.reflect_in {
                value = reverse_bits(value >> shift, width) << shift;
            }
            *entry = mask & (value >> shift);
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECK_INPUT: &[u8] = b"123456789";

    #[test]
    fn test_presets_match_check_values() {
        for preset in CrcPreset::ALL {
            let crc = Crc::from(preset);
            assert_eq!(
                crc.compute(CHECK_INPUT),
                preset.check(),
                "{} check value",
                preset.name()
            );
        }
    }

    #[test]
    fn test_new_matches_preset() {
        let crc = Crc::new(CrcPreset::Crc16Maxim.model()).unwrap();
        assert_eq!(crc.compute(CHECK_INPUT), 0x44C2);
    }

    #[test]
    fn test_default_is_ccitt_false() {
        let crc = Crc::default();
        assert_eq!(crc.name(), "CRC-16/CCITT-FALSE");
        assert_eq!(crc.width(), 16);
        assert_eq!(crc.compute(CHECK_INPUT), 0x29B1);
    }

    #[test]
    fn test_chained_computation() {
        let crc = Crc::default();
        let first = crc.compute(b"12345");
        let chained = crc.compute_from(b"6789", first);
        assert_eq!(chained, crc.compute(CHECK_INPUT));
    }

    #[test]
    fn test_empty_input_returns_init_xor() {
        let crc = Crc::from(CrcPreset::Crc32Posix);
        assert_eq!(crc.compute(&[]), 0xFFFF_FFFF);
    }

    #[test]
    fn test_parameters_are_masked() {
        let crc = Crc::new(CrcModel {
            name: "masked".to_string(),
            width: 8,
            poly: 0x107,
            init: 0x100,
            xor_out: 0x1FF,
            reflect_in: false,
            reflect_out: false,
        })
        .unwrap();
        assert_eq!(crc.model().poly, 0x07);
        assert_eq!(crc.model().init, 0x00);
        assert_eq!(crc.model().xor_out, 0xFF);
    }

    #[test]
    fn test_invalid_width() {
        let mut model = CrcModel::default();
        model.width = 0;
        assert!(Crc::new(model.clone()).is_err());
        model.width = 65;
        assert!(Crc::new(model).is_err());
    }

    #[test]
    fn test_table_first_entries() {
        let crc = Crc::default();
        let table = crc.lookup_table();
        assert_eq!(table[0], 0x0000);
        assert_eq!(table[1], 0x1021);
        assert_eq!(table[255], 0x1EF0);
    }

    #[test]
    fn test_display() {
        let crc = Crc::from(CrcPreset::Crc8);
        assert_eq!(
            crc.to_string(),
            "Crc(name=CRC-8, width=8, poly=0x07, init=0x00, xor_out=0x00, \
             reflect_in=false, reflect_out=false)"
        );
    }

    #[test]
    fn test_preset_from_str() {
        assert_eq!(
            "crc-16/ccitt-false".parse::<CrcPreset>().unwrap(),
            CrcPreset::Crc16CcittFalse
        );
        assert_eq!("CRC32".parse::<CrcPreset>().unwrap(), CrcPreset::Crc32);
        assert_eq!("crc_5_usb".parse::<CrcPreset>().unwrap(), CrcPreset::Crc5Usb);
        assert!("crc-99".parse::<CrcPreset>().is_err());
    }
}
