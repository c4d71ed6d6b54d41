//! Bit and byte manipulation helpers.

/// Returns a mask with bit `bit` set, or with bits `0..=bit` set when `fill`.
///
/// `bit` must be below 64.
#[must_use]
pub fn bitmask(bit: u32, fill: bool) -> u64 {
    let mask = 1u64 << bit;
    if fill {
        ((mask - 1) << 1) | 1
    } else {
        mask
    }
}

/// Mirrors the low `width` bits of `value`. Higher bits are discarded.
#[must_use]
pub fn reverse_bits(value: u64, width: u32) -> u64 {
    match width {
        0 => 0,
        w if w >= 64 => value.reverse_bits(),
        w => (value & bitmask(w - 1, true)).reverse_bits() >> (64 - w),
    }
}

/// Number of bytes needed to hold `value` (at least one).
#[must_use]
pub fn byte_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

/// Mirrors the byte order of the low `size` bytes of `value`.
///
/// When `size` is `None` the smallest size holding `value` is used.
#[must_use]
pub fn reverse_bytes(value: u64, size: Option<usize>) -> u64 {
    let size = size.unwrap_or_else(|| byte_len(value)).min(8);
    if size == 0 {
        return 0;
    }
    let bytes = value.to_le_bytes();
    bytes[..size]
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmask() {
        assert_eq!(bitmask(0, false), 0x01);
        assert_eq!(bitmask(7, false), 0x80);
        assert_eq!(bitmask(7, true), 0xFF);
        assert_eq!(bitmask(15, true), 0xFFFF);
        assert_eq!(bitmask(63, true), u64::MAX);
    }

    #[test]
    fn test_reverse_bits() {
        assert_eq!(reverse_bits(0b0001, 4), 0b1000);
        assert_eq!(reverse_bits(0x01, 8), 0x80);
        assert_eq!(reverse_bits(0x8005, 16), 0xA001);
        assert_eq!(reverse_bits(0x04C1_1DB7, 32), 0xEDB8_8320);
        assert_eq!(reverse_bits(0x1F0, 4), 0);
        assert_eq!(reverse_bits(1, 64), 1 << 63);
        assert_eq!(reverse_bits(0xFF, 0), 0);
    }

    #[test]
    fn test_reverse_bytes() {
        assert_eq!(reverse_bytes(0x1234, None), 0x3412);
        assert_eq!(reverse_bytes(0x1234, Some(4)), 0x3412_0000);
        assert_eq!(reverse_bytes(0x00AB_CDEF, None), 0xEFCD_AB);
        assert_eq!(reverse_bytes(0, None), 0);
    }

    #[test]
    fn test_byte_len() {
        assert_eq!(byte_len(0), 1);
        assert_eq!(byte_len(0xFF), 1);
        assert_eq!(byte_len(0x100), 2);
        assert_eq!(byte_len(u64::MAX), 8);
    }
}
