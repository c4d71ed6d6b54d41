//! Consistent Overhead Byte Stuffing.
//!
//! COBS removes every zero byte from a payload at a cost of at most one byte
//! per 254, which lets a zero byte act as the frame delimiter on the wire.
//! [`encode`] does not append the delimiter; [`crate::codec::CobsCodec`] does.

use thiserror::Error;

/// Errors raised while decoding COBS data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CobsError {
    /// A zero byte was found inside the encoded data.
    #[error("zero byte found in input")]
    ZeroByte,

    /// A block header announced more bytes than were available.
    #[error("not enough bytes to process")]
    Truncated,
}

const MAX_CODE: u8 = 0xFF;

/// Encodes `data`. The result never contains a zero byte.
#[must_use]
pub fn encode(data: &[u8]) -> Vec<u8> {
    if data.is_empty() {
        return vec![0x01];
    }

    let mut out = Vec::with_capacity(data.len() + data.len() / 254 + 2);
    let mut start = 0;
    let mut pending_zero = false;

    for (end, &byte) in data.iter().enumerate() {
        let run = end - start;
        if byte == 0 {
            pending_zero = true;
            push_block(&mut out, &data[start..end]);
            start = end + 1;
        } else if run == usize::from(MAX_CODE - 2) {
            pending_zero = false;
            out.push(MAX_CODE);
            out.extend_from_slice(&data[start..=end]);
            start = end + 1;
        }
    }

    if start != data.len() || pending_zero {
        push_block(&mut out, &data[start..]);
    }
    out
}

/// Writes a block shorter than 254 bytes with its code byte.
fn push_block(out: &mut Vec<u8>, block: &[u8]) {
    // `encode` never hands over blocks long enough to overflow the code.
    let code = u8::try_from(block.len() + 1).unwrap_or(MAX_CODE);
    out.push(code);
    out.extend_from_slice(block);
}

/// Decodes COBS `data` (without the trailing delimiter).
///
/// # Errors
///
/// Returns [`CobsError::ZeroByte`] if `data` contains a zero byte and
/// [`CobsError::Truncated`] if the last block is incomplete.
pub fn decode(data: &[u8]) -> Result<Vec<u8>, CobsError> {
    let mut out = Vec::with_capacity(data.len());
    let mut idx = 0;

    while idx < data.len() {
        let code = data[idx];
        if code == 0 {
            return Err(CobsError::ZeroByte);
        }
        idx += 1;

        let end = idx + usize::from(code) - 1;
        let block = &data[idx..end.min(data.len())];
        if block.contains(&0) {
            return Err(CobsError::ZeroByte);
        }
        out.extend_from_slice(block);

        idx = end;
        if idx > data.len() {
            return Err(CobsError::Truncated);
        }
        if idx < data.len() && code < MAX_CODE {
            out.push(0);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(raw: &[u8], encoded: &[u8]) {
        assert_eq!(encode(raw), encoded, "encode {raw:02X?}");
        assert_eq!(decode(encoded).unwrap(), raw, "decode {encoded:02X?}");
    }

    #[test]
    fn test_wikipedia_vectors() {
        check(&[0x00], &[0x01, 0x01]);
        check(&[0x00, 0x00], &[0x01, 0x01, 0x01]);
        check(&[0x00, 0x11, 0x00], &[0x01, 0x02, 0x11, 0x01]);
        check(&[0x11, 0x22, 0x00, 0x33], &[0x03, 0x11, 0x22, 0x02, 0x33]);
        check(&[0x11, 0x22, 0x33, 0x44], &[0x05, 0x11, 0x22, 0x33, 0x44]);
        check(&[0x11, 0x00, 0x00, 0x00], &[0x02, 0x11, 0x01, 0x01, 0x01]);
    }

    #[test]
    fn test_long_runs() {
        let raw: Vec<u8> = (0x01..=0xFE).collect();
        let mut encoded = vec![0xFF];
        encoded.extend(0x01..=0xFE);
        check(&raw, &encoded);

        let raw: Vec<u8> = (0x00..=0xFE).collect();
        let mut encoded = vec![0x01, 0xFF];
        encoded.extend(0x01..=0xFE);
        check(&raw, &encoded);

        let raw: Vec<u8> = (0x01..=0xFF).collect();
        let mut encoded = vec![0xFF];
        encoded.extend(0x01..=0xFE);
        encoded.extend([0x02, 0xFF]);
        check(&raw, &encoded);

        let mut raw: Vec<u8> = (0x02..=0xFF).collect();
        raw.push(0x00);
        let mut encoded = vec![0xFF];
        encoded.extend(0x02..=0xFF);
        encoded.extend([0x01, 0x01]);
        check(&raw, &encoded);
    }

    #[test]
    fn test_multi_block() {
        let mut raw = vec![0x45, 0x00, 0x00, 0x2C, 0x4C, 0x79, 0x00, 0x00];
        raw.extend([0x40, 0x06, 0x4F, 0x37]);
        let encoded = encode(&raw);
        assert!(!encoded.contains(&0));
        assert_eq!(
            encoded,
            [0x02, 0x45, 0x01, 0x04, 0x2C, 0x4C, 0x79, 0x01, 0x05, 0x40, 0x06, 0x4F, 0x37]
        );
        assert_eq!(decode(&encoded).unwrap(), raw);
    }

    #[test]
    fn test_empty() {
        assert_eq!(encode(&[]), vec![0x01]);
        assert_eq!(decode(&[]).unwrap(), Vec::<u8>::new());
        assert_eq!(decode(&[0x01]).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_truncated() {
        assert_eq!(decode(&[0x02]), Err(CobsError::Truncated));
        assert_eq!(decode(&[0x05, 0x11, 0x22]), Err(CobsError::Truncated));
    }

    #[test]
    fn test_decode_zero_byte() {
        assert_eq!(decode(&[0x02, 0x00, 0x01]), Err(CobsError::ZeroByte));
        assert_eq!(decode(&[0x00]), Err(CobsError::ZeroByte));
    }

    #[test]
    fn test_encoded_never_contains_zero() {
        let raw: Vec<u8> = (0..1000u32).map(|i| (i % 7) as u8).collect();
        let encoded = encode(&raw);
        assert!(!encoded.contains(&0));
        assert_eq!(decode(&encoded).unwrap(), raw);
    }
}
