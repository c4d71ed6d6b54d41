//! File level image conversions.
//!
//! Sources are merged in order with [`Overlap::Replace`], so a later file
//! wins where two files cover the same address.

use std::path::{Path, PathBuf};

use tracing::info;

use super::{IntelHex, Overlap};
use crate::error::Result;
use crate::math::align_up;
use crate::path::{validate_file, validate_path};

/// Load `src` as a binary placed at `offset`.
///
/// When `out` is given the image is also written there as Intel HEX.
///
/// # Errors
///
/// Returns an error if `src` is missing, `out` is unreachable or any I/O
/// operation fails.
pub fn bin_to_hex(src: &Path, offset: u32, out: Option<&Path>, record_bytes: u8) -> Result<IntelHex> {
    validate_file(src, true, &[])?;
    let image = IntelHex::from_bin_file(src, offset)?;
    if let Some(out) = out {
        validate_path(out, true)?;
        image.write_hex_file(out, record_bytes)?;
        info!(src = %src.display(), out = %out.display(), offset, "Converted BIN to HEX");
    }
    Ok(image)
}

/// Merge binary files, each at its own offset, into one HEX file.
///
/// # Errors
///
/// Returns an error if a source is missing, `out` is unreachable or any I/O
/// operation fails.
pub fn merge_bin(sources: &[(PathBuf, u32)], out: &Path, record_bytes: u8) -> Result<IntelHex> {
    validate_path(out, true)?;
    let mut merged = IntelHex::new();
    for (src, offset) in sources {
        let image = bin_to_hex(src, *offset, None, record_bytes)?;
        merged.merge(&image, Overlap::Replace)?;
    }
    merged.write_hex_file(out, record_bytes)?;
    info!(sources = sources.len(), out = %out.display(), "Merged BIN files");
    Ok(merged)
}

/// Merge HEX files into one.
///
/// # Errors
///
/// Returns an error if a source is missing or invalid, `out` is unreachable
/// or any I/O operation fails.
pub fn merge_hex(sources: &[PathBuf], out: &Path, record_bytes: u8) -> Result<IntelHex> {
    validate_path(out, true)?;
    let mut merged = IntelHex::new();
    for src in sources {
        validate_file(src, true, &[])?;
        let image = IntelHex::from_hex_file(src)?;
        merged.merge(&image, Overlap::Replace)?;
    }
    merged.write_hex_file(out, record_bytes)?;
    info!(sources = sources.len(), out = %out.display(), "Merged HEX files");
    Ok(merged)
}

/// Write a HEX file back to a flat binary.
///
/// Gaps are filled with `padding`. A non-zero `align` pads the end of the
/// output to a multiple of `align` bytes.
///
/// # Errors
///
/// Returns an error if `src` is missing or invalid, the image spans more than
/// `max_bytes`, or `out` can't be written.
pub fn hex_to_bin(
    src: &Path,
    out: &Path,
    padding: u8,
    align: usize,
    max_bytes: u64,
) -> Result<Vec<u8>> {
    validate_file(src, true, &[])?;
    validate_path(out, true)?;
    let image = IntelHex::from_hex_file(src)?;
    let mut data = image.to_bin(padding, max_bytes)?;
    data.resize(align_up(data.len(), align), padding);
    std::fs::write(out, &data)?;
    info!(src = %src.display(), out = %out.display(), len = data.len(), "Converted HEX to BIN");
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex::{DEFAULT_MAX_BIN_BYTES, DEFAULT_RECORD_BYTES};

    const OFFSET: u32 = 0x20;
    const FILES: [(&str, &str); 2] = [
        ("base1.bin", "This is a test"),
        ("base2.bin", "This is yet another test"),
    ];

    fn write_sources(dir: &Path) -> Vec<(PathBuf, u32)> {
        let mut last = 0u32;
        FILES
            .iter()
            .map(|(name, content)| {
                let path = dir.join(name);
                std::fs::write(&path, content).unwrap();
                let offset = OFFSET + last;
                last += u32::try_from(content.len()).unwrap();
                (path, offset)
            })
            .collect()
    }

    fn check_merged(image: &IntelHex) {
        let mut address = OFFSET;
        for (_, content) in FILES {
            let bytes = image.read(address, content.len()).unwrap();
            assert_eq!(String::from_utf8(bytes).unwrap(), content);
            address += u32::try_from(content.len()).unwrap();
        }
    }

    #[test]
    fn test_bin_to_hex() {
        let dir = tempfile::tempdir().unwrap();
        for (path, _) in write_sources(dir.path()) {
            let content = std::fs::read(&path).unwrap();
            let image = bin_to_hex(&path, OFFSET, None, DEFAULT_RECORD_BYTES).unwrap();
            assert_eq!(image.read(OFFSET, content.len()).unwrap(), content);
        }
    }

    #[test]
    fn test_bin_to_hex_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let sources = write_sources(dir.path());
        let out = dir.path().join("out.hex");
        let image = bin_to_hex(&sources[0].0, OFFSET, Some(&out), DEFAULT_RECORD_BYTES).unwrap();
        assert_eq!(IntelHex::from_hex_file(&out).unwrap(), image);
    }

    #[test]
    fn test_merge_bin() {
        let dir = tempfile::tempdir().unwrap();
        let sources = write_sources(dir.path());
        let out = dir.path().join("merged.hex");
        merge_bin(&sources, &out, DEFAULT_RECORD_BYTES).unwrap();
        check_merged(&IntelHex::from_hex_file(&out).unwrap());
    }

    #[test]
    fn test_merge_hex() {
        let dir = tempfile::tempdir().unwrap();
        let mut hex_files = Vec::new();
        for (path, offset) in write_sources(dir.path()) {
            let hex_path = path.with_extension("hex");
            bin_to_hex(&path, offset, Some(&hex_path), DEFAULT_RECORD_BYTES).unwrap();
            hex_files.push(hex_path);
        }
        let out = dir.path().join("merged.hex");
        merge_hex(&hex_files, &out, DEFAULT_RECORD_BYTES).unwrap();
        check_merged(&IntelHex::from_hex_file(&out).unwrap());
    }

    #[test]
    fn test_merge_later_source_wins() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.bin");
        let second = dir.path().join("second.bin");
        std::fs::write(&first, [1u8; 8]).unwrap();
        std::fs::write(&second, [2u8; 4]).unwrap();
        let out = dir.path().join("out.hex");
        let merged =
            merge_bin(&[(first, 0), (second, 2)], &out, DEFAULT_RECORD_BYTES).unwrap();
        assert_eq!(merged.to_bin(0, DEFAULT_MAX_BIN_BYTES).unwrap(), vec![1, 1, 2, 2, 2, 2, 1, 1]);
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.hex");
        let err = merge_hex(&[dir.path().join("nope.hex")], &out, DEFAULT_RECORD_BYTES)
            .unwrap_err();
        assert!(err.is_path_error());
    }

    #[test]
    fn test_unreachable_output() {
        let dir = tempfile::tempdir().unwrap();
        let sources = write_sources(dir.path());
        let out = dir.path().join("not").join("here").join("out.hex");
        let err = merge_bin(&sources, &out, DEFAULT_RECORD_BYTES).unwrap_err();
        assert!(err.is_path_error());
    }

    #[test]
    fn test_hex_to_bin_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("image.hex");
        IntelHex::from_bin(&[7u8; 5], 0x100)
            .write_hex_file(&src, DEFAULT_RECORD_BYTES)
            .unwrap();
        let out = dir.path().join("image.bin");
        let data = hex_to_bin(&src, &out, 0xFF, 4, DEFAULT_MAX_BIN_BYTES).unwrap();
        assert_eq!(data, vec![7, 7, 7, 7, 7, 0xFF, 0xFF, 0xFF]);
        assert_eq!(std::fs::read(&out).unwrap(), data);
    }
}
