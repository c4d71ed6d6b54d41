//! Firmware image and version workflows across modules.

use std::fs;

use embutils::hex::files::{bin_to_hex, hex_to_bin, merge_bin, merge_hex};
use embutils::hex::{DEFAULT_MAX_BIN_BYTES, DEFAULT_RECORD_BYTES};
use embutils::repo::{CHeaderExporter, SimpleVersionStorage, VersionHandler, VersionStorage};
use embutils::{Crc, CrcPreset, IntelHex, Version};

#[test]
fn test_bootloader_and_application_merge() {
    let dir = tempfile::tempdir().unwrap();
    let boot = dir.path().join("boot.bin");
    let app = dir.path().join("app.bin");
    fs::write(&boot, vec![0xB0; 0x100]).unwrap();
    fs::write(&app, vec![0xA5; 0x80]).unwrap();

    // The application starts past a 64 KiB boundary.
    let merged = dir.path().join("merged.hex");
    let image = merge_bin(
        &[(boot.clone(), 0x0800_0000), (app.clone(), 0x0801_0000)],
        &merged,
        DEFAULT_RECORD_BYTES,
    )
    .unwrap();
    assert_eq!(image.len(), 0x180);
    assert_eq!(image.segments().len(), 2);

    let reloaded = IntelHex::from_hex_file(&merged).unwrap();
    assert_eq!(reloaded, image);
    assert_eq!(reloaded.get(0x0800_00FF), Some(0xB0));
    assert_eq!(reloaded.get(0x0801_0000), Some(0xA5));
    assert_eq!(reloaded.get(0x0800_0100), None);

    let flat = dir.path().join("merged.bin");
    let data = hex_to_bin(&merged, &flat, 0xFF, 0, DEFAULT_MAX_BIN_BYTES).unwrap();
    assert_eq!(data.len(), 0x1_0080);
    assert_eq!(data[0x100], 0xFF);
    assert_eq!(fs::read(&flat).unwrap(), data);
}

#[test]
fn test_hex_merge_later_file_wins() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.hex");
    let second = dir.path().join("second.hex");
    let src = dir.path().join("src.bin");

    fs::write(&src, b"AAAA").unwrap();
    bin_to_hex(&src, 0x20, Some(&first), 16).unwrap();
    fs::write(&src, b"BB").unwrap();
    bin_to_hex(&src, 0x22, Some(&second), 16).unwrap();

    let out = dir.path().join("out.hex");
    let image = merge_hex(&[first, second], &out, 16).unwrap();
    assert_eq!(image.read(0x20, 4).unwrap(), b"AABB");
}

#[test]
fn test_image_checksum_matches_flat_binary() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("fw.bin");
    let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    fs::write(&src, &payload).unwrap();

    let hex = dir.path().join("fw.hex");
    bin_to_hex(&src, 0x1000, Some(&hex), DEFAULT_RECORD_BYTES).unwrap();
    let flat = hex_to_bin(&hex, &dir.path().join("fw.out"), 0xFF, 0, DEFAULT_MAX_BIN_BYTES).unwrap();

    let crc = Crc::from(CrcPreset::Crc32);
    assert_eq!(crc.compute(&flat), crc.compute(&payload));
}

#[test]
fn test_release_version_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let storage = SimpleVersionStorage::new(dir.path(), false);
    storage.save(&Version::new(2, 3, 0)).unwrap();

    let header = dir.path().join("fw_version.h");
    let handler = VersionHandler::new(storage.clone())
        .with_exporter(CHeaderExporter::new(&header, "Release bot", "Nightly"));

    let version = handler.run(Some("4.1")).unwrap();
    assert_eq!(version, Version::new(4, 1, 0));
    assert_eq!(fs::read_to_string(storage.path()).unwrap(), "4.1.X");

    let text = fs::read_to_string(&header).unwrap();
    assert!(text.contains("#ifndef FW_VERSION_H"));
    assert!(text.contains("#define VERSION_MAJOR   4"));
    assert!(text.contains("\"4.1.0\""));
    assert!(text.contains("@author  Release bot"));
}

#[test]
fn test_manifest_version_is_semantic() {
    let version = Version::parse(env!("CARGO_PKG_VERSION")).unwrap();
    assert!(version.major >= 2022);
}
