//! Integration tests for firmware artifact selection

use std::fs;

use jigctl::hardware::firmware::{device_firmware_version, firmware_digest, select_firmware, FirmwareCache};
use pretty_assertions::assert_eq;

#[test]
fn test_lexicographic_max_wins() {
    let dir = tempfile::tempdir().unwrap();
    for name in [
        "playtron-firmware_v1.2.3.uf2",
        "playtron-firmware_v1.10.0.uf2",
        "playtron-firmware_v2.0.0.uf2",
        "playtron-firmware_v9.9.9.bin",
        "notes.txt",
    ] {
        fs::write(dir.path().join(name), name).unwrap();
    }
    fs::create_dir(dir.path().join("playtron-firmware_v9.0.0.uf2")).unwrap();

    let selected = select_firmware(dir.path()).unwrap().unwrap();
    assert_eq!(selected.file_name().unwrap(), "playtron-firmware_v2.0.0.uf2");
}

#[test]
fn test_lexicographic_not_semantic() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("playtron-firmware_v1.10.0.uf2"), b"a").unwrap();
    fs::write(dir.path().join("playtron-firmware_v1.9.0.uf2"), b"b").unwrap();
    let selected = select_firmware(dir.path()).unwrap().unwrap();
    assert_eq!(selected.file_name().unwrap(), "playtron-firmware_v1.9.0.uf2");
}

#[test]
fn test_empty_and_missing_dirs() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(select_firmware(dir.path()).unwrap(), None);
    assert_eq!(select_firmware(&dir.path().join("nope")).unwrap(), None);
}

#[test]
fn test_cache_reselects_when_file_disappears() {
    let dir = tempfile::tempdir().unwrap();
    let newest = dir.path().join("playtron-firmware_v1.2.3.uf2");
    let older = dir.path().join("playtron-firmware_v1.0.0.uf2");
    fs::write(&newest, b"new").unwrap();
    fs::write(&older, b"old").unwrap();

    let mut cache = FirmwareCache::new(dir.path());
    assert_eq!(cache.get().unwrap(), Some(newest.clone()));

    // A newer artifact does not replace a cached one that still exists
    fs::write(dir.path().join("playtron-firmware_v3.0.0.uf2"), b"x").unwrap();
    assert_eq!(cache.get().unwrap(), Some(newest.clone()));

    fs::remove_file(&newest).unwrap();
    assert_eq!(
        cache.get().unwrap(),
        Some(dir.path().join("playtron-firmware_v3.0.0.uf2"))
    );
}

#[test]
fn test_versions_for_lcd() {
    assert_eq!(device_firmware_version("playtron-firmware_v1.2.3.uf2").unwrap(), "1.02.03");
    assert_eq!(device_firmware_version("playtron-firmware_v0.10.7.uf2").unwrap(), "0.10.07");
    assert_eq!(device_firmware_version("playtron-firmware_v10.123.4567.uf2").unwrap(), "0.23.67");
}

#[test]
fn test_digest_is_sha256_hex() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("playtron-firmware_v1.2.3.uf2");
    fs::write(&path, b"abc").unwrap();
    assert_eq!(
        firmware_digest(&path).unwrap(),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}
