//! Fuzz test for device path normalization
//!
//! Tests that normalization handles arbitrary strings without panicking.

#![no_main]

use burnish_platform::{is_scsi_address, normalize_device_path};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let normalized = normalize_device_path(data);

    // Normalizing twice is a no-op
    assert_eq!(normalize_device_path(&normalized), normalized);

    // Bus addresses pass through untouched
    if is_scsi_address(data.trim()) {
        assert_eq!(normalized, data.trim());
    }

    if data.trim().is_empty() {
        assert!(normalized.is_empty());
    }
});
