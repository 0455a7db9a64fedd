//! Fuzz test for progress line decomposition
//!
//! Tests that the anchor search never panics on arbitrary text.

#![no_main]

use burnish_core::parse_progress_line;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Some(progress) = parse_progress_line(data) {
        assert!(progress.fifo <= 100);
        // Every anchor was present
        assert!(data.contains(':'));
        assert!(data.contains("of"));
        assert!(data.contains("MB"));
        assert!(data.contains("fifo"));
        assert!(data.contains('%'));
    }
});
