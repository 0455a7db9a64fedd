//! Fuzz test for version parsing
//!
//! Tests that version strings and `-version` banners parse safely and that
//! parsed versions order consistently.

#![no_main]

use burnish_core::{derive_features, parse_version_banner, BinVersion};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(version) = data.parse::<BinVersion>() {
        let _ = version.to_string();
        assert_eq!(version.cmp(&version), std::cmp::Ordering::Equal);
        let _ = derive_features("cdrecord", &version);
    }

    if let Some((version, copyright)) = parse_version_banner(data) {
        let _ = version.to_string();
        if let Some(c) = copyright {
            assert!(data.contains(c.as_str()));
        }
    }
});
