//! Fuzz test for settings TOML parsing
//!
//! Tests that settings deserialization handles arbitrary TOML safely.

#![no_main]

use burnish_core::{BehaviorSettings, ProgramSettings, Settings, WriteRequest, WriterSettings};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let result: Result<Settings, _> = toml::from_str(data);

    if let Ok(settings) = result {
        let _ = toml::to_string(&settings);
        let _ = toml::to_string_pretty(&settings);

        // Folding into a request must never panic
        let request = settings.apply_to(WriteRequest::new());
        if settings.writer.manual_buffer_size {
            assert_eq!(request.buffer_size, Some(settings.writer.buffer_size_mb));
        }
        let _ = settings.locator();
    }

    let _: Result<WriterSettings, _> = toml::from_str(data);
    let _: Result<ProgramSettings, _> = toml::from_str(data);
    let _: Result<BehaviorSettings, _> = toml::from_str(data);

    for section in ["writer", "programs", "behavior"] {
        let wrapped = format!("[{}]\n{}", section, data);
        let _: Result<Settings, _> = toml::from_str(&wrapped);
    }
});
