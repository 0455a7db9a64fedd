//! Fuzz test for output line splitting
//!
//! Tests that arbitrary chunking produces the same lines as a single chunk.

#![no_main]

use arbitrary::Arbitrary;
use burnish_core::LineSplitter;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct SplitInput {
    data: Vec<u8>,
    chunk: u8,
}

fuzz_target!(|input: SplitInput| {
    let chunk = usize::from(input.chunk.max(1));

    let mut whole = LineSplitter::new();
    let mut expected = whole.push(&input.data);
    expected.extend(whole.finish());

    let mut split = LineSplitter::new();
    let mut lines = Vec::new();
    for part in input.data.chunks(chunk) {
        lines.extend(split.push(part));
    }
    lines.extend(split.finish());

    for line in &lines {
        assert!(!line.is_empty());
        assert!(!line.contains('\n') && !line.contains('\r'));
    }
    // Lossy decoding can differ when a multi-byte sequence straddles chunks,
    // so only the line count is compared
    assert_eq!(lines.len(), expected.len());
});
