#![no_main]

//! Fuzz target for embedded payload extraction
//!
//! Exercises the PNG chunk walker and the XMP scanner with malformed
//! containers. Extraction must never panic.
//!
//! Run with: cargo +nightly fuzz run fuzz_extract

use codex_core::extract::find_embedded;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Some(found) = find_embedded(data) {
        let _ = found.expected_fingerprint();
    }
});
