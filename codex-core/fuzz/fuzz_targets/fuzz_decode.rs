#![no_main]

//! Fuzz target for GCUIS payload decoding
//!
//! Arbitrary transport strings must decode or fail with a typed error, and
//! anything that decodes must fingerprint and re-encode without panicking.
//!
//! Run with: cargo +nightly fuzz run fuzz_decode

use codex_core::{IntegrityVerifier, PayloadCodec};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(transport) = std::str::from_utf8(data) else {
        return;
    };

    let codec = PayloadCodec::new();
    if let Ok(payload) = codec.decode(transport) {
        let _ = IntegrityVerifier::new().fingerprint_of(&payload);
        let _ = payload.missing_required_fields();
        let _ = payload.rights();
        let _ = payload.soul_whisper();
        let _ = codec.encode(&payload);
    }
});
