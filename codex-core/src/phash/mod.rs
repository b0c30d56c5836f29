//! Perceptual fingerprints for images without embedded metadata.
//!
//! # Components
//!
//! - **Pixel sources**: an addressable RGB(A) grid, independent of how the
//!   pixels were obtained (decoded file, rendered canvas, raw buffer).
//! - **Perceptual hashing**: an average hash over a `grid × grid`
//!   luminance thumbnail, tolerant of re-encoding and resizing.
//! - **Matching**: Hamming distance, confidence tiers, and registry lookups.

pub mod matcher;
pub mod perceptual;
pub mod pixels;

pub use matcher::{
    classify, classify_best, hamming_distance, ConfidenceTier, HashMatcher, MatchCandidate,
};
pub use perceptual::*;
pub use pixels::{PixelLayout, PixelSource, RawPixels};
