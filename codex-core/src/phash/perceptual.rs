//! Perceptual hashing for images.
//!
//! This module provides perceptual hash computation for finding an artwork
//! in the registry after its embedded metadata was stripped, or after it
//! was re-encoded, compressed, or resized.
//!
//! # Algorithm
//!
//! An average hash over a `grid × grid` thumbnail:
//!
//! 1. Box-average the source into `grid × grid` cells.
//! 2. Convert each cell to luminance, `Y = 0.299R + 0.587G + 0.114B`,
//!    rounded to the nearest integer.
//! 3. Take the mean luminance of all cells.
//! 4. Emit one bit per cell in row-major order: `1` if `Y >= mean`.
//! 5. Pack bits four at a time into hex nibbles, most significant first.
//!
//! All arithmetic is integral, so the hash is a pure function of the pixels
//! and the grid size. The default grid of 16 gives 256 bits (64 hex chars).
//!
//! # Usage
//!
//! ```no_run
//! use codex_core::phash::PerceptualHasher;
//!
//! let image_data = std::fs::read("artwork.png").unwrap();
//! let hasher = PerceptualHasher::default();
//! let hash1 = hasher.hash_bytes(&image_data).unwrap();
//!
//! let image_data2 = std::fs::read("artwork-copy.jpg").unwrap();
//! let hash2 = hasher.hash_bytes(&image_data2).unwrap();
//! let distance = hash1.distance(&hash2).unwrap();
//! let similar = distance <= 10;
//! ```

use std::fmt;

use serde::Serialize;

use super::matcher::hamming_distance;
use super::pixels::PixelSource;
use crate::error::{CodexError, Result};

/// Default thumbnail edge length.
pub const DEFAULT_GRID_SIZE: u32 = 16;

/// Largest accepted thumbnail edge length.
pub const MAX_GRID_SIZE: u32 = 64;

/// A perceptual hash as `grid² / 4` lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PerceptualHash {
    hex: String,
    grid_size: u32,
}

impl PerceptualHash {
    /// Parse a hex hash, inferring the grid size from its length.
    ///
    /// The length must correspond to a square grid of even edge length.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.trim().to_ascii_lowercase();
        if hex.is_empty() {
            return Err(CodexError::InvalidHash("empty hash".into()));
        }
        if let Some(bad) = hex.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(CodexError::InvalidHash(format!(
                "character {bad:?} is not hex"
            )));
        }

        let grid_size = grid_size_for_hex_len(hex.len()).ok_or_else(|| {
            CodexError::InvalidHash(format!(
                "{} hex characters do not form a square grid",
                hex.len()
            ))
        })?;

        Ok(Self { hex, grid_size })
    }

    pub fn as_hex(&self) -> &str {
        &self.hex
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    /// Number of bits in the hash (`grid²`).
    pub fn bit_len(&self) -> u32 {
        self.grid_size * self.grid_size
    }

    /// Hamming distance to another hash of the same grid size.
    pub fn distance(&self, other: &Self) -> Result<u32> {
        hamming_distance(&self.hex, &other.hex)
    }

    /// Whether two hashes are within `threshold` bits (default 10).
    pub fn is_similar(&self, other: &Self, threshold: Option<u32>) -> Result<bool> {
        let threshold = threshold.unwrap_or(10);
        Ok(self.distance(other)? <= threshold)
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

/// Perceptual hasher configuration and computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerceptualHasher {
    grid_size: u32,
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
        }
    }
}

impl PerceptualHasher {
    /// Create a hasher for a `grid_size × grid_size` thumbnail.
    pub fn new(grid_size: u32) -> Result<Self> {
        if grid_size < 2 || grid_size > MAX_GRID_SIZE || grid_size % 2 != 0 {
            return Err(CodexError::InvalidGridSize(grid_size));
        }
        Ok(Self { grid_size })
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    /// Hash any pixel source.
    pub fn hash<P: PixelSource + ?Sized>(&self, source: &P) -> Result<PerceptualHash> {
        let luma = self.luminance_grid(source)?;

        let cells = luma.len() as u64;
        let total: u64 = luma.iter().map(|&y| u64::from(y)).sum();

        // y >= total / cells, without leaving integers
        let bits = luma.iter().map(|&y| u64::from(y) * cells >= total);

        Ok(PerceptualHash {
            hex: pack_bits(bits),
            grid_size: self.grid_size,
        })
    }

    /// Resample `source` into a row-major grid of luminance values.
    fn luminance_grid<P: PixelSource + ?Sized>(&self, source: &P) -> Result<Vec<u8>> {
        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            return Err(CodexError::InvalidPixelBuffer("image has no pixels".into()));
        }

        let grid = u64::from(self.grid_size);
        let mut luma = Vec::with_capacity((grid * grid) as usize);

        for cy in 0..grid {
            let (y0, y1) = cell_span(cy, grid, u64::from(height));
            for cx in 0..grid {
                let (x0, x1) = cell_span(cx, grid, u64::from(width));

                let mut sum = [0u64; 3];
                for y in y0..y1 {
                    for x in x0..x1 {
                        let [r, g, b] = source.rgb(x as u32, y as u32);
                        sum[0] += u64::from(r);
                        sum[1] += u64::from(g);
                        sum[2] += u64::from(b);
                    }
                }

                let count = (y1 - y0) * (x1 - x0);
                let avg = sum.map(|channel| (channel + count / 2) / count);
                luma.push(luminance(avg));
            }
        }

        Ok(luma)
    }

    /// Get the configured grid size in bits.
    pub fn bit_len(&self) -> u32 {
        self.grid_size * self.grid_size
    }
}

#[cfg(feature = "image")]
impl PerceptualHasher {
    /// Decode encoded image bytes and hash them.
    ///
    /// Supports JPEG, PNG, GIF, and WebP formats.
    pub fn hash_bytes(&self, image_data: &[u8]) -> Result<PerceptualHash> {
        let image = image::load_from_memory(image_data)
            .map_err(|e| CodexError::ImageDecode(format!("Failed to decode image: {e}")))?;

        self.hash_image(&image)
    }

    /// Hash a decoded image.
    pub fn hash_image(&self, image: &image::DynamicImage) -> Result<PerceptualHash> {
        self.hash(&image.to_rgb8())
    }

    /// Check if the provided bytes appear to be a supported image format.
    pub fn is_supported_format(data: &[u8]) -> bool {
        image::guess_format(data).is_ok()
    }
}

/// Compute a default-grid perceptual hash for encoded image bytes.
///
/// Returns `None` if the data is not a decodable image.
#[cfg(feature = "image")]
pub fn compute_phash(image_data: &[u8]) -> Option<PerceptualHash> {
    PerceptualHasher::default().hash_bytes(image_data).ok()
}

/// Half-open source range covered by cell `index` of `cells`.
///
/// Every cell covers at least one source pixel, so sources smaller than the
/// grid are sampled nearest-neighbour style.
fn cell_span(index: u64, cells: u64, extent: u64) -> (u64, u64) {
    let start = index * extent / cells;
    let end = ((index + 1) * extent / cells).max(start + 1);
    (start, end)
}

/// ITU-R BT.601 luma, rounded half up.
fn luminance([r, g, b]: [u64; 3]) -> u8 {
    let y = (299 * r + 587 * g + 114 * b + 500) / 1000;
    y.min(255) as u8
}

fn pack_bits(bits: impl Iterator<Item = bool>) -> String {
    let bits: Vec<bool> = bits.collect();
    bits.chunks(4)
        .map(|nibble| {
            let value = nibble
                .iter()
                .fold(0u32, |acc, &bit| (acc << 1) | u32::from(bit));
            char::from_digit(value, 16).unwrap_or('0')
        })
        .collect()
}

fn grid_size_for_hex_len(len: usize) -> Option<u32> {
    let bits = len.checked_mul(4)?;
    let edge = (bits as f64).sqrt().round() as usize;
    let valid = edge * edge == bits && edge % 2 == 0 && edge >= 2 && edge <= MAX_GRID_SIZE as usize;
    valid.then_some(edge as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phash::pixels::{PixelLayout, RawPixels};

    /// Solid-colour or patterned RGB source for tests.
    struct FnSource<F: Fn(u32, u32) -> [u8; 3]> {
        width: u32,
        height: u32,
        f: F,
    }

    impl<F: Fn(u32, u32) -> [u8; 3]> PixelSource for FnSource<F> {
        fn dimensions(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
            (self.f)(x, y)
        }
    }

    #[test]
    fn test_default_grid_size() {
        let hasher = PerceptualHasher::default();
        assert_eq!(hasher.grid_size(), 16);
        assert_eq!(hasher.bit_len(), 256);
    }

    #[test]
    fn test_invalid_grid_sizes() {
        for size in [0, 1, 3, 15, 66] {
            assert!(matches!(
                PerceptualHasher::new(size),
                Err(CodexError::InvalidGridSize(_))
            ));
        }
        assert!(PerceptualHasher::new(8).is_ok());
    }

    #[test]
    fn test_hash_length_matches_grid() {
        let source = FnSource {
            width: 40,
            height: 30,
            f: |x, y| [(x * 6) as u8, (y * 8) as u8, 0],
        };
        for grid in [2, 8, 16, 32] {
            let hash = PerceptualHasher::new(grid).unwrap().hash(&source).unwrap();
            assert_eq!(hash.as_hex().len(), (grid * grid / 4) as usize);
            assert_eq!(hash.grid_size(), grid);
        }
    }

    #[test]
    fn test_uniform_image_sets_every_bit() {
        let source = FnSource {
            width: 10,
            height: 10,
            f: |_, _| [120, 40, 200],
        };
        let hash = PerceptualHasher::default().hash(&source).unwrap();
        assert_eq!(hash.as_hex(), "f".repeat(64));
    }

    #[test]
    fn test_left_half_bright_packs_msb_first() {
        // 2x2 grid: bright left column, dark right column -> bits 1010 -> "a"
        let source = FnSource {
            width: 4,
            height: 4,
            f: |x, _| if x < 2 { [255, 255, 255] } else { [0, 0, 0] },
        };
        let hash = PerceptualHasher::new(2).unwrap().hash(&source).unwrap();
        assert_eq!(hash.as_hex(), "a");
    }

    #[test]
    fn test_row_major_order() {
        // 4x4 grid, only the top row bright -> 1111 0000 0000 0000
        let source = FnSource {
            width: 8,
            height: 8,
            f: |_, y| if y < 2 { [250, 250, 250] } else { [10, 10, 10] },
        };
        let hash = PerceptualHasher::new(4).unwrap().hash(&source).unwrap();
        assert_eq!(hash.as_hex(), "f000");
    }

    #[test]
    fn test_source_smaller_than_grid() {
        let data = [255, 255, 255, 0, 0, 0];
        let pixels = RawPixels::new(2, 1, PixelLayout::Rgb, &data).unwrap();
        let hash = PerceptualHasher::new(4).unwrap().hash(&pixels).unwrap();
        // Each row: two bright cells then two dark cells -> "c" per row
        assert_eq!(hash.as_hex(), "cccc");
    }

    #[test]
    fn test_empty_source_rejected() {
        let pixels = RawPixels::rgba(0, 0, &[]).unwrap();
        assert!(PerceptualHasher::default().hash(&pixels).is_err());
    }

    #[test]
    fn test_luminance_weights() {
        assert_eq!(luminance([255, 255, 255]), 255);
        assert_eq!(luminance([0, 0, 0]), 0);
        assert_eq!(luminance([255, 0, 0]), 76);
        assert_eq!(luminance([0, 255, 0]), 150);
        assert_eq!(luminance([0, 0, 255]), 29);
    }

    #[test]
    fn test_hash_deterministic() {
        let source = FnSource {
            width: 64,
            height: 48,
            f: |x, y| [((x * y) % 256) as u8, (x * 3) as u8, (y * 5) as u8],
        };
        let hasher = PerceptualHasher::default();
        assert_eq!(hasher.hash(&source).unwrap(), hasher.hash(&source).unwrap());
    }

    #[test]
    fn test_from_hex_infers_grid() {
        let hash = PerceptualHash::from_hex(&"AB".repeat(32)).unwrap();
        assert_eq!(hash.grid_size(), 16);
        assert_eq!(hash.bit_len(), 256);
        assert_eq!(hash.as_hex(), "ab".repeat(32));

        assert_eq!(PerceptualHash::from_hex("a").unwrap().grid_size(), 2);
        assert_eq!(PerceptualHash::from_hex("f000").unwrap().grid_size(), 4);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(PerceptualHash::from_hex("").is_err());
        assert!(PerceptualHash::from_hex("xyz").is_err());
        // 3 chars = 12 bits, not a square
        assert!(PerceptualHash::from_hex("abc").is_err());
        // 16 chars = 64 bits = 8x8, valid
        assert!(PerceptualHash::from_hex("deadbeefcafebabe").is_ok());
    }

    #[test]
    fn test_perceptual_hash_similarity() {
        let hash1 = PerceptualHash::from_hex(&"0".repeat(64)).unwrap();
        let hash2 = PerceptualHash::from_hex(&format!("1{}", "0".repeat(63))).unwrap();

        // 1 bit difference, within default threshold of 10
        assert!(hash1.is_similar(&hash2, None).unwrap());

        // With threshold of 0, not similar
        assert!(!hash1.is_similar(&hash2, Some(0)).unwrap());
    }

    #[test]
    fn test_grid_mismatch_is_an_error() {
        let small = PerceptualHash::from_hex("deadbeefcafebabe").unwrap();
        let large = PerceptualHash::from_hex(&"0".repeat(64)).unwrap();
        assert!(matches!(
            small.distance(&large),
            Err(CodexError::IncompatibleHashLengths { left: 16, right: 64 })
        ));
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_is_supported_format() {
        // PNG magic bytes
        assert!(PerceptualHasher::is_supported_format(&[
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A
        ]));

        // JPEG magic bytes
        assert!(PerceptualHasher::is_supported_format(&[0xFF, 0xD8, 0xFF]));

        // Invalid
        assert!(!PerceptualHasher::is_supported_format(&[0x00, 0x00, 0x00]));
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_hash_bytes_rejects_non_image() {
        assert!(matches!(
            PerceptualHasher::default().hash_bytes(b"definitely not an image"),
            Err(CodexError::ImageDecode(_))
        ));
        assert!(compute_phash(b"nope").is_none());
    }
}
