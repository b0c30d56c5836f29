//! Hash command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use codex_core::PerceptualHasher;
use tracing::info;

use crate::utils::read_input;

/// Execute the hash command.
pub fn execute(image: PathBuf, grid_size: u32) -> Result<()> {
    let hasher = PerceptualHasher::new(grid_size)?;
    let bytes = read_input(&image)?;

    let hash = hasher
        .hash_bytes(&bytes)
        .with_context(|| format!("Failed to hash {}", image.display()))?;
    info!(grid_size, bits = hash.bit_len(), "Computed perceptual hash");

    println!("{hash}");
    Ok(())
}
