//! Stats command implementation.

use anyhow::{Context, Result};
use codex_core::SimilarityRegistry;
use colored::Colorize;

use crate::utils::registry_from_args;
use crate::RegistryArgs;

/// Execute the stats command.
pub async fn execute(args: &RegistryArgs) -> Result<()> {
    let registry = registry_from_args(args)?;
    let stats = registry
        .stats()
        .await
        .context("Registry stats unavailable")?;

    println!(
        "{} {}",
        "Artworks indexed:".dimmed(),
        stats.total_artworks.to_string().bold()
    );
    Ok(())
}
