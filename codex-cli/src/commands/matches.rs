//! Match command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use codex_core::phash::classify_best;
use codex_core::{HashMatcher, PerceptualHash, PerceptualHasher};
use colored::Colorize;
use tracing::info;

use crate::utils::{read_input, registry_from_args};
use crate::RegistryArgs;

/// What to look up.
pub enum Target {
    Image(PathBuf),
    Hash(String),
}

/// Execute the match command.
///
/// Unlike the resolver, a failed registry call is reported as an error here
/// so the caller can tell "no matches" from "registry down".
pub async fn execute(
    target: Target,
    threshold: u32,
    limit: usize,
    json: bool,
    args: &RegistryArgs,
) -> Result<()> {
    let hash = match target {
        Target::Hash(hex) => PerceptualHash::from_hex(&hex)?,
        Target::Image(path) => {
            let bytes = read_input(&path)?;
            PerceptualHasher::default()
                .hash_bytes(&bytes)
                .with_context(|| format!("Failed to hash {}", path.display()))?
        }
    };

    let registry = registry_from_args(args)?;
    let matcher = HashMatcher::new(threshold, limit);
    let candidates = matcher
        .try_query(&hash, &registry)
        .await
        .context("Registry lookup failed")?;
    let tier = classify_best(&candidates);
    info!(candidates = candidates.len(), confidence = %tier, "Registry lookup finished");

    if json {
        println!("{}", serde_json::to_string_pretty(&candidates)?);
        return Ok(());
    }

    println!("{} {}", "Hash:".dimmed(), hash);
    if candidates.is_empty() {
        println!("{}", "No matches".yellow());
        return Ok(());
    }

    println!(
        "{} {} ({} candidates)",
        "Confidence:".dimmed(),
        tier.to_string().bold(),
        candidates.len()
    );
    println!();
    for candidate in &candidates {
        println!(
            "  {:<24} {:>3} bits  {:>6.2}%  {:<6}  {} / {}",
            candidate.id,
            candidate.distance,
            candidate.similarity * 100.0,
            candidate.confidence.to_string(),
            candidate.title.as_deref().unwrap_or("Untitled"),
            candidate.artist.as_deref().unwrap_or("Unknown"),
        );
    }
    Ok(())
}
