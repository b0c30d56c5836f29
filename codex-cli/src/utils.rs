//! Common utility functions shared across CLI commands.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use codex_core::{HttpRegistry, MetadataPayload, RegistryConfig};
use colored::Colorize;
use serde_json::Value;
use tracing::debug;

use crate::RegistryArgs;

/// Fallback name for outputs of payloads without a usable artifact ID.
const DEFAULT_ARTIFACT_NAME: &str = "golden_codex";

const RULE_WIDTH: usize = 60;

/// Read an input file, tagging failures for exit-code mapping.
pub fn read_input(path: &Path) -> Result<Vec<u8>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    debug!(path = %path.display(), bytes = bytes.len(), "Read file");
    Ok(bytes)
}

/// Read a Base64 transport string from a text file.
pub fn read_payload_file(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(text.trim().to_string())
}

/// Build a registry client from flags, falling back to the environment.
pub fn registry_from_args(args: &RegistryArgs) -> Result<HttpRegistry> {
    let mut config = RegistryConfig::default();
    if let Some(url) = &args.registry {
        config.base_url = url.clone();
    }
    if let Some(secs) = args.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(retries) = args.retries {
        config.max_retries = retries;
    }
    debug!(base_url = %config.base_url, "Using registry");
    HttpRegistry::with_config(config).context("Registry client could not be created")
}

/// `0123456789abcdef...fedcba9876543210` form for long digests.
pub fn short_hash(hash: &str) -> String {
    if hash.len() <= 32 || !hash.is_ascii() {
        return hash.to_string();
    }
    format!("{}...{}", &hash[..16], &hash[hash.len() - 16..])
}

/// Return a filesystem-safe artifact identifier.
///
/// Alphanumerics, `-` and `_` are kept; everything else becomes `_`, and
/// leading or trailing underscores are trimmed.
pub fn sanitize_artifact_id(artifact_id: Option<&str>, fallback: &str) -> String {
    let candidate = artifact_id
        .filter(|id| !id.is_empty())
        .or(Some(fallback).filter(|f| !f.is_empty()))
        .unwrap_or(DEFAULT_ARTIFACT_NAME)
        .trim();

    let safe: String = candidate
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let sanitized = safe.trim_matches('_');
    if sanitized.is_empty() {
        DEFAULT_ARTIFACT_NAME.to_string()
    } else {
        sanitized.to_string()
    }
}

/// Hashes shown alongside a payload summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct SummaryHashes<'a> {
    pub calculated: Option<&'a str>,
    pub embedded: Option<&'a str>,
    pub soulmark: Option<&'a str>,
}

/// Compose summary lines for console output and the meta file.
pub fn summary_lines(payload: &MetadataPayload, hashes: SummaryHashes<'_>) -> Vec<String> {
    let field = |path: &str| display_value(payload.get_path(path));
    let ids = payload.identifiers();

    let mut lines = vec![
        "=".repeat(RULE_WIDTH),
        "Golden Codex Summary".to_string(),
        "=".repeat(RULE_WIDTH),
        format!("Schema Version:  {}", field("schemaVersion")),
        format!("Agent:           {}", field("agent")),
        format!(
            "Artifact ID:     {}",
            ids.artifact_id.as_deref().unwrap_or("N/A")
        ),
        format!("Codex ID:        {}", ids.codex_id.as_deref().unwrap_or("N/A")),
    ];

    if payload.get_path("timestamp").is_some() {
        lines.push(format!("Initiated:       {}", field("timestamp.initiated")));
        lines.push(format!("Enriched:        {}", field("timestamp.enriched")));
    }
    if payload.get_path("coreIdentity").is_some() {
        lines.push(format!("Title:           {}", field("coreIdentity.title")));
        lines.push(format!("Creator:         {}", field("coreIdentity.creator")));
    } else if let Some(title) = payload.title() {
        lines.push(format!("Title:           {title}"));
    }
    if payload.get_path("archival").is_some() {
        lines.push(format!("Institution:     {}", field("archival.institution")));
    }

    if let Some(hash) = hashes.calculated {
        lines.push(format!("Calculated Hash: {hash}"));
    }
    if let Some(hash) = hashes.embedded {
        lines.push(format!("Embedded Hash:   {hash}"));
    }
    if let Some(hash) = hashes.soulmark {
        lines.push(format!("Soulmark:        {hash}"));
    }

    lines.push("=".repeat(RULE_WIDTH));
    lines
}

fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "N/A".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Print summary lines, highlighting the banner.
pub fn print_summary(lines: &[String]) {
    println!();
    for line in lines {
        if line.starts_with('=') {
            println!("{}", line.dimmed());
        } else if line == "Golden Codex Summary" {
            println!("{}", line.yellow().bold());
        } else {
            println!("{line}");
        }
    }
}

/// Write the decoded JSON and a `<artifactId>_meta.txt` summary beside it.
///
/// Returns the meta file path.
pub fn write_outputs(
    payload: &MetadataPayload,
    output: &Path,
    hashes: SummaryHashes<'_>,
) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(payload.as_value())
        .context("Failed to write decoded JSON")?;
    std::fs::write(output, json + "\n")
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let mut summary = summary_lines(payload, hashes).join("\n");
    summary.push_str(&format!("\nWritten:         {}\n", Utc::now().to_rfc3339()));

    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(DEFAULT_ARTIFACT_NAME);
    let artifact_id = sanitize_artifact_id(payload.identifiers().artifact_id.as_deref(), stem);
    let meta_path = output.with_file_name(format!("{artifact_id}_meta.txt"));

    std::fs::write(&meta_path, summary)
        .with_context(|| format!("Failed to write {}", meta_path.display()))?;
    debug!(json = %output.display(), meta = %meta_path.display(), "Wrote outputs");

    Ok(meta_path)
}
