//! Decode command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use codex_core::{IntegrityVerifier, PayloadCodec};
use colored::Colorize;
use tracing::{info, warn};

use crate::utils::{
    print_summary, read_payload_file, short_hash, summary_lines, write_outputs, SummaryHashes,
};

/// Execute the decode command.
pub fn execute(file: PathBuf, output: PathBuf, strict: bool) -> Result<()> {
    let transport = read_payload_file(&file)?;
    println!(
        "{} Loaded Base64 payload: {} characters",
        "✓".green(),
        transport.len()
    );

    let payload = PayloadCodec::new()
        .decode(&transport)
        .context("Failed to decode payload")?;
    info!(keys = payload.keys().count(), "Decoded payload");

    let missing = payload.missing_required_fields();
    for field in &missing {
        warn!(path = %field.path, "Required field missing");
        eprintln!("{} {}", "warning:".yellow(), field);
    }
    if strict {
        payload.ensure_required()?;
    }

    let calculated = IntegrityVerifier::new().fingerprint_of(&payload).to_hex();
    println!(
        "{} Calculated Soulmark: {}",
        "✓".green(),
        short_hash(&calculated)
    );

    let hashes = SummaryHashes {
        calculated: Some(&calculated),
        ..Default::default()
    };
    print_summary(&summary_lines(&payload, hashes));

    let meta_path = write_outputs(&payload, &output, hashes)?;
    println!();
    println!("{} Decoded JSON saved to: {}", "✓".green(), output.display());
    println!("{} Summary written to:     {}", "✓".green(), meta_path.display());

    Ok(())
}
