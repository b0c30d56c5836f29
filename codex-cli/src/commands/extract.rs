//! Extract command implementation.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use codex_core::extract::extract_embedded;
use codex_core::{IntegrityVerifier, PayloadCodec};
use colored::Colorize;
use tracing::{error, info};

use crate::utils::{
    print_summary, read_input, short_hash, summary_lines, write_outputs, SummaryHashes,
};

/// Execute the extract command.
pub fn execute(image: PathBuf, output: PathBuf) -> Result<()> {
    let bytes = read_input(&image)?;

    let embedded = extract_embedded(&bytes)
        .with_context(|| format!("No payload in {}", image.display()))?;
    println!(
        "{} Extracted {} characters",
        "✓".green(),
        embedded.payload.len()
    );
    if let Some(hash) = &embedded.codex_hash {
        println!("{} Found GoldenCodexHash: {}", "✓".green(), short_hash(hash));
    }
    if let Some(hash) = &embedded.soulmark {
        println!("{} Found Soulmark:        {}", "✓".green(), short_hash(hash));
    }

    let payload = PayloadCodec::new()
        .decode(&embedded.payload)
        .context("Failed to decode embedded payload")?;
    info!(keys = payload.keys().count(), "Decoded embedded payload");

    let verifier = IntegrityVerifier::new();
    let calculated = verifier.fingerprint_of(&payload).to_hex();
    let hashes = SummaryHashes {
        calculated: Some(&calculated),
        embedded: embedded.codex_hash.as_deref(),
        soulmark: embedded.soulmark.as_deref(),
    };
    print_summary(&summary_lines(&payload, hashes));

    let meta_path = write_outputs(&payload, &output, hashes)?;
    println!();
    println!("{} Decoded JSON saved to: {}", "✓".green(), output.display());
    println!("{} Summary written to:     {}", "✓".green(), meta_path.display());

    let Some(expected) = embedded.expected_fingerprint() else {
        return Ok(());
    };
    let report = verifier.verify(&payload, expected);
    println!();
    if report.valid {
        println!("{}", "Hash verification PASSED".green().bold());
        Ok(())
    } else {
        error!(expected = %report.expected, actual = %report.actual, "Embedded hash mismatch");
        println!("{}", "Hash verification FAILED".red().bold());
        println!("   {} {}", "Expected:  ".dimmed(), report.expected);
        println!("   {} {}", "Calculated:".dimmed(), report.actual);
        bail!("Verification failed: embedded hash does not match payload")
    }
}
