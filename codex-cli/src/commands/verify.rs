//! Verify command implementation.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use codex_core::{IntegrityVerifier, PayloadCodec};
use colored::Colorize;
use tracing::{error, info};

use crate::utils::{print_summary, read_payload_file, short_hash, summary_lines, SummaryHashes};

/// Execute the verify command.
pub fn execute(file: PathBuf, expected: String) -> Result<()> {
    let transport = read_payload_file(&file)?;
    println!(
        "{} Verifying integrity against hash: {}",
        "→".cyan(),
        short_hash(expected.trim())
    );

    let payload = PayloadCodec::new()
        .decode(&transport)
        .context("Failed to decode payload")?;
    let report = IntegrityVerifier::new().verify(&payload, &expected);

    if report.valid {
        info!(soulmark = %report.actual, "Integrity verified");
        println!();
        println!("{}", "╔════════════════════════════════════════╗".green());
        println!(
            "{}",
            "║          INTEGRITY VERIFIED            ║".green().bold()
        );
        println!("{}", "╚════════════════════════════════════════╝".green());
        print_summary(&summary_lines(
            &payload,
            SummaryHashes {
                calculated: Some(&report.actual.to_hex()),
                ..Default::default()
            },
        ));
        Ok(())
    } else {
        error!(expected = %report.expected, actual = %report.actual, "Integrity failure");
        println!();
        println!("{}", "╔════════════════════════════════════════╗".red());
        println!(
            "{}",
            "║          INTEGRITY FAILURE             ║".red().bold()
        );
        println!("{}", "╚════════════════════════════════════════╝".red());
        println!();
        println!("   {} {}", "Expected:  ".dimmed(), report.expected.trim());
        println!("   {} {}", "Calculated:".dimmed(), report.actual);
        bail!("Verification failed: hash mismatch")
    }
}
