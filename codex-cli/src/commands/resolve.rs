//! Resolve command implementation.

use std::path::PathBuf;

use anyhow::{bail, Result};
use codex_core::{ConfidenceTier, ProvenanceResolver, VerificationOutcome};
use colored::Colorize;

use crate::utils::{print_summary, read_input, registry_from_args, summary_lines, SummaryHashes};
use crate::RegistryArgs;

/// Execute the resolve command.
pub async fn execute(image: PathBuf, json: bool, args: &RegistryArgs) -> Result<()> {
    let bytes = read_input(&image)?;
    let resolver = ProvenanceResolver::new(registry_from_args(args)?);

    let result = resolver.resolve_bytes(&bytes).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let label = match result.confidence {
            ConfidenceTier::High => result.outcome.label().green().bold(),
            ConfidenceTier::Medium => result.outcome.label().yellow().bold(),
            ConfidenceTier::Low | ConfidenceTier::None => result.outcome.label().red().bold(),
        };
        println!("{} {}", "Outcome:   ".dimmed(), label);
        println!("{} {}", "Confidence:".dimmed(), result.confidence);

        match &result.outcome {
            VerificationOutcome::VerifiedByMetadata { payload, integrity } => {
                let actual = integrity.as_ref().map(|r| r.actual.to_hex());
                print_summary(&summary_lines(
                    payload,
                    SummaryHashes {
                        calculated: actual.as_deref(),
                        embedded: integrity.as_ref().map(|r| r.expected.as_str()),
                        ..Default::default()
                    },
                ));
                match integrity {
                    Some(report) if report.valid => {
                        println!("{}", "Soulmark matches payload".green())
                    }
                    Some(_) => println!("{}", "Soulmark does NOT match payload".red().bold()),
                    None => println!("{}", "No Soulmark embedded".dimmed()),
                }
            }
            VerificationOutcome::VerifiedByHash { hash, matches } => {
                println!("{} {}", "Hash:      ".dimmed(), hash);
                for candidate in matches {
                    println!(
                        "  {:<24} {:>3} bits  {:<6}  {}",
                        candidate.id,
                        candidate.distance,
                        candidate.confidence.to_string(),
                        candidate.title.as_deref().unwrap_or("Untitled"),
                    );
                }
            }
            VerificationOutcome::Unverified { hash } => {
                if let Some(hash) = hash {
                    println!("{} {}", "Hash:      ".dimmed(), hash);
                }
            }
        }

        for line in &result.diagnostics {
            eprintln!("{} {}", "note:".dimmed(), line);
        }
    }

    if !result.is_verified() {
        bail!("Image is unverified");
    }
    Ok(())
}
