//! Codex CLI - Golden Codex provenance reader and verifier.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Usage error
  65  Verification failed (bad payload, hash mismatch, unverified image)
  66  Input file missing
  69  Registry unavailable
  74  I/O error writing outputs";

#[derive(Parser)]
#[command(name = "codex")]
#[command(author, version, about = "Golden Codex provenance reader and verifier", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    registry: RegistryArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Registry connection overrides (defaults come from CODEX_REGISTRY_* variables).
#[derive(Args, Debug, Clone, Default)]
pub struct RegistryArgs {
    /// Registry base URL
    #[arg(long, global = true, value_name = "URL")]
    pub registry: Option<String>,

    /// Registry request timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Retries for transient registry failures
    #[arg(long, global = true, value_name = "N")]
    pub retries: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a Base64 GCUIS payload file
    Decode {
        /// File holding the Base64 transport string
        #[arg(value_name = "PAYLOAD_FILE")]
        file: PathBuf,

        /// Where to write the decoded JSON
        #[arg(short, long, default_value = "decoded_codex.json")]
        output: PathBuf,

        /// Fail when required identifying fields are missing
        #[arg(long)]
        strict: bool,
    },

    /// Extract and decode the payload embedded in an image
    Extract {
        /// Image file (PNG, JPEG, WebP, ...)
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Where to write the decoded JSON
        #[arg(short, long, default_value = "extracted_codex.json")]
        output: PathBuf,
    },

    /// Check a payload file against an expected Soulmark
    Verify {
        /// File holding the Base64 transport string
        #[arg(value_name = "PAYLOAD_FILE")]
        file: PathBuf,

        /// Expected 64-character hex digest
        #[arg(value_name = "HASH")]
        hash: String,
    },

    /// Print the perceptual hash of an image
    Hash {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Thumbnail edge length (even, 2-64)
        #[arg(long, default_value_t = codex_core::phash::DEFAULT_GRID_SIZE)]
        grid_size: u32,
    },

    /// Look up similar artworks in the registry
    #[command(name = "match")]
    Match {
        /// Image to hash
        #[arg(value_name = "IMAGE", required_unless_present = "hash", conflicts_with = "hash")]
        image: Option<PathBuf>,

        /// Query with an existing hex hash instead of an image
        #[arg(long, value_name = "HEX")]
        hash: Option<String>,

        /// Maximum Hamming distance
        #[arg(long, default_value_t = codex_core::phash::matcher::DEFAULT_THRESHOLD)]
        threshold: u32,

        /// Maximum number of candidates
        #[arg(long, default_value_t = codex_core::phash::matcher::DEFAULT_LIMIT)]
        limit: usize,

        /// Print candidates as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve an image's provenance: embedded metadata, then registry lookup
    Resolve {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show registry statistics
    Stats,
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version also arrive here
            let code = if e.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_tracing(cli.verbose);

    let exit = match run(cli).await {
        Ok(()) => ExitCode::success(),
        Err(e) => ExitCode::from_anyhow(&e),
    };
    if let Some(message) = &exit.message {
        eprintln!("{} {}", "Error:".red().bold(), message);
    }
    std::process::exit(exit.code);
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Decode {
            file,
            output,
            strict,
        } => commands::decode::execute(file, output, strict),
        Commands::Extract { image, output } => commands::extract::execute(image, output),
        Commands::Verify { file, hash } => commands::verify::execute(file, hash),
        Commands::Hash { image, grid_size } => commands::hash::execute(image, grid_size),
        Commands::Match {
            image,
            hash,
            threshold,
            limit,
            json,
        } => {
            let target = match (image, hash) {
                (_, Some(hex)) => commands::matches::Target::Hash(hex),
                (Some(path), None) => commands::matches::Target::Image(path),
                (None, None) => anyhow::bail!("either IMAGE or --hash is required"),
            };
            commands::matches::execute(target, threshold, limit, json, &cli.registry).await
        }
        Commands::Resolve { image, json } => {
            commands::resolve::execute(image, json, &cli.registry).await
        }
        Commands::Stats => commands::stats::execute(&cli.registry).await,
    }
}
