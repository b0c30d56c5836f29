//! Example demonstrating resolver tracing instrumentation.
//!
//! Run with: cargo run -p codex-core --example resolve_tracing -- <IMAGE>

use std::time::Duration;

use codex_core::{HttpRegistry, ProvenanceResolver, RegistryConfig};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber with debug level
    fmt()
        .with_env_filter(EnvFilter::new("codex_core=debug,info"))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    println!("=== Provenance Resolver Tracing Demo ===\n");

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: resolve_tracing <IMAGE>");
        return;
    };
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to read {path}: {e}");
            return;
        }
    };

    let config = RegistryConfig {
        timeout: Duration::from_secs(5),
        max_retries: 1,
        ..Default::default()
    };
    println!("Config: {:?}\n", config);

    let registry = match HttpRegistry::with_config(config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to create client: {}", e);
            return;
        }
    };

    let result = ProvenanceResolver::new(registry).resolve_bytes(&bytes).await;

    println!("\nOutcome:    {}", result.outcome.label());
    println!("Confidence: {}", result.confidence);
    for line in &result.diagnostics {
        println!("  - {line}");
    }
}
