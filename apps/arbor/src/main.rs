//! # Arbor - Reactive Result Store
//!
//! The command line for the Arbor result store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            apps/arbor (THE BINARY)          │
//! │                                             │
//! │  ┌─────────────┐      ┌──────────────────┐  │
//! │  │   CLI       │      │  fs provider     │  │
//! │  │  (clap)     │      │  (DirListing)    │  │
//! │  └──────┬──────┘      └────────┬─────────┘  │
//! │         └──────────┬───────────┘            │
//! │                    ▼                        │
//! │            ┌───────────────┐                │
//! │            │  arbor-core   │                │
//! │            │ (THE LOGIC)   │                │
//! │            └───────────────┘                │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! arbor ls ./src --depth 2
//! arbor load -f records.json --ns app/import/row
//! arbor --json-mode config
//! ```

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // ARBOR_LOG_FORMAT=json enables machine-parseable logs. Logs go to stderr.
    let log_format = std::env::var("ARBOR_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "arbor=info,arbor_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = arbor::cli::Cli::parse();

    if let Err(e) = arbor::cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
