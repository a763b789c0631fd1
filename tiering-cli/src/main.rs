//! Tiering CLI Entry Point
//!
//! Configuration is loaded from environment variables (via .env file).
//! Command-line arguments override environment variables.
//!
//! Usage:
//!   tiering --catalog c.json run --group tiers      - Sweep a tier group
//!   tiering --catalog c.json restage --object /z/o  - Restage an object
//!   tiering --catalog c.json touch --object /z/o    - Update access time
//!   tiering --catalog c.json topology --group tiers - Show resolved tiers

use clap::Parser;
use tiering_cli::{handler, Cli};
use tiering_core::{init_logging, LogConfig, LogLevel};

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if cli.verbose {
        let config = LogConfig::from_env()
            .with_level(LogLevel::Debug)
            .with_target("tiering-cli")
            .with_stderr();
        if let Err(e) = init_logging(&config) {
            eprintln!("Warning: {}", e);
        }
    }

    if let Err(e) = handler::run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
