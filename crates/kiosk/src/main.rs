//! Kiosk - session lifecycle and per-user cache engine
//!
//! Main entry point for the kiosk CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{config, shop};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Kiosk - session lifecycle and per-user cache engine
#[derive(Parser)]
#[command(name = "kiosk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Data directory (overrides config and KIOSK_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open the interactive shop shell
    Shop(shop::ShopArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "kiosk=debug,kiosk_session=debug,kiosk_store=debug,kiosk_auth=debug,kiosk_config=debug,info"
    } else {
        "kiosk=info,kiosk_auth=info,kiosk_store=warn,kiosk_session=warn,warn"
    };

    let log_dir = kiosk_config::xdg_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "kiosk.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(concat!(
                    "kiosk=trace,kiosk_session=trace,kiosk_store=trace,",
                    "kiosk_auth=trace,kiosk_config=trace,info",
                ))),
        )
        .init();

    let ctx = commands::Context {
        verbose: cli.verbose,
        data_dir: cli.data_dir,
    };

    match cli.command {
        Commands::Shop(args) => shop::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
