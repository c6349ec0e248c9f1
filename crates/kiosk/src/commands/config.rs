//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use kiosk_config::KioskConfig;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./kiosk.toml) instead of user config
        #[arg(long)]
        local: bool,
    },

    /// Show configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(),
        ConfigCommand::Init { local } => cmd_init(local),
        ConfigCommand::Path => cmd_path(),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = kiosk_config::load_config(None)?;
    let config = &loaded.config;

    println!("# Kiosk Configuration\n");

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    let session = config.session();
    println!("Session:");
    println!("  timeout_ms: {}", session.timeout_ms);
    println!("  warning_ms: {}", session.warning_ms);
    println!();

    let data_dir = ctx
        .data_dir
        .clone()
        .unwrap_or_else(|| config.storage().effective_data_dir());
    println!("Storage:");
    println!("  data_dir: {}", data_dir.display());
    println!();

    println!("Auth:");
    println!("  simulated_delay_ms: {}", config.auth().simulated_delay_ms);
    println!();

    if !loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &loaded.warnings {
            println!("  ⚠ {}", w);
        }
        println!();
    }

    if ctx.verbose {
        println!("---\nRaw config:\n");
        println!("{}", config.to_toml()?);
    }

    Ok(())
}

fn cmd_which() -> Result<()> {
    let loaded = kiosk_config::load_config(None)?;

    println!("Config file search order (later overrides earlier):\n");
    for source in &loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }
    println!();

    Ok(())
}

fn cmd_init(local: bool) -> Result<()> {
    let path = if local {
        PathBuf::from("kiosk.toml")
    } else {
        kiosk_config::xdg_config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    kiosk_config::save_config(&KioskConfig::with_defaults(), &path)?;
    println!("✓ Created config file: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  kiosk config show    # verify configuration");
    println!("  kiosk shop           # open the shop shell");

    Ok(())
}

fn cmd_path() -> Result<()> {
    if let Some(path) = kiosk_config::xdg_config_path() {
        println!("{}", path.display());
    } else {
        eprintln!("Could not determine config directory");
    }
    Ok(())
}
