//! Configuration system for the kiosk session engine.
//!
//! Provides TOML-based configuration with:
//! - Session timing (`[session]`: inactivity timeout and warning lead time)
//! - Storage location (`[storage]`: data directory, `KIOSK_DATA_DIR` override)
//! - Simulated authentication latency (`[auth]`)
//! - Config file layering (XDG user config + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, save_config,
    xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
