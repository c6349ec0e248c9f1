//! Finding the kiosk config files and folding them into one [`KioskConfig`].
//!
//! Two layers are read, the second winning section by section:
//! the user file (`<config dir>/config.toml`) and `kiosk.toml` in the
//! project directory. Command-line flags are applied by the binary on top.

use std::path::{Path, PathBuf};

use crate::{ConfigError, KioskConfig, Result};

const PROJECT_CONFIG_FILE: &str = "kiosk.toml";
const USER_CONFIG_FILE: &str = "config.toml";
const APP_NAME: &str = "kiosk";

/// Points the user config directory somewhere other than the platform default.
const CONFIG_DIR_ENV: &str = "KIOSK_CONFIG_DIR";

/// One candidate config file and whether it contributed to the result.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub loaded: bool,
}

impl ConfigSource {
    fn new(path: &Path, loaded: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            loaded,
        }
    }
}

/// The merged config plus a record of how it was assembled.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: KioskConfig,
    /// Every file that was looked for, user layer first.
    pub sources: Vec<ConfigSource>,
    /// Layers that existed but could not be used.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Files that actually contributed settings.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Discover, merge and validate the config for `project_dir` (or the
/// current directory).
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Like [`load_config`], with the user config directory pinned to
/// `config_dir` instead of `KIOSK_CONFIG_DIR` or the platform default.
///
/// Session timings are validated after merging, so an invalid combination
/// fails the whole load.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let user_path = config_dir
        .map(|dir| dir.join(USER_CONFIG_FILE))
        .or_else(xdg_config_path);
    let project_path = project_dir.map_or_else(
        || PathBuf::from(PROJECT_CONFIG_FILE),
        |dir| dir.join(PROJECT_CONFIG_FILE),
    );

    let mut loaded = LoadedConfig {
        config: KioskConfig::new(),
        sources: Vec::new(),
        warnings: Vec::new(),
    };
    for path in user_path.iter().chain(std::iter::once(&project_path)) {
        let source = load_layer(&mut loaded.config, path, &mut loaded.warnings);
        loaded.sources.push(source);
    }

    loaded.config.validate()?;
    Ok(loaded)
}

/// Parse a single config file.
pub fn load_config_file(path: &Path) -> Result<KioskConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    KioskConfig::from_toml(&contents)
}

/// Write `config` as TOML, creating missing parent directories.
pub fn save_config(config: &KioskConfig, path: &Path) -> Result<()> {
    let write_error = |at: &Path, source| ConfigError::WriteFile {
        path: at.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| write_error(parent, e))?;
    }
    std::fs::write(path, config.to_toml()?).map_err(|e| write_error(path, e))
}

/// Location of the user config file.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Directory holding the user config: `KIOSK_CONFIG_DIR` when set and
/// non-empty, else `<platform config dir>/kiosk`.
pub fn xdg_config_dir() -> Option<PathBuf> {
    match std::env::var(CONFIG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join(APP_NAME)),
    }
}

/// Merge one layer into `config`. Missing files are skipped quietly;
/// broken ones are skipped with a warning.
fn load_layer(config: &mut KioskConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource::new(path, false);
    }
    match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            ConfigSource::new(path, true)
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            ConfigSource::new(path, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_xdg_config_path_ends_with_app_dir() {
        if std::env::var(CONFIG_DIR_ENV).is_ok() {
            return;
        }
        if let Some(p) = xdg_config_path() {
            assert!(p.ends_with("kiosk/config.toml"));
        }
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_no_files() {
        let dir = TempDir::new().unwrap();
        let empty_config_dir = TempDir::new().unwrap();
        let loaded =
            load_config_with_options(Some(dir.path()), Some(empty_config_dir.path())).unwrap();
        assert!(loaded.config.session.is_none());
        assert!(loaded.loaded_from().is_empty());
    }

    #[test]
    fn test_load_config_layered_merge() {
        let user_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();

        fs::write(
            user_dir.path().join("config.toml"),
            r#"
[session]
timeout_ms = 600000
warning_ms = 60000

[auth]
simulated_delay_ms = 250
"#,
        )
        .unwrap();

        fs::write(
            project_dir.path().join("kiosk.toml"),
            r#"
[session]
timeout_ms = 120000
warning_ms = 10000
"#,
        )
        .unwrap();

        let loaded =
            load_config_with_options(Some(project_dir.path()), Some(user_dir.path())).unwrap();

        // Project-local overrides the user layer
        assert_eq!(loaded.config.session().timeout_ms, 120_000);
        assert_eq!(loaded.config.session().warning_ms, 10_000);
        // Sections the project didn't set survive
        assert_eq!(loaded.config.auth().simulated_delay_ms, 250);
        assert_eq!(loaded.loaded_from().len(), 2);
    }

    #[test]
    fn test_malformed_layer_warns_but_continues() {
        let dir = TempDir::new().unwrap();
        let empty_config_dir = TempDir::new().unwrap();
        fs::write(dir.path().join("kiosk.toml"), "not valid toml {{{{").unwrap();

        let loaded =
            load_config_with_options(Some(dir.path()), Some(empty_config_dir.path())).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("Failed to load"));
    }

    #[test]
    fn test_invalid_session_timings_fail_the_load() {
        let dir = TempDir::new().unwrap();
        let empty_config_dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("kiosk.toml"),
            r#"
[session]
timeout_ms = 1000
warning_ms = 5000
"#,
        )
        .unwrap();

        let err = load_config_with_options(Some(dir.path()), Some(empty_config_dir.path()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSession(_)));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        save_config(&KioskConfig::with_defaults(), &path).unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config, KioskConfig::with_defaults());
    }
}
