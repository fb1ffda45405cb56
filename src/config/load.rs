// Configuration loading functionality
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::types::{AppConfig, ConfigError};

/// Environment variable that overrides config file discovery.
pub const CONFIG_ENV_VAR: &str = "MSI_THERMAL_CONFIG";

const SYSTEM_CONFIG_PATH: &str = "/etc/msi-thermal/config.toml";

/// Candidate config files, most specific first.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut config_paths: Vec<PathBuf> = Vec::new();

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        config_paths.push(PathBuf::from(path));
    }

    config_paths.push(PathBuf::from(SYSTEM_CONFIG_PATH));

    // The daemon runs as root, so the system path wins over the user one
    if let Some(config_dir) = dirs::config_dir() {
        config_paths.push(config_dir.join("msi-thermal/config.toml"));
    } else {
        log::warn!("Could not determine config directory. User-specific config will not be loaded.");
    }

    config_paths
}

/// The file settings are read from and persisted to.
///
/// This is the first existing candidate, or the explicit override, or the
/// system path when nothing exists yet.
pub fn resolve_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(path);
    }

    config_search_paths()
        .into_iter()
        .find(|path| path.exists())
        .unwrap_or_else(|| PathBuf::from(SYSTEM_CONFIG_PATH))
}

/// Load configuration from a specific file. A missing file (or no path at all)
/// yields the defaults; a file that exists but does not parse is an error.
pub fn load_config_from_path(path: Option<impl AsRef<Path>>) -> Result<AppConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(AppConfig::default());
    };
    let path = path.as_ref();

    if !path.exists() {
        log::debug!(
            "No configuration file at {}. Using default configuration.",
            path.display()
        );
        return Ok(AppConfig::default());
    }

    log::debug!("Loading config from: {}", path.display());
    let contents = fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&contents)?;
    config.validate()?;

    Ok(config)
}
