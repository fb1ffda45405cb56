use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info};

use crate::config::load::load_config_from_path;
use crate::config::types::{AppConfig, ConfigError};
use crate::core::{BatteryThreshold, FanProfile};

/// Persisted user choices the controllers read from and write back to.
pub trait SettingsStore {
    fn default_profile(&self) -> FanProfile;

    fn set_default_profile(&mut self, profile: FanProfile) -> Result<(), ConfigError>;

    fn battery_threshold(&self) -> BatteryThreshold;

    fn set_battery_threshold(&mut self, threshold: BatteryThreshold) -> Result<(), ConfigError>;

    fn fan_offset(&self) -> i16;
}

/// A TOML-backed settings store. Every setter persists the whole typed record
/// atomically (temp file + rename).
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    config: AppConfig,
    // Set when the file on disk failed to load; it must not be overwritten
    read_only: bool,
}

impl ConfigStore {
    pub fn open_at(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = load_config_from_path(Some(&path))?;
        Ok(Self {
            path,
            config,
            read_only: false,
        })
    }

    /// Open the store at `path`, or fall back to in-memory defaults if the
    /// file does not load. The fallback never writes, so a broken file is
    /// left for the user to fix.
    pub fn open_or_defaults(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::open_at(&path) {
            Ok(store) => store,
            Err(e) => {
                error!(
                    "Error loading configuration from {}: {e}. Using default values, changes will not be saved.",
                    path.display()
                );
                Self {
                    path,
                    config: AppConfig::default(),
                    read_only: true,
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Write the current record to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        if self.read_only {
            return Err(ConfigError::ReadOnly(self.path.clone()));
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let contents = toml::to_string_pretty(&self.config)?;
        let temp_path = self.path.with_extension("toml.tmp");

        fs::write(&temp_path, contents)?;
        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        debug!("Configuration saved to {}", self.path.display());
        Ok(())
    }
}

impl SettingsStore for ConfigStore {
    fn default_profile(&self) -> FanProfile {
        self.config.fan.default_profile
    }

    fn set_default_profile(&mut self, profile: FanProfile) -> Result<(), ConfigError> {
        self.config.fan.default_profile = profile;
        self.save()?;
        info!("Default fan profile set to {profile}");
        Ok(())
    }

    fn battery_threshold(&self) -> BatteryThreshold {
        self.config.battery.charge_threshold
    }

    fn set_battery_threshold(&mut self, threshold: BatteryThreshold) -> Result<(), ConfigError> {
        self.config.battery.charge_threshold = threshold;
        self.save()?;
        info!("Battery charge threshold set to {threshold}");
        Ok(())
    }

    fn fan_offset(&self) -> i16 {
        self.config.fan.basic_offset
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters_persist_and_keep_other_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "[fan]\nbasic_offset = 12\n\n[daemon]\npoll_interval_sec = 10\n",
        )
        .unwrap();

        let mut store = ConfigStore::open_at(&path).unwrap();
        assert_eq!(store.fan_offset(), 12);

        store.set_default_profile(FanProfile::Advanced).unwrap();
        store
            .set_battery_threshold(BatteryThreshold::new(75).unwrap())
            .unwrap();

        let reopened = ConfigStore::open_at(&path).unwrap();
        assert_eq!(reopened.default_profile(), FanProfile::Advanced);
        assert_eq!(reopened.battery_threshold().percent(), 75);
        assert_eq!(reopened.fan_offset(), 12);
        assert_eq!(reopened.config().daemon.poll_interval_sec, 10);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_save_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/config.toml");

        let mut store = ConfigStore::open_at(&path).unwrap();
        assert_eq!(store.default_profile(), FanProfile::Basic);
        store.set_default_profile(FanProfile::Auto).unwrap();

        assert!(path.exists());
        assert_eq!(
            ConfigStore::open_at(&path).unwrap().default_profile(),
            FanProfile::Auto
        );
    }

    #[test]
    fn test_unloadable_file_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let original = "[fan]\nbasic_offset = 12\n\n[battery]\nsaturation_cutoff = 0\n";
        fs::write(&path, original).unwrap();
        assert!(ConfigStore::open_at(&path).is_err());

        let mut store = ConfigStore::open_or_defaults(&path);
        assert!(store.is_read_only());
        assert_eq!(store.config(), &AppConfig::default());

        assert!(matches!(
            store.set_default_profile(FanProfile::Auto),
            Err(ConfigError::ReadOnly(_))
        ));
        assert!(
            store
                .set_battery_threshold(BatteryThreshold::new(80).unwrap())
                .is_err()
        );

        assert_eq!(fs::read_to_string(&path).unwrap(), original);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_broken_toml_falls_back_without_saving() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[fan\n").unwrap();

        let store = ConfigStore::open_or_defaults(&path);
        assert!(store.is_read_only());
        assert!(store.save().is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[fan\n");
    }

    #[test]
    fn test_missing_file_opens_writable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut store = ConfigStore::open_or_defaults(&path);
        assert!(!store.is_read_only());
        store.set_default_profile(FanProfile::Advanced).unwrap();
        assert!(path.exists());
    }
}
