// Configuration types and structures for msi-thermal
use crate::core::{BatteryThreshold, CURVE_POINTS, Channel, FanCurve, FanProfile};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub ec: EcConfig,
    #[serde(default)]
    pub fan: FanConfig,
    #[serde(default)]
    pub battery: BatteryConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

impl AppConfig {
    /// Check the cross-field rules serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, curve) in [
            ("auto_curve", &self.fan.auto_curve),
            ("advanced_curve", &self.fan.advanced_curve),
        ] {
            if !curve.is_within_limits() {
                return Err(ConfigError::Validation(format!(
                    "fan.{name} contains a point above {}",
                    crate::core::MAX_FAN_SPEED
                )));
            }
        }

        let max_offset = i16::from(crate::core::MAX_FAN_SPEED);
        if !(-max_offset..=max_offset).contains(&self.fan.basic_offset) {
            return Err(ConfigError::Validation(format!(
                "fan.basic_offset ({}) must be between -{max_offset} and {max_offset}",
                self.fan.basic_offset
            )));
        }

        if self.battery.saturation_cutoff == 0 || self.battery.saturation_cutoff > 100 {
            return Err(ConfigError::Validation(format!(
                "battery.saturation_cutoff ({}) must be between 1 and 100",
                self.battery.saturation_cutoff
            )));
        }

        if self.daemon.battery_check_ticks == 0 {
            return Err(ConfigError::Validation(
                "daemon.battery_check_ticks must be at least 1".to_string(),
            ));
        }

        if self.daemon.poll_interval_sec == 0 {
            return Err(ConfigError::Validation(
                "daemon.poll_interval_sec must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

// Error type for config loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Refusing to overwrite {0}, it failed to load")]
    ReadOnly(PathBuf),
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct EcConfig {
    #[serde(default = "default_interface_path")]
    pub interface_path: PathBuf,
    #[serde(default)]
    pub registers: RegisterMap,
}

impl Default for EcConfig {
    fn default() -> Self {
        Self {
            interface_path: default_interface_path(),
            registers: RegisterMap::default(),
        }
    }
}

/// EC addresses and magic values for the MSI Modern 15H family
/// (Intel 10th gen and later register layout).
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RegisterMap {
    pub mode_control: u8,
    pub mode_auto_value: u8,
    pub mode_advanced_value: u8,
    pub cooler_booster: u8,
    pub cooler_booster_off_value: u8,
    pub cooler_booster_on_value: u8,
    pub battery_threshold: u8,
    pub cpu_temperature: u8,
    pub gpu_temperature: u8,
    pub cpu_fan_rpm: u8,
    pub gpu_fan_rpm: u8,
    pub cpu_curve: [u8; CURVE_POINTS],
    pub gpu_curve: [u8; CURVE_POINTS],
    pub rpm_calibration: u32,
}

impl RegisterMap {
    pub const fn curve_addresses(&self, channel: Channel) -> &[u8; CURVE_POINTS] {
        match channel {
            Channel::Cpu => &self.cpu_curve,
            Channel::Gpu => &self.gpu_curve,
        }
    }

    pub const fn temperature(&self, channel: Channel) -> u8 {
        match channel {
            Channel::Cpu => self.cpu_temperature,
            Channel::Gpu => self.gpu_temperature,
        }
    }

    pub const fn fan_rpm(&self, channel: Channel) -> u8 {
        match channel {
            Channel::Cpu => self.cpu_fan_rpm,
            Channel::Gpu => self.gpu_fan_rpm,
        }
    }
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self {
            mode_control: 0xd4,
            mode_auto_value: 0x0d,
            mode_advanced_value: 0x8d,
            cooler_booster: 0x98,
            cooler_booster_off_value: 2,
            cooler_booster_on_value: 130,
            battery_threshold: 0xbf,
            cpu_temperature: 0x68,
            gpu_temperature: 0x80,
            cpu_fan_rpm: 0xc8,
            gpu_fan_rpm: 0xca,
            cpu_curve: [0x72, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78],
            gpu_curve: [0x8a, 0x8b, 0x8c, 0x8d, 0x8e, 0x8f, 0x90],
            rpm_calibration: 478_000,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FanConfig {
    #[serde(default = "default_fan_profile")]
    pub default_profile: FanProfile,
    // Added to every Auto point to derive the Basic curve, typically -30..=30
    #[serde(default)]
    pub basic_offset: i16,
    #[serde(default = "FanCurve::auto")]
    pub auto_curve: FanCurve,
    #[serde(default = "FanCurve::advanced")]
    pub advanced_curve: FanCurve,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            default_profile: default_fan_profile(),
            basic_offset: 0,
            auto_curve: FanCurve::auto(),
            advanced_curve: FanCurve::advanced(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BatteryConfig {
    #[serde(default)]
    pub charge_threshold: BatteryThreshold,
    #[serde(default = "default_latch_delay_ms")]
    pub latch_delay_ms: u64,
    #[serde(default = "default_capacity_path")]
    pub capacity_path: PathBuf,
    #[serde(default = "default_scan_addresses")]
    pub scan_addresses: Vec<u8>,
    // EC readings at or above this are suspected stale and only used as a last resort
    #[serde(default = "default_saturation_cutoff")]
    pub saturation_cutoff: u8,
    #[serde(default = "default_status_command")]
    pub status_command: Vec<String>,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            charge_threshold: BatteryThreshold::default(),
            latch_delay_ms: default_latch_delay_ms(),
            capacity_path: default_capacity_path(),
            scan_addresses: default_scan_addresses(),
            saturation_cutoff: default_saturation_cutoff(),
            status_command: default_status_command(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    #[serde(default = "default_poll_interval_sec")]
    pub poll_interval_sec: u64,
    #[serde(default = "default_battery_check_ticks")]
    pub battery_check_ticks: u32,
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats_file_path: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_sec: default_poll_interval_sec(),
            battery_check_ticks: default_battery_check_ticks(),
            log_level: default_log_level(),
            stats_file_path: None,
        }
    }
}

fn default_interface_path() -> PathBuf {
    PathBuf::from("/sys/kernel/debug/ec/ec0/io")
}

fn default_capacity_path() -> PathBuf {
    PathBuf::from("/sys/class/power_supply/BAT1/capacity")
}

fn default_scan_addresses() -> Vec<u8> {
    vec![0xbf, 0xe2, 0xd7, 0xef, 0x68, 0x80]
}

fn default_status_command() -> Vec<String> {
    vec!["acpi".to_string(), "-b".to_string()]
}

const fn default_fan_profile() -> FanProfile {
    FanProfile::Basic
}

const fn default_latch_delay_ms() -> u64 {
    1000
}

const fn default_saturation_cutoff() -> u8 {
    95
}

const fn default_poll_interval_sec() -> u64 {
    30
}

const fn default_battery_check_ticks() -> u32 {
    5
}

const fn default_log_level() -> LogLevel {
    LogLevel::Info
}
