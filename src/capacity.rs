//! Battery percentage detection.
//!
//! The EC's battery registers on these machines are reverse engineered and
//! differ between firmware revisions, so several sources are tried in order:
//! the kernel's power_supply capacity, a list of candidate EC addresses, and
//! finally an external status tool such as `acpi -b`.

use crate::config::BatteryConfig;
use crate::core::{BatteryReading, CapacitySource};
use crate::ec::{ReadWidth, RegisterIo};
use crate::util::sysfs::read_sysfs_parsed;
use log::{debug, info, warn};
use regex::Regex;
use std::ops::RangeInclusive;
use std::process::Command;
use std::sync::OnceLock;

const VALID_PERCENT: RangeInclusive<u16> = 1..=100;

pub struct BatteryCapacityReader<'a> {
    ec: &'a dyn RegisterIo,
    config: &'a BatteryConfig,
}

impl<'a> BatteryCapacityReader<'a> {
    pub const fn new(ec: &'a dyn RegisterIo, config: &'a BatteryConfig) -> Self {
        Self { ec, config }
    }

    /// Resolve the current battery percentage. Never cached; every call
    /// consults the sources again.
    pub fn get_capacity(&self) -> BatteryReading {
        if let Some(percent) = self.read_os_capacity() {
            return BatteryReading {
                percent,
                source: CapacitySource::Os,
            };
        }

        let readings = scan_addresses(self.ec, &self.config.scan_addresses);
        if let Some((address, percent)) = pick_ec_reading(&readings, self.config.saturation_cutoff) {
            return BatteryReading {
                percent,
                source: CapacitySource::EcScan { address },
            };
        }

        if let Some(percent) = self.read_status_command() {
            return BatteryReading {
                percent,
                source: CapacitySource::ExternalTool,
            };
        }

        warn!("Battery capacity could not be determined from any source");
        BatteryReading::unavailable()
    }

    fn read_os_capacity(&self) -> Option<u8> {
        let path = &self.config.capacity_path;
        match read_sysfs_parsed::<u16>(path) {
            Ok(value) if VALID_PERCENT.contains(&value) => {
                debug!("Battery capacity from {}: {value}%", path.display());
                u8::try_from(value).ok()
            }
            Ok(value) => {
                debug!("Ignoring out of range capacity {value} from {}", path.display());
                None
            }
            Err(e) => {
                debug!("OS battery capacity unavailable: {e}");
                None
            }
        }
    }

    fn read_status_command(&self) -> Option<u8> {
        let (program, args) = self.config.status_command.split_first()?;

        let output = match Command::new(program).args(args).output() {
            Ok(output) => output,
            Err(e) => {
                debug!("Battery status command '{program}' could not be run: {e}");
                return None;
            }
        };

        if !output.status.success() {
            debug!("Battery status command '{program}' exited with {}", output.status);
            return None;
        }

        let percent = parse_percentage(&String::from_utf8_lossy(&output.stdout));
        if let Some(percent) = percent {
            debug!("Battery capacity from '{program}': {percent}%");
        }
        percent
    }
}

/// Read each address once and keep the plausible percentages, in scan order.
pub fn scan_addresses(ec: &dyn RegisterIo, addresses: &[u8]) -> Vec<(u8, u8)> {
    addresses
        .iter()
        .filter_map(|&address| {
            let value = ec.read(address, ReadWidth::Byte)?;
            if VALID_PERCENT.contains(&value) {
                debug!("Plausible battery value at {address:#04x}: {value}%");
                Some((address, value as u8))
            } else {
                None
            }
        })
        .collect()
}

/// Scan a whole address range for plausible battery percentages.
pub fn scan_register_space(ec: &dyn RegisterIo, range: RangeInclusive<u8>) -> Vec<(u8, u8)> {
    let addresses: Vec<u8> = range.collect();
    scan_addresses(ec, &addresses)
}

/// Pick the reading to trust from EC scan results.
///
/// Values at or above `cutoff` look like stale or fixed registers, so the
/// first reading below it wins. If every reading is saturated the first one
/// is used anyway.
pub fn pick_ec_reading(readings: &[(u8, u8)], cutoff: u8) -> Option<(u8, u8)> {
    let picked = readings
        .iter()
        .find(|&&(_, value)| value < cutoff)
        .or_else(|| readings.first())
        .copied();

    if let Some((address, value)) = picked {
        info!("Using battery value {value}% from EC address {address:#04x}");
    }
    picked
}

/// Extract the first `<digits>%` from status tool output, e.g.
/// `Battery 0: Discharging, 45%, 01:23:45 remaining`. Anything outside
/// 1..=100 is treated as no reading.
pub fn parse_percentage(text: &str) -> Option<u8> {
    static PERCENT: OnceLock<Regex> = OnceLock::new();
    let re = PERCENT.get_or_init(|| Regex::new(r"(\d+)%").expect("valid regex"));

    let value: u16 = re.captures(text)?.get(1)?.as_str().parse().ok()?;
    if VALID_PERCENT.contains(&value) {
        u8::try_from(value).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ec::fake::FakeEc;
    use std::fs;

    fn config_in(dir: &tempfile::TempDir) -> BatteryConfig {
        BatteryConfig {
            capacity_path: dir.path().join("capacity"),
            scan_addresses: vec![0xbf, 0xe2, 0xd7],
            status_command: vec!["/nonexistent/acpi".to_string(), "-b".to_string()],
            ..BatteryConfig::default()
        }
    }

    #[test]
    fn test_os_capacity_wins_without_scanning() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("capacity"), "67\n").unwrap();
        let config = config_in(&dir);
        let ec = FakeEc::with_registers(&[(0xbf, 40), (0xe2, 41), (0xd7, 42)]);

        let reading = BatteryCapacityReader::new(&ec, &config).get_capacity();

        assert_eq!(reading.percent, 67);
        assert_eq!(reading.source, CapacitySource::Os);
        assert!(ec.reads.borrow().is_empty());
    }

    #[test]
    fn test_prefers_first_unsaturated_ec_value() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let ec = FakeEc::with_registers(&[(0xbf, 100), (0xe2, 45), (0xd7, 100)]);

        let reading = BatteryCapacityReader::new(&ec, &config).get_capacity();

        assert_eq!(reading.percent, 45);
        assert_eq!(reading.source, CapacitySource::EcScan { address: 0xe2 });
    }

    #[test]
    fn test_out_of_range_os_value_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("capacity"), "0").unwrap();
        let config = config_in(&dir);
        let ec = FakeEc::with_registers(&[(0xbf, 188), (0xe2, 0), (0xd7, 97)]);

        let reading = BatteryCapacityReader::new(&ec, &config).get_capacity();

        assert_eq!(reading.percent, 97);
        assert_eq!(reading.source, CapacitySource::EcScan { address: 0xd7 });
    }

    #[test]
    fn test_nothing_available_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let ec = FakeEc::new();

        let reading = BatteryCapacityReader::new(&ec, &config).get_capacity();

        assert_eq!(reading, BatteryReading::unavailable());
        assert_eq!(reading.percent, 0);
    }

    #[test]
    fn test_status_command_is_last_resort() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.status_command = vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo 'Battery 0: Charging, 58%, 00:40:00 until charged'".to_string(),
        ];
        let ec = FakeEc::new();

        let reading = BatteryCapacityReader::new(&ec, &config).get_capacity();

        assert_eq!(reading.percent, 58);
        assert_eq!(reading.source, CapacitySource::ExternalTool);
    }

    #[test]
    fn test_failing_status_command_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.status_command = vec!["sh".to_string(), "-c".to_string(), "echo 50%; exit 1".to_string()];

        let reading = BatteryCapacityReader::new(&FakeEc::new(), &config).get_capacity();
        assert!(!reading.is_known());
    }

    #[test]
    fn test_status_command_zero_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.status_command = vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo 'Battery 0: Unknown, 0%'".to_string(),
        ];

        let reading = BatteryCapacityReader::new(&FakeEc::new(), &config).get_capacity();
        assert_eq!(reading, BatteryReading::unavailable());
        assert!(!reading.is_known());
    }

    #[test]
    fn test_pick_with_custom_cutoff() {
        let readings = [(0x10, 90), (0x11, 80)];
        assert_eq!(pick_ec_reading(&readings, 95), Some((0x10, 90)));
        assert_eq!(pick_ec_reading(&readings, 85), Some((0x11, 80)));
        assert_eq!(pick_ec_reading(&readings, 50), Some((0x10, 90)));
        assert_eq!(pick_ec_reading(&[], 95), None);
    }

    #[test]
    fn test_parse_percentage() {
        assert_eq!(parse_percentage("Battery 0: Discharging, 45%, 01:23:45 remaining"), Some(45));
        assert_eq!(parse_percentage("Battery 0: Full, 100%"), Some(100));
        assert_eq!(parse_percentage("Battery 0: Unknown, 250%"), None);
        assert_eq!(parse_percentage("Battery 0: Unknown, 0%, rate information unavailable"), None);
        assert_eq!(parse_percentage("No support for device type: power_supply"), None);
    }

    #[test]
    fn test_register_space_scan() {
        let ec = FakeEc::with_registers(&[(0x00, 0), (0x10, 55), (0x20, 101), (0xfe, 1)]);
        assert_eq!(scan_register_space(&ec, 0x00..=0xfe), vec![(0x10, 55), (0xfe, 1)]);
    }
}
