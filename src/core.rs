use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of set-points in each fan curve.
pub const CURVE_POINTS: usize = 7;

/// Highest speed value the EC accepts for a curve point.
pub const MAX_FAN_SPEED: u8 = 150;

/// The two cooling channels the EC drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Cpu,
    Gpu,
}

impl Channel {
    pub const ALL: [Self; 2] = [Self::Cpu, Self::Gpu];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("CPU"),
            Self::Gpu => f.write_str("GPU"),
        }
    }
}

/// Seven speed set-points per channel, as written to the EC curve registers.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanCurve {
    pub cpu: [u8; CURVE_POINTS],
    pub gpu: [u8; CURVE_POINTS],
}

impl FanCurve {
    pub const fn new(cpu: [u8; CURVE_POINTS], gpu: [u8; CURVE_POINTS]) -> Self {
        Self { cpu, gpu }
    }

    /// Stock MSI "Auto" curve.
    pub const fn auto() -> Self {
        Self::new([0, 40, 48, 56, 64, 72, 80], [0, 48, 56, 64, 72, 79, 86])
    }

    /// More aggressive "Advanced" curve.
    pub const fn advanced() -> Self {
        Self::new([0, 60, 70, 80, 90, 100, 120], [0, 65, 75, 85, 95, 105, 125])
    }

    pub const fn channel(&self, channel: Channel) -> &[u8; CURVE_POINTS] {
        match channel {
            Channel::Cpu => &self.cpu,
            Channel::Gpu => &self.gpu,
        }
    }

    /// Shift every point by `offset`, clipping to `0..=MAX_FAN_SPEED`.
    pub fn offset_by(&self, offset: i16) -> Self {
        let shift = |points: [u8; CURVE_POINTS]| {
            points.map(|v| i16::from(v).saturating_add(offset).clamp(0, i16::from(MAX_FAN_SPEED)) as u8)
        };

        Self {
            cpu: shift(self.cpu),
            gpu: shift(self.gpu),
        }
    }

    /// The same curve with every point capped at `MAX_FAN_SPEED`.
    pub fn clipped(&self) -> Self {
        Self {
            cpu: self.cpu.map(|v| v.min(MAX_FAN_SPEED)),
            gpu: self.gpu.map(|v| v.min(MAX_FAN_SPEED)),
        }
    }

    pub fn is_within_limits(&self) -> bool {
        self.cpu
            .iter()
            .chain(self.gpu.iter())
            .all(|&v| v <= MAX_FAN_SPEED)
    }
}

/// Fan profile selector. The numeric ids are the ones persisted in the config
/// file and accepted on the command line.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub enum FanProfile {
    Auto,
    Basic,
    Advanced,
    CoolerBooster,
}

impl FanProfile {
    pub const ALL: [Self; 4] = [Self::Auto, Self::Basic, Self::Advanced, Self::CoolerBooster];

    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Auto),
            2 => Some(Self::Basic),
            3 => Some(Self::Advanced),
            4 => Some(Self::CoolerBooster),
            _ => None,
        }
    }

    pub const fn id(self) -> u8 {
        match self {
            Self::Auto => 1,
            Self::Basic => 2,
            Self::Advanced => 3,
            Self::CoolerBooster => 4,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Basic => "basic",
            Self::Advanced => "advanced",
            Self::CoolerBooster => "cooler-booster",
        }
    }
}

impl fmt::Display for FanProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.id())
    }
}

impl TryFrom<u8> for FanProfile {
    type Error = ConfigError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::from_id(id).ok_or_else(|| {
            ConfigError::Validation(format!(
                "Fan profile {id} is not one of 1 (auto), 2 (basic), 3 (advanced), 4 (cooler booster)"
            ))
        })
    }
}

impl From<FanProfile> for u8 {
    fn from(profile: FanProfile) -> Self {
        profile.id()
    }
}

impl FromStr for FanProfile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "auto" => Ok(Self::Auto),
            "basic" => Ok(Self::Basic),
            "advanced" => Ok(Self::Advanced),
            "cooler-booster" | "coolerbooster" | "booster" => Ok(Self::CoolerBooster),
            other => Err(ConfigError::Validation(format!(
                "Unknown fan profile '{other}'"
            ))),
        }
    }
}

/// Battery charge-stop percentage. Always in `50..=100` and a multiple of 5.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub struct BatteryThreshold(u8);

impl BatteryThreshold {
    pub const MIN: u8 = 50;
    pub const MAX: u8 = 100;
    pub const STEP: u8 = 5;

    /// Offset the EC adds to the percentage in the threshold register.
    pub const WIRE_OFFSET: u8 = 128;

    pub fn new(percent: u8) -> Result<Self, ConfigError> {
        if !(Self::MIN..=Self::MAX).contains(&percent) {
            return Err(ConfigError::Validation(format!(
                "Battery threshold ({percent}%) must be between {}% and {}%",
                Self::MIN,
                Self::MAX
            )));
        }
        if percent % Self::STEP != 0 {
            return Err(ConfigError::Validation(format!(
                "Battery threshold ({percent}%) must be a multiple of {}",
                Self::STEP
            )));
        }

        Ok(Self(percent))
    }

    pub const fn percent(self) -> u8 {
        self.0
    }

    /// Register encoding: `percent + 128`.
    pub const fn wire_value(self) -> u8 {
        self.0 + Self::WIRE_OFFSET
    }

    /// Every accepted threshold, lowest first.
    pub fn choices() -> impl Iterator<Item = Self> {
        (Self::MIN..=Self::MAX).step_by(Self::STEP as usize).map(Self)
    }
}

impl Default for BatteryThreshold {
    fn default() -> Self {
        Self(60)
    }
}

impl TryFrom<u8> for BatteryThreshold {
    type Error = ConfigError;

    fn try_from(percent: u8) -> Result<Self, Self::Error> {
        Self::new(percent)
    }
}

impl From<BatteryThreshold> for u8 {
    fn from(threshold: BatteryThreshold) -> Self {
        threshold.0
    }
}

impl fmt::Display for BatteryThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Where a battery percentage came from, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacitySource {
    Os,
    EcScan { address: u8 },
    ExternalTool,
    Unavailable,
}

impl fmt::Display for CapacitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Os => f.write_str("sysfs"),
            Self::EcScan { address } => write!(f, "ec@{address:#04x}"),
            Self::ExternalTool => f.write_str("status-command"),
            Self::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// A battery percentage and the source it was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryReading {
    /// 1 to 100 when known, 0 when no source produced a value
    pub percent: u8,
    pub source: CapacitySource,
}

impl BatteryReading {
    pub const fn unavailable() -> Self {
        Self {
            percent: 0,
            source: CapacitySource::Unavailable,
        }
    }

    pub const fn is_known(&self) -> bool {
        !matches!(self.source, CapacitySource::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_offset_is_identity() {
        assert_eq!(FanCurve::auto().offset_by(0), FanCurve::auto());
    }

    #[test]
    fn test_extreme_offsets_saturate() {
        let curve = FanCurve::auto();
        assert_eq!(curve.offset_by(i16::MAX), FanCurve::new([150; CURVE_POINTS], [150; CURVE_POINTS]));
        assert_eq!(curve.offset_by(i16::MIN), FanCurve::new([0; CURVE_POINTS], [0; CURVE_POINTS]));
    }

    #[test]
    fn test_offset_clips_both_ends() {
        let curve = FanCurve::new([0, 10, 20, 140, 145, 150, 75], [5; CURVE_POINTS]);

        let up = curve.offset_by(30);
        assert_eq!(up.cpu, [30, 40, 50, 150, 150, 150, 105]);
        assert_eq!(up.gpu, [35; CURVE_POINTS]);

        let down = curve.offset_by(-30);
        assert_eq!(down.cpu, [0, 0, 0, 110, 115, 120, 45]);
        assert_eq!(down.gpu, [0; CURVE_POINTS]);
    }

    #[test]
    fn test_clipped_caps_at_max() {
        let curve = FanCurve::new([200; CURVE_POINTS], [150; CURVE_POINTS]);
        assert!(!curve.is_within_limits());
        assert!(curve.clipped().is_within_limits());
        assert_eq!(curve.clipped().cpu, [MAX_FAN_SPEED; CURVE_POINTS]);
    }

    #[test]
    fn test_profile_ids_round_trip() {
        for profile in FanProfile::ALL {
            assert_eq!(FanProfile::from_id(profile.id()), Some(profile));
        }
        assert_eq!(FanProfile::from_id(0), None);
        assert_eq!(FanProfile::from_id(5), None);
    }

    #[test]
    fn test_profile_names_parse() {
        assert_eq!("Auto".parse::<FanProfile>().unwrap(), FanProfile::Auto);
        assert_eq!(
            "cooler_booster".parse::<FanProfile>().unwrap(),
            FanProfile::CoolerBooster
        );
        assert!("turbo".parse::<FanProfile>().is_err());
    }

    #[test]
    fn test_threshold_validation() {
        assert!(BatteryThreshold::new(45).is_err());
        assert!(BatteryThreshold::new(105).is_err());
        assert!(BatteryThreshold::new(62).is_err());
        assert_eq!(BatteryThreshold::new(80).unwrap().wire_value(), 208);
        assert_eq!(BatteryThreshold::choices().count(), 11);
    }

    #[test]
    fn test_unavailable_reading_is_zero() {
        let reading = BatteryReading::unavailable();
        assert_eq!(reading.percent, 0);
        assert!(!reading.is_known());
    }
}
