use crate::config::{FanConfig, RegisterMap, SettingsStore};
use crate::core::{Channel, FanCurve, FanProfile};
use crate::ec::RegisterIo;
use crate::util::error::ControlError;
use log::{debug, error, info, warn};

/// What applying a profile means for the EC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilePlan {
    /// Select a firmware mode and load a curve into the 14 curve registers.
    Curve { mode_value: u8, curve: FanCurve },
    /// Hand control to the firmware's maximum cooling; no curve is written.
    CoolerBooster,
}

impl FanProfile {
    /// Resolve this profile against the configured tables.
    ///
    /// Basic is the Auto curve shifted by `basic_offset` and clipped to
    /// `0..=150`; with an offset of zero it is exactly the Auto curve.
    pub fn plan(self, registers: &RegisterMap, fan: &FanConfig, basic_offset: i16) -> ProfilePlan {
        match self {
            Self::Auto => ProfilePlan::Curve {
                mode_value: registers.mode_auto_value,
                curve: fan.auto_curve.clipped(),
            },
            Self::Basic => ProfilePlan::Curve {
                mode_value: registers.mode_auto_value,
                curve: fan.auto_curve.offset_by(basic_offset),
            },
            Self::Advanced => ProfilePlan::Curve {
                mode_value: registers.mode_advanced_value,
                curve: fan.advanced_curve.clipped(),
            },
            Self::CoolerBooster => ProfilePlan::CoolerBooster,
        }
    }
}

/// Outcome of one profile application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub profile: FanProfile,
    pub writes_attempted: usize,
    pub failed_addresses: Vec<u8>,
}

impl ApplyReport {
    pub fn is_complete(&self) -> bool {
        self.failed_addresses.is_empty()
    }
}

/// Applies fan profiles to the EC.
///
/// Writes are sequential and not transactional: a crash half way leaves the
/// EC with a mix of the old and new curve.
pub struct FanProfileEngine<'a> {
    ec: &'a dyn RegisterIo,
    registers: &'a RegisterMap,
    fan: &'a FanConfig,
}

impl<'a> FanProfileEngine<'a> {
    pub const fn new(ec: &'a dyn RegisterIo, registers: &'a RegisterMap, fan: &'a FanConfig) -> Self {
        Self { ec, registers, fan }
    }

    /// Apply a profile by its numeric selector (1 auto, 2 basic, 3 advanced,
    /// 4 cooler booster). Unknown selectors write nothing.
    pub fn apply_id(
        &self,
        profile_id: u8,
        store: &mut dyn SettingsStore,
    ) -> Result<ApplyReport, ControlError> {
        let Some(profile) = FanProfile::from_id(profile_id) else {
            warn!("Invalid fan profile selector {profile_id}. No action taken.");
            return Err(ControlError::InvalidProfileSelector(profile_id));
        };

        Ok(self.apply(profile, store))
    }

    /// Apply a profile and persist it as the default.
    pub fn apply(&self, profile: FanProfile, store: &mut dyn SettingsStore) -> ApplyReport {
        let mut report = ApplyReport {
            profile,
            writes_attempted: 0,
            failed_addresses: Vec::new(),
        };

        match profile.plan(self.registers, self.fan, store.fan_offset()) {
            ProfilePlan::CoolerBooster => {
                self.write(
                    &mut report,
                    self.registers.cooler_booster,
                    self.registers.cooler_booster_on_value,
                );
                info!("Cooler Booster enabled. Fan curves are managed by the firmware.");
            }
            ProfilePlan::Curve { mode_value, curve } => {
                // Booster must be off before the mode switch, or the firmware
                // can end up in a booster + manual mix
                self.write(
                    &mut report,
                    self.registers.cooler_booster,
                    self.registers.cooler_booster_off_value,
                );
                self.write(&mut report, self.registers.mode_control, mode_value);
                self.write_curve(&mut report, &curve);
                info!("Fan profile applied: {profile}");
            }
        }

        if !report.is_complete() {
            warn!(
                "Fan profile {profile} applied partially, failed addresses: {:02x?}",
                report.failed_addresses
            );
        }

        if let Err(e) = store.set_default_profile(profile) {
            error!("Failed to persist default fan profile {profile}: {e}");
        }

        report
    }

    fn write_curve(&self, report: &mut ApplyReport, curve: &FanCurve) {
        for channel in Channel::ALL {
            let addresses = self.registers.curve_addresses(channel);
            for (&address, &speed) in addresses.iter().zip(curve.channel(channel)) {
                if !self.write(report, address, speed) {
                    warn!(
                        "Failed to write {channel} fan speed {speed} to {address:#04x} for profile {}",
                        report.profile
                    );
                }
            }
        }
    }

    fn write(&self, report: &mut ApplyReport, address: u8, value: u8) -> bool {
        report.writes_attempted += 1;
        let ok = self.ec.write(address, value);
        if ok {
            debug!("EC[{address:#04x}] <- {value}");
        } else {
            report.failed_addresses.push(address);
        }
        ok
    }
}
