use crate::config::RegisterMap;
use crate::core::Channel;
use crate::ec::{ReadWidth, RegisterIo};
use std::time::Instant;

/// One reading of the temperature and fan speed registers. A field is `None`
/// when its register could not be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThermalSnapshot {
    pub cpu_temp_celsius: Option<u8>,
    pub gpu_temp_celsius: Option<u8>,
    pub cpu_fan_rpm: Option<u32>,
    pub gpu_fan_rpm: Option<u32>,
}

impl ThermalSnapshot {
    pub const fn temperature(&self, channel: Channel) -> Option<u8> {
        match channel {
            Channel::Cpu => self.cpu_temp_celsius,
            Channel::Gpu => self.gpu_temp_celsius,
        }
    }

    pub const fn fan_rpm(&self, channel: Channel) -> Option<u32> {
        match channel {
            Channel::Cpu => self.cpu_fan_rpm,
            Channel::Gpu => self.gpu_fan_rpm,
        }
    }
}

pub fn read_thermal_snapshot(ec: &dyn RegisterIo, registers: &RegisterMap) -> ThermalSnapshot {
    let temp = |channel| {
        ec.read(registers.temperature(channel), ReadWidth::Byte)
            .map(|v| v as u8)
    };
    let rpm = |channel| {
        ec.read(registers.fan_rpm(channel), ReadWidth::Word)
            .map(|raw| rpm_from_raw(raw, registers.rpm_calibration))
    };

    ThermalSnapshot {
        cpu_temp_celsius: temp(Channel::Cpu),
        gpu_temp_celsius: temp(Channel::Gpu),
        cpu_fan_rpm: rpm(Channel::Cpu),
        gpu_fan_rpm: rpm(Channel::Gpu),
    }
}

/// The EC reports fan speed as a period; a raw value of 0 means the fan is
/// stopped.
pub const fn rpm_from_raw(raw: u16, calibration: u32) -> u32 {
    if raw == 0 { 0 } else { calibration / raw as u32 }
}

/// Running min/max of one temperature channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MinMaxTracker {
    pub min: Option<u8>,
    pub max: Option<u8>,
}

impl MinMaxTracker {
    pub fn observe(&mut self, value: u8) {
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }
}

/// State of one monitoring session. Lives as long as the process that
/// created it; nothing is persisted.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub started: Instant,
    pub cpu: MinMaxTracker,
    pub gpu: MinMaxTracker,
    pub samples: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            cpu: MinMaxTracker::default(),
            gpu: MinMaxTracker::default(),
            samples: 0,
        }
    }

    pub const fn tracker(&self, channel: Channel) -> &MinMaxTracker {
        match channel {
            Channel::Cpu => &self.cpu,
            Channel::Gpu => &self.gpu,
        }
    }

    /// Fold a snapshot into the trackers. Failed reads are skipped so they
    /// never drag the minimum down to zero.
    pub fn observe(&mut self, snapshot: &ThermalSnapshot) {
        if let Some(t) = snapshot.cpu_temp_celsius {
            self.cpu.observe(t);
        }
        if let Some(t) = snapshot.gpu_temp_celsius {
            self.gpu.observe(t);
        }
        self.samples += 1;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
