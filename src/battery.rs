use crate::config::SettingsStore;
use crate::core::BatteryThreshold;
use crate::ec::RegisterIo;
use log::{debug, error, info, warn};
use std::thread;
use std::time::Duration;

/// Register value for a 100% stop threshold, written between the two target
/// writes to make the EC latch the new value.
pub const THRESHOLD_RESET_VALUE: u8 = BatteryThreshold::WIRE_OFFSET + 100;

/// Sets the battery charge-stop threshold.
///
/// A single write to the threshold register does not reliably stick on this
/// firmware. Writing the target, then 100%, then the target again (with a
/// pause between each) makes the EC commit it.
pub struct BatteryThresholdController<'a> {
    ec: &'a dyn RegisterIo,
    register: u8,
    latch_delay: Duration,
}

impl<'a> BatteryThresholdController<'a> {
    pub const fn new(ec: &'a dyn RegisterIo, register: u8, latch_delay: Duration) -> Self {
        Self {
            ec,
            register,
            latch_delay,
        }
    }

    /// Run the latch sequence for `threshold` and persist it.
    ///
    /// Returns false if any of the three writes failed. The sequence is
    /// always run to the end.
    pub fn apply(&self, threshold: BatteryThreshold, store: &mut dyn SettingsStore) -> bool {
        let target = threshold.wire_value();
        let sequence = [target, THRESHOLD_RESET_VALUE, target];
        let mut all_written = true;

        for (step, value) in sequence.into_iter().enumerate() {
            if step > 0 {
                thread::sleep(self.latch_delay);
            }

            debug!("Battery threshold step {}: EC[{:#04x}] <- {value}", step + 1, self.register);
            if !self.ec.write(self.register, value) {
                all_written = false;
            }
        }

        if all_written {
            info!("Battery charge threshold set to {threshold}");
        } else {
            warn!("Battery charge threshold {threshold} may not have latched, a write failed");
        }

        if let Err(e) = store.set_battery_threshold(threshold) {
            error!("Failed to persist battery threshold {threshold}: {e}");
        }

        all_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::memory::MemoryStore;
    use crate::ec::fake::FakeEc;
    use std::time::Instant;

    #[test]
    fn test_writes_target_reset_target_in_order() {
        for percent in [50, 60, 85, 100] {
            let ec = FakeEc::new();
            let mut store = MemoryStore::default();
            let controller = BatteryThresholdController::new(&ec, 0xbf, Duration::ZERO);
            let threshold = BatteryThreshold::new(percent).unwrap();

            assert!(controller.apply(threshold, &mut store));

            let target = percent + 128;
            assert_eq!(ec.writes(), vec![(0xbf, target), (0xbf, 228), (0xbf, target)]);
            assert_eq!(ec.register(0xbf), Some(target));
            assert_eq!(store.threshold, Some(threshold));
        }
    }

    #[test]
    fn test_waits_between_writes() {
        let ec = FakeEc::new();
        let mut store = MemoryStore::default();
        let controller = BatteryThresholdController::new(&ec, 0xbf, Duration::from_millis(20));

        let start = Instant::now();
        controller.apply(BatteryThreshold::new(70).unwrap(), &mut store);

        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_failed_write_still_runs_whole_sequence() {
        let ec = FakeEc::new().failing_on(0xbf);
        let mut store = MemoryStore::default();
        let controller = BatteryThresholdController::new(&ec, 0xbf, Duration::ZERO);

        assert!(!controller.apply(BatteryThreshold::new(80).unwrap(), &mut store));
        assert_eq!(ec.writes().len(), 3);
        assert_eq!(store.threshold.map(BatteryThreshold::percent), Some(80));
    }
}
