use crate::battery::BatteryThresholdController;
use crate::capacity::BatteryCapacityReader;
use crate::config::watcher::ConfigWatcher;
use crate::config::{AppConfig, ConfigStore, LogLevel, SettingsStore};
use crate::conflict;
use crate::core::BatteryReading;
use crate::ec::{EcInterface, RegisterIo};
use crate::fan::FanProfileEngine;
use crate::monitor::{self, ThermalSnapshot};
use crate::util::error::AppError;
use log::{LevelFilter, debug, error, info, warn};
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Defaults not yet written to the EC
    Initializing,
    /// Observing only; `counter` counts ticks since the last battery check
    Polling { counter: u32 },
}

/// Applies the persisted defaults once, then periodically re-reads the
/// battery capacity. Polling never writes to the EC.
pub struct MonitorLoop<'a> {
    ec: &'a dyn RegisterIo,
    config: AppConfig,
    state: LoopState,
}

impl<'a> MonitorLoop<'a> {
    pub const fn new(ec: &'a dyn RegisterIo, config: AppConfig) -> Self {
        Self {
            ec,
            config,
            state: LoopState::Initializing,
        }
    }

    pub const fn state(&self) -> LoopState {
        self.state
    }

    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config.daemon.poll_interval_sec)
    }

    /// Swap in a reloaded configuration. Only observation settings take
    /// effect; the applied profile and threshold are left alone.
    pub fn reload(&mut self, config: AppConfig) {
        self.config = config;
    }

    /// Write the stored default fan profile and battery threshold. Returns
    /// false if it already ran or if any write failed.
    pub fn initialize(&mut self, store: &mut dyn SettingsStore) -> bool {
        if self.state != LoopState::Initializing {
            debug!("Defaults already applied, skipping initialization");
            return false;
        }

        let profile = store.default_profile();
        let threshold = store.battery_threshold();
        info!("Applying startup defaults: fan profile {profile}, battery threshold {threshold}");

        let engine = FanProfileEngine::new(self.ec, &self.config.ec.registers, &self.config.fan);
        let fan_ok = engine.apply(profile, store).is_complete();

        let controller = BatteryThresholdController::new(
            self.ec,
            self.config.ec.registers.battery_threshold,
            Duration::from_millis(self.config.battery.latch_delay_ms),
        );
        let battery_ok = controller.apply(threshold, store);

        self.state = LoopState::Polling { counter: 0 };
        fan_ok && battery_ok
    }

    /// One polling step. Every `battery_check_ticks` ticks the battery
    /// capacity is read and returned.
    pub fn tick(&mut self) -> Option<BatteryReading> {
        let LoopState::Polling { counter } = self.state else {
            warn!("Polling tick before initialization, ignoring");
            return None;
        };

        let counter = counter + 1;
        if counter < self.config.daemon.battery_check_ticks {
            self.state = LoopState::Polling { counter };
            return None;
        }

        self.state = LoopState::Polling { counter: 0 };
        let reading = BatteryCapacityReader::new(self.ec, &self.config.battery).get_capacity();
        if reading.is_known() {
            info!("Battery at {}% ({})", reading.percent, reading.source);
        } else {
            warn!("Battery level unavailable");
        }
        Some(reading)
    }
}

const fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warning => LevelFilter::Warn,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
    }
}

fn apply_log_level(config: &AppConfig, verbose: bool) {
    let effective = if verbose {
        LogLevel::Debug
    } else {
        config.daemon.log_level
    };
    // Adjust the filter without re-initializing the logger
    log::set_max_level(level_filter(effective));
}

/// Run the daemon
pub fn run_daemon(mut store: ConfigStore, verbose: bool) -> Result<(), AppError> {
    apply_log_level(store.config(), verbose);

    info!("Starting msi-thermal daemon...");

    let ec = EcInterface::new(&store.config().ec.interface_path);

    let conflicts = conflict::detect_conflicts(ec.path());
    for message in conflicts.messages() {
        warn!("{message}");
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        info!("Received shutdown signal, exiting...");
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| AppError::Generic(format!("Error setting Ctrl-C handler: {e}")))?;

    let mut monitor_loop = MonitorLoop::new(&ec, store.config().clone());
    if !monitor_loop.initialize(&mut store) {
        warn!("Startup defaults were not fully applied, check the EC interface");
    }

    info!(
        "Daemon initialized with poll interval: {}s, battery check every {} ticks",
        monitor_loop.config().daemon.poll_interval_sec,
        monitor_loop.config().daemon.battery_check_ticks
    );

    if let Some(stats_path) = &monitor_loop.config().daemon.stats_file_path {
        info!("Stats will be written to: {stats_path}");
    }

    let mut config_watcher = if store.path().exists() {
        match ConfigWatcher::new(store.path()) {
            Ok(watcher) => {
                info!("Watching config file: {}", watcher.config_path().display());
                Some(watcher)
            }
            Err(e) => {
                warn!("Failed to initialize config file watcher: {e}");
                None
            }
        }
    } else {
        debug!("No config file at {}, not watching for changes", store.path().display());
        None
    };

    while running.load(Ordering::SeqCst) {
        let start_time = Instant::now();

        if let Some(watcher) = &mut config_watcher {
            if let Some(config_result) = watcher.check_for_changes() {
                match config_result {
                    Ok(new_config) => {
                        info!("Config file changed, reloading observation settings");
                        apply_log_level(&new_config, verbose);
                        monitor_loop.reload(new_config);
                    }
                    Err(e) => {
                        error!("Error loading new configuration: {e}");
                    }
                }
            }
        }

        if let Some(reading) = monitor_loop.tick() {
            if let Some(stats_path) = &monitor_loop.config().daemon.stats_file_path {
                let snapshot = monitor::read_thermal_snapshot(&ec, &monitor_loop.config().ec.registers);
                if let Err(e) = write_stats_file(stats_path, &reading, &snapshot) {
                    error!("Failed to write stats file: {e}");
                }
            }
        }

        let elapsed = start_time.elapsed();
        let poll_duration = monitor_loop.poll_interval();
        if elapsed < poll_duration {
            let sleep_time = poll_duration - elapsed;
            debug!("Sleeping for {}s until next cycle", sleep_time.as_secs());
            std::thread::sleep(sleep_time);
        }
    }

    info!("Daemon stopped");
    Ok(())
}

/// Write the latest battery and thermal readings as key=value lines
fn write_stats_file(
    path: &str,
    reading: &BatteryReading,
    snapshot: &ThermalSnapshot,
) -> Result<(), std::io::Error> {
    let mut file = File::create(path)?;

    writeln!(file, "timestamp={}", chrono::Local::now().to_rfc3339())?;

    writeln!(file, "battery_percent={}", reading.percent)?;
    writeln!(file, "battery_source={}", reading.source)?;

    if let Some(temp) = snapshot.cpu_temp_celsius {
        writeln!(file, "cpu_temp={temp}")?;
    }
    if let Some(temp) = snapshot.gpu_temp_celsius {
        writeln!(file, "gpu_temp={temp}")?;
    }
    if let Some(rpm) = snapshot.cpu_fan_rpm {
        writeln!(file, "cpu_fan_rpm={rpm}")?;
    }
    if let Some(rpm) = snapshot.gpu_fan_rpm {
        writeln!(file, "gpu_fan_rpm={rpm}")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::memory::MemoryStore;
    use crate::core::{BatteryThreshold, CapacitySource, FanProfile};
    use crate::ec::fake::FakeEc;

    fn test_config(dir: &tempfile::TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.battery.latch_delay_ms = 0;
        config.battery.capacity_path = dir.path().join("capacity");
        config.battery.status_command = vec!["/nonexistent/acpi".to_string()];
        config
    }

    #[test]
    fn test_initialize_applies_stored_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let ec = FakeEc::new();
        let mut store = MemoryStore {
            profile: Some(FanProfile::Advanced),
            threshold: Some(BatteryThreshold::new(80).unwrap()),
            ..MemoryStore::default()
        };
        let mut monitor_loop = MonitorLoop::new(&ec, test_config(&dir));

        assert!(monitor_loop.initialize(&mut store));
        assert_eq!(monitor_loop.state(), LoopState::Polling { counter: 0 });

        let writes = ec.writes();
        assert_eq!(writes.len(), 16 + 3);
        assert_eq!(writes[0], (0x98, 2));
        assert_eq!(writes[1], (0xd4, 0x8d));
        assert_eq!(&writes[16..], &[(0xbf, 208), (0xbf, 228), (0xbf, 208)]);

        assert!(!monitor_loop.initialize(&mut store));
        assert_eq!(ec.writes().len(), 19);
    }

    #[test]
    fn test_initialize_with_unloadable_config_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let original = "[fan]\nbasic_offset = 12\ndefault_profile = 9\n";
        std::fs::write(&path, original).unwrap();

        let mut store = ConfigStore::open_or_defaults(&path);
        let ec = FakeEc::new();
        let mut monitor_loop = MonitorLoop::new(&ec, test_config(&dir));

        assert!(monitor_loop.initialize(&mut store));
        assert_eq!(ec.writes().len(), 16 + 3);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_battery_checked_every_fifth_tick() {
        let dir = tempfile::tempdir().unwrap();
        let ec = FakeEc::with_registers(&[(0xe2, 64)]);
        let mut store = MemoryStore::default();
        let mut monitor_loop = MonitorLoop::new(&ec, test_config(&dir));
        monitor_loop.initialize(&mut store);
        let writes_after_init = ec.writes().len();

        for round in 0..2 {
            for tick in 1..5 {
                assert_eq!(monitor_loop.tick(), None, "round {round} tick {tick}");
                assert_eq!(monitor_loop.state(), LoopState::Polling { counter: tick });
            }
            let reading = monitor_loop.tick().unwrap();
            assert_eq!(reading.percent, 64);
            assert_eq!(reading.source, CapacitySource::EcScan { address: 0xe2 });
            assert_eq!(monitor_loop.state(), LoopState::Polling { counter: 0 });
        }

        assert_eq!(ec.writes().len(), writes_after_init);
    }

    #[test]
    fn test_tick_before_initialize_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ec = FakeEc::with_registers(&[(0xbf, 50)]);
        let mut monitor_loop = MonitorLoop::new(&ec, test_config(&dir));

        for _ in 0..10 {
            assert_eq!(monitor_loop.tick(), None);
        }
        assert_eq!(monitor_loop.state(), LoopState::Initializing);
        assert!(ec.reads.borrow().is_empty());
    }

    #[test]
    fn test_reload_changes_cadence_but_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let ec = FakeEc::new();
        let mut store = MemoryStore::default();
        let mut monitor_loop = MonitorLoop::new(&ec, test_config(&dir));
        monitor_loop.initialize(&mut store);
        let writes_after_init = ec.writes().len();

        monitor_loop.tick();
        let mut reloaded = test_config(&dir);
        reloaded.daemon.battery_check_ticks = 2;
        reloaded.daemon.poll_interval_sec = 5;
        monitor_loop.reload(reloaded);

        assert_eq!(monitor_loop.poll_interval(), Duration::from_secs(5));
        assert!(monitor_loop.tick().is_some());
        assert_eq!(ec.writes().len(), writes_after_init);
    }

    #[test]
    fn test_stats_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats");
        let reading = BatteryReading {
            percent: 71,
            source: CapacitySource::Os,
        };
        let snapshot = ThermalSnapshot {
            cpu_temp_celsius: Some(58),
            gpu_fan_rpm: Some(0),
            ..ThermalSnapshot::default()
        };

        write_stats_file(path.to_str().unwrap(), &reading, &snapshot).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();

        assert!(contents.starts_with("timestamp="));
        assert!(contents.contains("battery_percent=71\n"));
        assert!(contents.contains("cpu_temp=58\n"));
        assert!(contents.contains("gpu_fan_rpm=0\n"));
        assert!(!contents.contains("gpu_temp="));
    }
}
