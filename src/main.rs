mod battery;
mod capacity;
mod cli;
mod config;
mod conflict;
mod core;
mod daemon;
mod ec;
mod fan;
mod monitor;
mod util;

use crate::battery::BatteryThresholdController;
use crate::capacity::BatteryCapacityReader;
use crate::config::{AppConfig, ConfigStore, SettingsStore};
use crate::core::{BatteryThreshold, Channel, FanProfile};
use crate::ec::{EcInterface, ReadWidth, RegisterIo};
use crate::fan::{ApplyReport, FanProfileEngine};
use crate::monitor::SessionState;
use crate::util::error::{AppError, ControlError};
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Display current temperatures, fan speeds and battery state
    Info,
    /// Apply the stored defaults and keep monitoring in the background
    Daemon {
        #[clap(long)]
        verbose: bool,
    },
    /// Apply a fan profile and make it the default
    SetProfile {
        /// 1-4, or auto, basic, advanced, cooler-booster
        profile: String,
    },
    /// Set the battery charge-stop threshold and make it the default
    SetThreshold {
        /// Percent, 50 to 100 in steps of 5
        percent: u8,
    },
    /// Continuously print temperatures and fan speeds
    Watch {
        #[clap(long, default_value_t = 500)]
        interval_ms: u64,
        /// Stop after this many samples
        #[clap(long)]
        count: Option<u64>,
    },
    /// Scan the whole EC for values that look like a battery percentage
    ScanBattery,
    /// Print a full debug report
    Debug,
}

fn or_na<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

/// Fail early with a typed error if the EC cannot be opened.
fn preflight(ec: &EcInterface, config: &AppConfig) -> Result<(), AppError> {
    ec.try_read(config.ec.registers.mode_control, 1)?;
    Ok(())
}

fn print_info(store: &ConfigStore) -> Result<(), AppError> {
    let config = store.config();
    let ec = EcInterface::new(&config.ec.interface_path);
    preflight(&ec, config)?;

    let snapshot = monitor::read_thermal_snapshot(&ec, &config.ec.registers);
    let reading = BatteryCapacityReader::new(&ec, &config.battery).get_capacity();

    println!("--- Fan & Thermal ---");
    for channel in Channel::ALL {
        println!(
            "{channel}: {}°C, fan {} rpm",
            or_na(snapshot.temperature(channel)),
            or_na(snapshot.fan_rpm(channel))
        );
    }
    println!(
        "Cooler Booster register: {}",
        or_na(ec.read_hex(config.ec.registers.cooler_booster, ReadWidth::Byte))
    );

    println!("\n--- Battery ---");
    if reading.is_known() {
        println!("Capacity: {}% (source: {})", reading.percent, reading.source);
    } else {
        println!("Capacity: N/A");
    }

    println!("\n--- Stored Defaults ---");
    println!("Fan Profile: {}", store.default_profile());
    println!("Basic Offset: {}", store.fan_offset());
    println!("Charge Threshold: {}", store.battery_threshold());
    Ok(())
}

fn set_profile(store: &mut ConfigStore, selector: &str) -> Result<(), AppError> {
    let config = store.config().clone();
    let ec = EcInterface::new(&config.ec.interface_path);
    preflight(&ec, &config)?;

    let engine = FanProfileEngine::new(&ec, &config.ec.registers, &config.fan);
    let report = match selector.parse::<u8>() {
        Ok(id) => engine.apply_id(id, store)?,
        Err(_) => {
            let profile = selector.parse::<FanProfile>()?;
            engine.apply(profile, store)
        }
    };

    print_apply_report(&report)
}

fn print_apply_report(report: &ApplyReport) -> Result<(), AppError> {
    if report.is_complete() {
        println!(
            "Fan profile set to {} ({} writes)",
            report.profile, report.writes_attempted
        );
        Ok(())
    } else {
        Err(AppError::Generic(format!(
            "Fan profile {} applied partially, failed addresses: {:02x?}",
            report.profile, report.failed_addresses
        )))
    }
}

fn set_threshold(store: &mut ConfigStore, percent: u8) -> Result<(), AppError> {
    let threshold = BatteryThreshold::new(percent).map_err(|_| {
        let choices: Vec<String> = BatteryThreshold::choices().map(|t| t.to_string()).collect();
        ControlError::InvalidValue(format!(
            "battery threshold {percent}%, expected one of {}",
            choices.join(", ")
        ))
    })?;

    let config = store.config().clone();
    let ec = EcInterface::new(&config.ec.interface_path);
    preflight(&ec, &config)?;

    let controller = BatteryThresholdController::new(
        &ec,
        config.ec.registers.battery_threshold,
        Duration::from_millis(config.battery.latch_delay_ms),
    );

    if controller.apply(threshold, store) {
        println!("Battery charge threshold set to {threshold}");
        Ok(())
    } else {
        Err(AppError::Generic(format!(
            "Battery charge threshold {threshold} may not have been applied"
        )))
    }
}

fn watch(config: &AppConfig, interval_ms: u64, count: Option<u64>) -> Result<(), AppError> {
    let ec = EcInterface::new(&config.ec.interface_path);
    preflight(&ec, config)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))
        .map_err(|e| AppError::Generic(format!("Error setting Ctrl-C handler: {e}")))?;

    let mut session = SessionState::new();
    let interval = Duration::from_millis(interval_ms);

    while running.load(Ordering::SeqCst) && count.is_none_or(|limit| session.samples < limit) {
        let snapshot = monitor::read_thermal_snapshot(&ec, &config.ec.registers);
        session.observe(&snapshot);

        let line: Vec<String> = Channel::ALL
            .iter()
            .map(|&channel| {
                let tracker = session.tracker(channel);
                format!(
                    "{channel} {}°C (min {} max {}) {} rpm",
                    or_na(snapshot.temperature(channel)),
                    or_na(tracker.min),
                    or_na(tracker.max),
                    or_na(snapshot.fan_rpm(channel))
                )
            })
            .collect();
        println!("{}", line.join(" | "));

        std::thread::sleep(interval);
    }

    println!(
        "{} samples over {}s",
        session.samples,
        session.started.elapsed().as_secs()
    );
    for channel in Channel::ALL {
        let tracker = session.tracker(channel);
        println!(
            "{channel} range: {} - {}°C",
            or_na(tracker.min),
            or_na(tracker.max)
        );
    }
    Ok(())
}

fn scan_battery(config: &AppConfig) -> Result<(), AppError> {
    let ec = EcInterface::new(&config.ec.interface_path);
    preflight(&ec, config)?;

    println!("Scanning EC addresses 0x00-0xfe for battery-like values (1-100)...");
    let readings = capacity::scan_register_space(&ec, 0x00..=0xfe);
    if readings.is_empty() {
        return Err(ControlError::NoCapacitySourceAvailable.into());
    }

    for &(address, value) in &readings {
        let known = if config.battery.scan_addresses.contains(&address) {
            " (configured)"
        } else {
            ""
        };
        println!("  {address:#04x}: {value}%{known}");
    }

    if let Some((address, value)) =
        capacity::pick_ec_reading(&readings, config.battery.saturation_cutoff)
    {
        println!("Best candidate: {address:#04x} = {value}%");
    }

    println!("\nConfigured candidate addresses (raw):");
    for &address in &config.battery.scan_addresses {
        println!(
            "  {address:#04x}: {}",
            or_na(ec.read(address, ReadWidth::Byte))
        );
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut store = ConfigStore::open_or_defaults(config::resolve_config_path());
    if store.is_read_only() {
        eprintln!(
            "Warning: {} could not be loaded. Using default values; settings will not be saved.",
            store.path().display()
        );
    }

    let command_result = match cli.command {
        Some(Commands::Info) => print_info(&store),
        Some(Commands::Daemon { verbose }) => daemon::run_daemon(store, verbose),
        Some(Commands::SetProfile { profile }) => set_profile(&mut store, &profile),
        Some(Commands::SetThreshold { percent }) => set_threshold(&mut store, percent),
        Some(Commands::Watch { interval_ms, count }) => {
            watch(store.config(), interval_ms, count)
        }
        Some(Commands::ScanBattery) => scan_battery(store.config()),
        Some(Commands::Debug) => cli::debug::run_debug(&store),
        None => {
            println!("Welcome to msi-thermal! Use --help for commands.");
            println!("Current effective configuration: {:?}", store.config());
            Ok(())
        }
    };

    if let Err(e) = command_result {
        eprintln!("Error executing command: {e}");
        if let Some(source) = e.source() {
            eprintln!("Caused by: {source}");
        }
        if e.is_permission_denied() {
            eprintln!(
                "Hint: This operation may require administrator privileges (e.g., run with sudo)."
            );
        }

        std::process::exit(1);
    }
}
