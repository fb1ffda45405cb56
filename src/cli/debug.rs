use crate::capacity::BatteryCapacityReader;
use crate::config::{ConfigStore, SettingsStore};
use crate::conflict;
use crate::core::{BatteryThreshold, Channel};
use crate::ec::{EcInterface, ReadWidth, RegisterIo};
use crate::fan::ProfilePlan;
use crate::monitor;
use crate::util::error::AppError;
use crate::util::sysfs::path_exists_and_writable;

fn or_na<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

/// Prints comprehensive debug information about the EC and stored settings
pub fn run_debug(store: &ConfigStore) -> Result<(), AppError> {
    let config = store.config();
    let registers = &config.ec.registers;

    println!("=== MSI-THERMAL DEBUG INFORMATION ===");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Timestamp: {}", chrono::Local::now().to_rfc3339());

    println!("\n--- CONFIGURATION ---");
    println!(
        "Config File: {} ({})",
        store.path().display(),
        if store.path().exists() { "present" } else { "missing, using defaults" }
    );
    println!("Default Fan Profile: {}", store.default_profile());
    println!("Basic Offset: {}", store.fan_offset());
    println!("Battery Threshold: {}", store.battery_threshold());
    println!("Current Configuration: {config:#?}");

    let ec = EcInterface::new(&config.ec.interface_path);

    println!("\n--- EC INTERFACE ---");
    println!("Path: {}", ec.path().display());
    println!("Exists: {}", ec.exists());
    println!("Writable: {}", path_exists_and_writable(ec.path()));
    match ec.try_read(registers.mode_control, 1) {
        Ok(_) => println!("Read Check: OK"),
        Err(e) => println!("Read Check: FAILED ({e})"),
    }

    println!("\n--- CONTROL REGISTERS ---");
    println!(
        "Mode Control [{:#04x}]: {}",
        registers.mode_control,
        or_na(ec.read_hex(registers.mode_control, ReadWidth::Byte))
    );
    println!(
        "Cooler Booster [{:#04x}]: {}",
        registers.cooler_booster,
        or_na(ec.read_hex(registers.cooler_booster, ReadWidth::Byte))
    );
    let threshold_raw = ec.read(registers.battery_threshold, ReadWidth::Byte);
    let threshold_decoded = threshold_raw
        .and_then(|raw| u8::try_from(raw).ok())
        .and_then(|raw| raw.checked_sub(BatteryThreshold::WIRE_OFFSET))
        .map(|percent| format!("{percent}%"));
    println!(
        "Battery Threshold [{:#04x}]: {} ({})",
        registers.battery_threshold,
        or_na(threshold_raw),
        or_na(threshold_decoded)
    );

    println!("\n--- FAN CURVES ---");
    let expected = store
        .default_profile()
        .plan(registers, &config.fan, store.fan_offset());
    for channel in Channel::ALL {
        let current: Vec<String> = registers
            .curve_addresses(channel)
            .iter()
            .map(|&address| or_na(ec.read(address, ReadWidth::Byte)))
            .collect();
        println!("{channel} Curve (EC): [{}]", current.join(", "));

        if let ProfilePlan::Curve { curve, .. } = &expected {
            println!("{channel} Curve (expected): {:?}", curve.channel(channel));
        }
    }
    if expected == ProfilePlan::CoolerBooster {
        println!("Expected: Cooler Booster, curves managed by firmware");
    }

    println!("\n--- TEMPERATURE INFORMATION ---");
    let snapshot = monitor::read_thermal_snapshot(&ec, registers);
    for channel in Channel::ALL {
        println!(
            "{channel} Temperature: {}°C, Fan: {} rpm",
            or_na(snapshot.temperature(channel)),
            or_na(snapshot.fan_rpm(channel))
        );
    }

    println!("\n--- BATTERY INFORMATION ---");
    let reading = BatteryCapacityReader::new(&ec, &config.battery).get_capacity();
    if reading.is_known() {
        println!("Capacity: {}% (source: {})", reading.percent, reading.source);
    } else {
        println!("Capacity: N/A (no source available)");
    }

    println!("\n--- CONFLICT DETECTION ---");
    let conflicts = conflict::detect_conflicts(ec.path());
    println!("{}", conflicts.get_conflict_message());

    Ok(())
}
