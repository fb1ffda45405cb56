use crate::util::sysfs::read_sysfs_value;
use std::path::Path;
use std::process::{Command, Stdio};

const EC_SYS_WRITE_SUPPORT: &str = "/sys/module/ec_sys/parameters/write_support";
const MSI_EC_MODULE: &str = "/sys/module/msi_ec";

/// Other EC writers and missing prerequisites found on this system
#[derive(Debug)]
pub struct ConflictDetection {
    /// Whether the EC debug interface file exists
    pub interface_present: bool,
    /// `Some(false)` if ec_sys is loaded read-only, `None` if not loaded
    pub write_support: Option<bool>,
    /// Whether the msi_ec platform driver is loaded
    pub msi_ec_loaded: bool,
    /// Active services known to write the same EC registers
    pub services: Vec<String>,
}

impl ConflictDetection {
    /// Returns true if anything would stop us from or fight us over the EC
    pub fn has_conflicts(&self) -> bool {
        !self.interface_present
            || self.write_support != Some(true)
            || self.msi_ec_loaded
            || !self.services.is_empty()
    }

    /// Human readable findings, one per line
    pub fn messages(&self) -> Vec<String> {
        let mut messages = Vec::new();

        if !self.interface_present {
            messages.push(
                "EC debug interface is missing. Load it with 'modprobe ec_sys write_support=1'."
                    .to_string(),
            );
        }

        match self.write_support {
            Some(true) => {}
            Some(false) => messages.push(
                "ec_sys is loaded without write support. Reload it with write_support=1.".to_string(),
            ),
            None => messages.push("ec_sys module is not loaded.".to_string()),
        }

        if self.msi_ec_loaded {
            messages.push(
                "msi_ec driver is loaded. It manages the same EC registers and may override fan settings."
                    .to_string(),
            );
        }

        for service in &self.services {
            messages.push(format!(
                "{service} is active. It writes to the EC and may fight over fan or battery settings."
            ));
        }

        messages
    }

    pub fn get_conflict_message(&self) -> String {
        if !self.has_conflicts() {
            return "No conflicts detected. EC interface is writable.".to_string();
        }

        let mut message = "Potential problems detected:\n".to_string();
        for line in self.messages() {
            message.push_str("- ");
            message.push_str(&line);
            message.push('\n');
        }
        message
    }
}

/// Detect if systemctl is available
fn systemctl_exists() -> bool {
    Command::new("sh")
        .arg("-c")
        .arg("command -v systemctl")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Check if a specific systemd service is active.
fn is_service_active(service: &str) -> bool {
    Command::new("systemctl")
        .arg("--quiet")
        .arg("is-active")
        .arg(service)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

fn parse_write_support(value: &str) -> bool {
    matches!(value.trim(), "Y" | "y" | "1")
}

/// Check the EC interface and look for other tools driving the EC
pub fn detect_conflicts(interface_path: &Path) -> ConflictDetection {
    let write_support = read_sysfs_value(EC_SYS_WRITE_SUPPORT)
        .ok()
        .map(|v| parse_write_support(&v));

    let mut services = Vec::new();
    if systemctl_exists() {
        let known = [
            "nbfc_service.service",
            "isw.service",
            "mcontrolcenter-helper.service",
        ];
        for service in known {
            if is_service_active(service) {
                services.push(service.to_string());
            }
        }
    }

    ConflictDetection {
        interface_present: interface_path.exists(),
        write_support,
        msi_ec_loaded: Path::new(MSI_EC_MODULE).exists(),
        services,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean() -> ConflictDetection {
        ConflictDetection {
            interface_present: true,
            write_support: Some(true),
            msi_ec_loaded: false,
            services: Vec::new(),
        }
    }

    #[test]
    fn test_clean_system_has_no_conflicts() {
        let detection = clean();
        assert!(!detection.has_conflicts());
        assert!(detection.messages().is_empty());
    }

    #[test]
    fn test_each_problem_is_reported() {
        let detection = ConflictDetection {
            interface_present: false,
            write_support: Some(false),
            msi_ec_loaded: true,
            services: vec!["isw.service".to_string()],
        };

        assert!(detection.has_conflicts());
        assert_eq!(detection.messages().len(), 4);
        assert!(detection.get_conflict_message().contains("isw.service"));
    }

    #[test]
    fn test_write_support_flag_parsing() {
        assert!(parse_write_support("Y\n"));
        assert!(parse_write_support("1"));
        assert!(!parse_write_support("N"));
    }
}
