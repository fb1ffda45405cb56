use std::io;

/// Failure kinds of a single access to the EC debug interface.
#[derive(Debug, thiserror::Error)]
pub enum EcError {
    #[error(
        "EC interface '{0}' not found. Make sure the ec_sys module is loaded with write_support=1"
    )]
    InterfaceMissing(String),

    #[error("Permission denied: {0}. Try running with sudo.")]
    PermissionDenied(String),

    #[error("I/O error on EC interface: {0}")]
    Io(String),

    #[error("No data read from EC address {0:#04x}")]
    EmptyRead(u8),
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("EC access failed: {0}")]
    Ec(#[from] EcError),

    #[error("Invalid fan profile selector {0}, expected 1 (auto) to 4 (cooler booster)")]
    InvalidProfileSelector(u8),

    #[error("Invalid value for setting: {0}")]
    InvalidValue(String),

    #[error("Battery capacity could not be determined from any source")]
    NoCapacitySourceAvailable,

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

// A unified error type for the entire application
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Control(#[from] ControlError),

    #[error("{0}")]
    Ec(#[from] EcError),

    #[error("{0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("{0}")]
    Generic(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl AppError {
    /// Whether the failure is most likely fixed by running as root.
    pub const fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            Self::Ec(EcError::PermissionDenied(_))
                | Self::Control(ControlError::Ec(EcError::PermissionDenied(_)))
        )
    }
}
