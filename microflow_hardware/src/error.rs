use microflow_traits::DeviceState;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeviceError {
    #[error("invalid {field}: {value} (must be between {min} and {max})")]
    Validation {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("invalid volume: {0} ml (must be positive)")]
    InvalidVolume(f64),
    #[error("invalid mode: {0:?} (must be one of analog, digital, frequency)")]
    InvalidMode(String),
    #[error("not enough volume remaining: requested {requested} ml, available {available} ml")]
    InsufficientVolume { requested: f64, available: f64 },
    #[error("cannot {op} while {state}")]
    InvalidState { op: &'static str, state: DeviceState },
    #[error("device is faulted; clear the fault before restarting")]
    Faulted,
    #[error("a dispense is already in progress")]
    Busy,
    #[error("target flow rate is zero; nothing would be dispensed")]
    ZeroFlowRate,
    #[error("failed to spawn update loop: {0}")]
    Spawn(String),
}

impl DeviceError {
    /// Whether the error was raised by input checking, before any state changed.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DeviceError::Validation { .. }
                | DeviceError::InvalidVolume(_)
                | DeviceError::InvalidMode(_)
                | DeviceError::ZeroFlowRate
        )
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
