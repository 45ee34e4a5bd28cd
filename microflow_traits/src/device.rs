use serde::Serialize;
use std::fmt;

/// Lifecycle state shared by every simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceState {
    #[default]
    Off,
    On,
    /// Sticky fault; left only through `Device::clear_fault`.
    Error,
}

impl DeviceState {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceState::Off => "OFF",
            DeviceState::On => "ON",
            DeviceState::Error => "ERROR",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A continuously updated simulated device with an `Off`/`On`/`Error` lifecycle.
///
/// Implementations run their own background loop while `On`; all methods
/// take `&self` because the device guards its own state.
pub trait Device: Send + Sync {
    fn id(&self) -> &str;
    fn state(&self) -> DeviceState;
    fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Acknowledge a fault, moving the device from `Error` back to `Off`.
    fn clear_fault(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
