use microflow_hardware::DeviceError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Pump,
    Atomizer,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceKind::Pump => "pump",
            DeviceKind::Atomizer => "atomizer",
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    #[error("{kind} {id} not found")]
    NotFound { kind: DeviceKind, id: String },
    #[error("{id}: {source}")]
    Device {
        id: String,
        #[source]
        source: DeviceError,
    },
    #[error("unknown atomizer action: {0}")]
    UnknownAction(String),
    #[error("missing {0} parameter")]
    MissingParameter(&'static str),
    #[error("sequence step {step} has more than one action for pump {pump_id}")]
    SequenceConflict { step: usize, pump_id: String },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("operation on {0} panicked")]
    Panicked(String),
}

impl ControlError {
    pub(crate) fn pump_not_found(id: &str) -> Self {
        ControlError::NotFound {
            kind: DeviceKind::Pump,
            id: id.to_string(),
        }
    }

    pub(crate) fn device(id: &str) -> impl FnOnce(DeviceError) -> Self + '_ {
        move |source| ControlError::Device {
            id: id.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ControlError>;
