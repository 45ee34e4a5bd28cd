#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Multi-device orchestration on top of the simulated hardware.
//!
//! ## Architecture
//!
//! - **Registry**: owns every device by id (`registry` module)
//! - **Controller**: concurrent fan-out commands across pumps, atomizer control
//! - **Sequences**: timed steps whose actions run in a fixed phase order
//!   (inline parameter changes, set-flow, start, dispense, stop)
//! - **Reports**: per-device outcomes; one device failing never fails a batch
//!
//! The controller never touches device internals; it only calls the public
//! operations of `Pump` and `Atomizer`.

pub mod controller;
pub mod conversions;
pub mod error;
pub mod registry;
pub mod report;
pub mod sequence;

pub use controller::{AtomizerCommand, AtomizerParams, MultiPumpController, PumpParameters};
pub use error::{ControlError, DeviceKind, Result};
pub use registry::{DeviceRegistry, RegistrySnapshot};
pub use report::{
    BatchReport, Outcome, ParameterReport, Phase, PhaseReport, SequenceReport, StepReport,
};
pub use sequence::{PumpAction, SequenceStep, StepAction};
