#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Simulated microfluidic devices.
//!
//! ## Devices
//!
//! - [`Pump`]: piezo micropump behind an amplitude/frequency driver
//! - [`Atomizer`]: ultrasonic atomization transducer
//!
//! Every running device owns one background thread that advances its physics
//! once per [`SimSettings::tick`]. Time, randomness and event reporting come
//! from the [`SimContext`] the device was built with, so tests can swap in a
//! `ManualClock`, a scripted random source and a `MemoryLog`.

pub mod atomizer;
pub mod context;
pub mod error;
pub mod pump;
pub mod rng;
pub mod settings;
pub mod tracing_log;
pub mod util;
mod worker;

pub use atomizer::{Atomizer, AtomizerModel, AtomizerStatus};
pub use context::SimContext;
pub use error::{DeviceError, Result};
pub use pump::{Pump, PumpMode, PumpModel, PumpStatus, TickOutcome};
pub use rng::{RandomFactory, SeededRandom, fixed_factory, seeded_factory};
pub use settings::{FaultInjection, SimSettings};
pub use tracing_log::TracingLog;
