//! Simulated ultrasonic (piezo) atomization transducer.
//!
//! 108–120 kHz drive, 0–30 ml/h output linear in power, droplet size
//! shrinking from 5 µm at 0 % to 1 µm at 100 % power.
use crate::context::SimContext;
use crate::error::{DeviceError, Result};
use crate::util::check_range;
use crate::worker::Worker;
use microflow_traits::{Device, DeviceState, EventLevel, RandomSource};
use serde::Serialize;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const MIN_FREQUENCY_KHZ: f64 = 108.0;
pub const MAX_FREQUENCY_KHZ: f64 = 120.0;
pub const DEFAULT_FREQUENCY_KHZ: f64 = 113.0;
pub const DEFAULT_POWER_LEVEL: f64 = 50.0;
pub const MAX_ATOMIZATION_RATE_ML_H: f64 = 30.0;
/// Relative per-tick output variability.
pub const OUTPUT_JITTER: f64 = 0.05;

#[inline]
pub fn atomization_rate(power_level: f64) -> f64 {
    power_level / 100.0 * MAX_ATOMIZATION_RATE_ML_H
}

#[inline]
pub fn droplet_size(power_level: f64) -> f64 {
    5.0 - 4.0 * power_level / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AtomizerStatus {
    pub atomizer_id: String,
    pub state: DeviceState,
    pub power_level: f64,
    pub frequency: f64,
    pub atomization_rate: f64,
    pub volume_atomized: f64,
    pub droplet_size: f64,
    /// Seconds of cumulative `On` time, including the current run.
    pub operation_time: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtomizerModel {
    pub state: DeviceState,
    pub frequency: f64,
    pub power_level: f64,
    pub atomization_rate: f64,
    pub droplet_size: f64,
    pub volume_atomized: f64,
    /// Accumulated seconds from completed runs.
    pub operation_time: f64,
    pub started_at: Option<Instant>,
    pub last_tick: Option<Instant>,
    pub run_id: u64,
}

impl Default for AtomizerModel {
    fn default() -> Self {
        Self {
            state: DeviceState::Off,
            frequency: DEFAULT_FREQUENCY_KHZ,
            power_level: DEFAULT_POWER_LEVEL,
            atomization_rate: atomization_rate(DEFAULT_POWER_LEVEL),
            droplet_size: droplet_size(DEFAULT_POWER_LEVEL),
            volume_atomized: 0.0,
            operation_time: 0.0,
            started_at: None,
            last_tick: None,
            run_id: 0,
        }
    }
}

impl AtomizerModel {
    pub fn apply_power_level(&mut self, pct: f64) -> Result<f64> {
        let pct = check_range("power level", pct, 0.0, 100.0)?;
        let prev = self.power_level;
        self.power_level = pct;
        self.atomization_rate = atomization_rate(pct);
        self.droplet_size = droplet_size(pct);
        Ok(prev)
    }

    pub fn apply_frequency(&mut self, khz: f64) -> Result<f64> {
        let khz = check_range("frequency", khz, MIN_FREQUENCY_KHZ, MAX_FREQUENCY_KHZ)?;
        Ok(std::mem::replace(&mut self.frequency, khz))
    }

    /// Move the running time since `started_at` into the accumulator.
    pub fn fold_running_time(&mut self, now: Instant) {
        if let Some(t) = self.started_at.take() {
            self.operation_time += now.saturating_duration_since(t).as_secs_f64();
        }
    }

    /// Returns `true` when an injected fault moved the atomizer to `Error`.
    pub fn tick(&mut self, now: Instant, rng: &mut dyn RandomSource, fault_probability: f64) -> bool {
        let elapsed = self
            .last_tick
            .map_or(Duration::ZERO, |t| now.saturating_duration_since(t))
            .as_secs_f64();
        self.last_tick = Some(now);

        let nominal = self.atomization_rate / 3600.0 * elapsed;
        self.volume_atomized += nominal * rng.uniform(1.0 - OUTPUT_JITTER, 1.0 + OUTPUT_JITTER);

        if rng.chance(fault_probability) {
            self.state = DeviceState::Error;
            self.fold_running_time(now);
            return true;
        }
        false
    }

    pub fn status(&self, atomizer_id: &str, now: Instant) -> AtomizerStatus {
        let live = match (self.state, self.started_at) {
            (DeviceState::On, Some(t)) => now.saturating_duration_since(t).as_secs_f64(),
            _ => 0.0,
        };
        AtomizerStatus {
            atomizer_id: atomizer_id.to_string(),
            state: self.state,
            power_level: self.power_level,
            frequency: self.frequency,
            atomization_rate: self.atomization_rate,
            volume_atomized: self.volume_atomized,
            droplet_size: self.droplet_size,
            operation_time: self.operation_time + live,
        }
    }
}

struct Shared {
    id: String,
    model: Mutex<AtomizerModel>,
    rng: Mutex<Box<dyn RandomSource>>,
    ctx: SimContext,
}

impl Shared {
    fn model(&self) -> MutexGuard<'_, AtomizerModel> {
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn event(&self, level: EventLevel, message: &str) {
        self.ctx.log.record(level, &self.id, message);
    }

    fn tick(&self, run_id: u64) -> ControlFlow<()> {
        let now = self.ctx.clock.now();
        let fault_probability = self.ctx.settings.faults.atomizer();
        let faulted = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            let mut m = self.model();
            if m.state != DeviceState::On || m.run_id != run_id {
                return ControlFlow::Break(());
            }
            m.tick(now, &mut **rng, fault_probability)
        };
        if faulted {
            self.event(EventLevel::Error, "encountered a simulated random error");
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}

pub struct Atomizer {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl Atomizer {
    pub const DEFAULT_ID: &'static str = "A1";

    pub fn new(id: impl Into<String>, ctx: &SimContext) -> Self {
        let id = id.into();
        let rng = (ctx.random)(&id);
        let shared = Arc::new(Shared {
            model: Mutex::new(AtomizerModel::default()),
            rng: Mutex::new(rng),
            ctx: ctx.clone(),
            id,
        });
        shared.event(EventLevel::Info, "piezo atomizer initialized");
        Self {
            shared,
            worker: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn state(&self) -> DeviceState {
        self.shared.model().state
    }

    pub fn status(&self) -> AtomizerStatus {
        let now = self.shared.ctx.clock.now();
        self.shared.model().status(&self.shared.id, now)
    }

    fn worker_slot(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reject(&self, err: DeviceError) -> DeviceError {
        let level = if err.is_validation() {
            EventLevel::Error
        } else {
            EventLevel::Warn
        };
        self.shared.event(level, &err.to_string());
        err
    }

    /// Off → On, then waits out the transducer warm-up before returning.
    pub fn start(&self) -> Result<()> {
        let mut slot = self.worker_slot();
        let run_id = {
            let mut m = self.shared.model();
            match m.state {
                DeviceState::On => {
                    return Err(self.reject(DeviceError::InvalidState {
                        op: "start",
                        state: DeviceState::On,
                    }));
                }
                DeviceState::Error => return Err(self.reject(DeviceError::Faulted)),
                DeviceState::Off => {}
            }
            let now = self.shared.ctx.clock.now();
            m.state = DeviceState::On;
            m.started_at = Some(now);
            m.last_tick = Some(now);
            m.run_id = m.run_id.wrapping_add(1);
            m.run_id
        };
        drop(slot.take());

        let shared = Arc::clone(&self.shared);
        let spawned = Worker::spawn(
            format!("atomizer-{}", self.shared.id),
            self.shared.ctx.settings.tick,
            move || shared.tick(run_id),
        );
        match spawned {
            Ok(w) => *slot = Some(w),
            Err(e) => {
                let mut m = self.shared.model();
                m.state = DeviceState::Off;
                m.started_at = None;
                drop(m);
                return Err(self.reject(DeviceError::Spawn(e.to_string())));
            }
        }
        drop(slot);

        self.shared.ctx.clock.sleep(self.shared.ctx.settings.atomizer_warmup);
        let s = self.status();
        self.shared.event(
            EventLevel::Info,
            &format!(
                "started at {:.1} kHz, power level {}%",
                s.frequency, s.power_level
            ),
        );
        Ok(())
    }

    /// On → Off, folding the run into the operation time.
    pub fn stop(&self) -> Result<()> {
        let mut slot = self.worker_slot();
        let state = self.state();
        if state != DeviceState::On {
            return Err(self.reject(DeviceError::InvalidState { op: "stop", state }));
        }
        if let Some(w) = slot.take() {
            w.halt(self.shared.ctx.settings.stop_timeout);
        }
        {
            let now = self.shared.ctx.clock.now();
            let mut m = self.shared.model();
            if m.state != DeviceState::On {
                let state = m.state;
                drop(m);
                return Err(self.reject(DeviceError::InvalidState { op: "stop", state }));
            }
            m.fold_running_time(now);
            m.state = DeviceState::Off;
            m.last_tick = None;
        }
        drop(slot);
        self.shared.event(EventLevel::Info, "stopped");
        Ok(())
    }

    pub fn clear_fault(&self) -> Result<()> {
        let mut slot = self.worker_slot();
        {
            let mut m = self.shared.model();
            if m.state != DeviceState::Error {
                let state = m.state;
                drop(m);
                return Err(self.reject(DeviceError::InvalidState {
                    op: "clear fault",
                    state,
                }));
            }
            m.state = DeviceState::Off;
            m.started_at = None;
            m.last_tick = None;
        }
        drop(slot.take());
        drop(slot);
        self.shared.event(EventLevel::Info, "fault cleared");
        Ok(())
    }

    pub fn set_power_level(&self, pct: f64) -> Result<()> {
        let (prev, rate, droplet) = {
            let mut m = self.shared.model();
            match m.apply_power_level(pct) {
                Ok(prev) => (prev, m.atomization_rate, m.droplet_size),
                Err(e) => {
                    drop(m);
                    return Err(self.reject(e));
                }
            }
        };
        self.shared.event(
            EventLevel::Info,
            &format!(
                "power changed from {prev}% to {pct}% (rate: {rate:.1} ml/hr, droplet size: {droplet:.1} µm)"
            ),
        );
        Ok(())
    }

    pub fn set_frequency(&self, khz: f64) -> Result<()> {
        let prev = {
            let mut m = self.shared.model();
            match m.apply_frequency(khz) {
                Ok(prev) => prev,
                Err(e) => {
                    drop(m);
                    return Err(self.reject(e));
                }
            }
        };
        self.shared.event(
            EventLevel::Info,
            &format!("frequency changed from {prev:.1} kHz to {khz:.1} kHz"),
        );
        Ok(())
    }

    /// Zero the volume and time counters. A running atomizer keeps running and
    /// counts its live time from now.
    pub fn reset_counters(&self) {
        {
            let now = self.shared.ctx.clock.now();
            let mut m = self.shared.model();
            m.volume_atomized = 0.0;
            m.operation_time = 0.0;
            if m.state == DeviceState::On {
                m.started_at = Some(now);
                m.last_tick = Some(now);
            }
        }
        self.shared.event(EventLevel::Info, "counters reset");
    }
}

impl fmt::Debug for Atomizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atomizer")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Device for Atomizer {
    fn id(&self) -> &str {
        Atomizer::id(self)
    }

    fn state(&self) -> DeviceState {
        Atomizer::state(self)
    }

    fn start(&self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Atomizer::start(self).map_err(Into::into)
    }

    fn stop(&self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Atomizer::stop(self).map_err(Into::into)
    }

    fn clear_fault(&self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Atomizer::clear_fault(self).map_err(Into::into)
    }
}
