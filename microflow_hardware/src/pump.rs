//! Simulated piezoelectric micropump behind a four-channel
//! amplitude/frequency driver.
//!
//! Ratings modeled:
//! - Flow rate 0–14 ml/min, ramped at most 2 ml/min per second
//! - Back pressure 0–500 mbar (random walk)
//! - Drive frequency 25–800 Hz (nominal 100 Hz), amplitude 0–100 %
//! - Control modes: analog, digital, frequency
//!
//! `PumpModel` holds the pure physics and setpoint rules; `Pump` wraps it in
//! one mutex, owns the background loop, and reports events.
use crate::context::SimContext;
use crate::error::{DeviceError, Result};
use crate::util::{check_range, check_volume, frequency_factor};
use crate::worker::Worker;
use microflow_traits::{Device, DeviceState, EventLevel, RandomSource};
use serde::Serialize;
use std::fmt;
use std::ops::ControlFlow;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const MAX_FLOW_RATE: f64 = 14.0;
pub const MIN_FREQUENCY_HZ: f64 = 25.0;
pub const MAX_FREQUENCY_HZ: f64 = 800.0;
pub const DEFAULT_FREQUENCY_HZ: f64 = 100.0;
pub const MAX_PRESSURE_MBAR: f64 = 500.0;
/// Bound of the per-tick pressure random walk.
pub const PRESSURE_JITTER_MBAR: f64 = 10.0;
/// Acceleration limit of the flow rate, in ml/min per second.
pub const RAMP_ML_PER_MIN_PER_S: f64 = 2.0;
pub const DEFAULT_INITIAL_VOLUME: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PumpMode {
    Analog,
    Digital,
    #[default]
    Frequency,
}

impl PumpMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PumpMode::Analog => "analog",
            PumpMode::Digital => "digital",
            PumpMode::Frequency => "frequency",
        }
    }
}

impl fmt::Display for PumpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PumpMode {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "analog" => Ok(PumpMode::Analog),
            "digital" => Ok(PumpMode::Digital),
            "frequency" => Ok(PumpMode::Frequency),
            _ => Err(DeviceError::InvalidMode(s.to_string())),
        }
    }
}

/// Immutable snapshot of a pump.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PumpStatus {
    pub pump_id: String,
    pub state: DeviceState,
    pub flow_rate: f64,
    pub target_flow_rate: f64,
    pub volume_remaining: f64,
    pub pressure: f64,
    pub total_dispensed: f64,
    pub frequency: f64,
    pub amplitude: f64,
    pub mode: PumpMode,
    pub fault_status: bool,
    pub dispensing: bool,
}

/// What a single tick did to the pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// Reservoir ran dry; the pump is now in `Error`.
    Depleted,
    /// Injected random fault; the pump is now in `Error`.
    Faulted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PumpModel {
    pub state: DeviceState,
    pub flow_rate: f64,
    pub target_flow_rate: f64,
    pub volume_remaining: f64,
    pub total_dispensed: f64,
    pub pressure: f64,
    pub frequency: f64,
    pub amplitude: f64,
    pub mode: PumpMode,
    pub fault_status: bool,
    /// A dispense owns volume accounting while set; ticks do not book flow.
    pub dispensing: bool,
    /// Instant of the previous tick (or of the start when no tick ran yet).
    pub last_tick: Option<Instant>,
    /// Incremented on each start so a stale loop can recognise it is stale.
    pub run_id: u64,
}

impl PumpModel {
    pub fn new(initial_volume: f64) -> Self {
        Self {
            state: DeviceState::Off,
            flow_rate: 0.0,
            target_flow_rate: 0.0,
            volume_remaining: initial_volume.max(0.0),
            total_dispensed: 0.0,
            pressure: 0.0,
            frequency: DEFAULT_FREQUENCY_HZ,
            amplitude: 0.0,
            mode: PumpMode::default(),
            fault_status: false,
            dispensing: false,
            last_tick: None,
            run_id: 0,
        }
    }

    /// Set the target flow rate; amplitude follows linearly (14 ml/min = 100 %).
    pub fn apply_flow_rate(&mut self, rate: f64) -> Result<()> {
        let rate = check_range("flow rate", rate, 0.0, MAX_FLOW_RATE)?;
        self.target_flow_rate = rate;
        self.amplitude = (rate / MAX_FLOW_RATE * 100.0).min(100.0).round();
        Ok(())
    }

    /// Change drive frequency, rescaling the target by the efficiency ratio.
    /// Returns the previous frequency.
    pub fn apply_frequency(&mut self, hz: f64) -> Result<f64> {
        let hz = check_range("frequency", hz, MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ)?;
        let prev = self.frequency;
        self.target_flow_rate *= frequency_factor(hz) / frequency_factor(prev);
        self.frequency = hz;
        Ok(prev)
    }

    /// Amplitude is authoritative: the target flow is derived from it.
    /// Returns the previous amplitude.
    pub fn apply_amplitude(&mut self, pct: f64) -> Result<f64> {
        let pct = check_range("amplitude", pct, 0.0, 100.0)?;
        let prev = self.amplitude;
        self.amplitude = pct;
        self.target_flow_rate = pct / 100.0 * MAX_FLOW_RATE * frequency_factor(self.frequency);
        Ok(prev)
    }

    /// Advance the physics to `now`.
    pub fn tick(
        &mut self,
        now: Instant,
        rng: &mut dyn RandomSource,
        fault_probability: f64,
    ) -> TickOutcome {
        let elapsed = self
            .last_tick
            .map_or(Duration::ZERO, |t| now.saturating_duration_since(t))
            .as_secs_f64();
        self.last_tick = Some(now);

        let max_change = RAMP_ML_PER_MIN_PER_S * elapsed;
        if self.flow_rate < self.target_flow_rate {
            self.flow_rate = (self.flow_rate + max_change).min(self.target_flow_rate);
        } else if self.flow_rate > self.target_flow_rate {
            self.flow_rate = (self.flow_rate - max_change).max(self.target_flow_rate);
        }

        if !self.dispensing {
            let dispensed = self.flow_rate / 60.0 * elapsed;
            if dispensed > 0.0 {
                if dispensed <= self.volume_remaining {
                    self.volume_remaining -= dispensed;
                    self.total_dispensed += dispensed;
                } else {
                    self.total_dispensed += self.volume_remaining;
                    self.volume_remaining = 0.0;
                    self.enter_error();
                    return TickOutcome::Depleted;
                }
            }
        }

        let jitter = rng.uniform(-PRESSURE_JITTER_MBAR, PRESSURE_JITTER_MBAR);
        self.pressure = (self.pressure + jitter).clamp(0.0, MAX_PRESSURE_MBAR);

        if rng.chance(fault_probability) {
            self.enter_error();
            return TickOutcome::Faulted;
        }
        TickOutcome::Continue
    }

    /// Flow readback is frozen at its last value.
    fn enter_error(&mut self) {
        self.state = DeviceState::Error;
        self.fault_status = true;
    }

    pub fn status(&self, pump_id: &str) -> PumpStatus {
        PumpStatus {
            pump_id: pump_id.to_string(),
            state: self.state,
            flow_rate: self.flow_rate,
            target_flow_rate: self.target_flow_rate,
            volume_remaining: self.volume_remaining,
            pressure: self.pressure,
            total_dispensed: self.total_dispensed,
            frequency: self.frequency,
            amplitude: self.amplitude,
            mode: self.mode,
            fault_status: self.fault_status,
            dispensing: self.dispensing,
        }
    }
}

struct Shared {
    id: String,
    model: Mutex<PumpModel>,
    rng: Mutex<Box<dyn RandomSource>>,
    ctx: SimContext,
}

impl Shared {
    fn model(&self) -> MutexGuard<'_, PumpModel> {
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn event(&self, level: EventLevel, message: &str) {
        self.ctx.log.record(level, &self.id, message);
    }

    fn tick(&self, run_id: u64) -> ControlFlow<()> {
        let now = self.ctx.clock.now();
        let fault_probability = self.ctx.settings.faults.pump();
        let outcome = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            let mut m = self.model();
            if m.state != DeviceState::On || m.run_id != run_id {
                return ControlFlow::Break(());
            }
            m.tick(now, &mut **rng, fault_probability)
        };
        match outcome {
            TickOutcome::Continue => ControlFlow::Continue(()),
            TickOutcome::Depleted => {
                self.event(EventLevel::Warn, "ran out of liquid");
                ControlFlow::Break(())
            }
            TickOutcome::Faulted => {
                self.event(EventLevel::Error, "encountered a simulated random error");
                ControlFlow::Break(())
            }
        }
    }
}

/// Clears the dispensing flag on every exit path of a dispense.
struct DispenseClaim<'a> {
    shared: &'a Shared,
}

impl Drop for DispenseClaim<'_> {
    fn drop(&mut self) {
        self.shared.model().dispensing = false;
    }
}

pub struct Pump {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl Pump {
    pub fn new(id: impl Into<String>, initial_volume: f64, ctx: &SimContext) -> Self {
        let id = id.into();
        let rng = (ctx.random)(&id);
        let shared = Arc::new(Shared {
            model: Mutex::new(PumpModel::new(initial_volume)),
            rng: Mutex::new(rng),
            ctx: ctx.clone(),
            id,
        });
        shared.event(
            EventLevel::Info,
            &format!("initialized with {initial_volume}ml"),
        );
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

    pub fn status(&self) -> PumpStatus {
        self.shared.model().status(&self.shared.id)
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

    /// Off → On; spawns the update loop.
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
            m.state = DeviceState::On;
            m.last_tick = Some(self.shared.ctx.clock.now());
            m.run_id = m.run_id.wrapping_add(1);
            m.run_id
        };
        // A loop that ended on its own (depletion, fault) is still parked here.
        drop(slot.take());

        let shared = Arc::clone(&self.shared);
        let spawned = Worker::spawn(
            format!("pump-{}", self.shared.id),
            self.shared.ctx.settings.tick,
            move || shared.tick(run_id),
        );
        match spawned {
            Ok(w) => *slot = Some(w),
            Err(e) => {
                self.shared.model().state = DeviceState::Off;
                return Err(self.reject(DeviceError::Spawn(e.to_string())));
            }
        }
        drop(slot);

        let s = self.status();
        self.shared.event(
            EventLevel::Info,
            &format!(
                "started at {} ml/min (freq: {} Hz, amp: {}%)",
                s.flow_rate, s.frequency, s.amplitude
            ),
        );
        Ok(())
    }

    /// On → Off; waits (bounded) for the loop to quiesce and zeroes the flow.
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
            let mut m = self.shared.model();
            if m.state != DeviceState::On {
                let state = m.state;
                drop(m);
                return Err(self.reject(DeviceError::InvalidState { op: "stop", state }));
            }
            m.state = DeviceState::Off;
            m.flow_rate = 0.0;
            m.last_tick = None;
        }
        drop(slot);
        self.shared.event(EventLevel::Info, "stopped");
        Ok(())
    }

    /// Error → Off. Required before a faulted pump may start again.
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
            m.fault_status = false;
            m.flow_rate = 0.0;
            m.last_tick = None;
        }
        drop(slot.take());
        drop(slot);
        self.shared.event(EventLevel::Info, "fault cleared");
        Ok(())
    }

    pub fn set_flow_rate(&self, rate: f64) -> Result<()> {
        let (running, amplitude) = {
            let mut m = self.shared.model();
            if let Err(e) = m.apply_flow_rate(rate) {
                drop(m);
                return Err(self.reject(e));
            }
            (m.state == DeviceState::On, m.amplitude)
        };
        let msg = if running {
            format!("flow rate changing to {rate} ml/min (amplitude: {amplitude}%)")
        } else {
            format!("flow rate set to {rate} ml/min (amplitude: {amplitude}%, pump not running)")
        };
        self.shared.event(EventLevel::Info, &msg);
        Ok(())
    }

    pub fn set_frequency(&self, hz: f64) -> Result<()> {
        let (prev, target) = {
            let mut m = self.shared.model();
            match m.apply_frequency(hz) {
                Ok(prev) => (prev, m.target_flow_rate),
                Err(e) => {
                    drop(m);
                    return Err(self.reject(e));
                }
            }
        };
        self.shared.event(
            EventLevel::Info,
            &format!(
                "frequency changed from {prev} Hz to {hz} Hz; flow rate adjusted to {target:.2} ml/min"
            ),
        );
        Ok(())
    }

    pub fn set_amplitude(&self, pct: f64) -> Result<()> {
        let (prev, target) = {
            let mut m = self.shared.model();
            match m.apply_amplitude(pct) {
                Ok(prev) => (prev, m.target_flow_rate),
                Err(e) => {
                    drop(m);
                    return Err(self.reject(e));
                }
            }
        };
        self.shared.event(
            EventLevel::Info,
            &format!(
                "amplitude changed from {prev}% to {pct}% (estimated flow rate: {target:.2} ml/min)"
            ),
        );
        Ok(())
    }

    pub fn set_mode(&self, mode: PumpMode) -> Result<()> {
        let prev = std::mem::replace(&mut self.shared.model().mode, mode);
        self.shared.event(
            EventLevel::Info,
            &format!("mode changed from {prev} to {mode}"),
        );
        Ok(())
    }

    /// Parse and apply a textual mode.
    pub fn set_mode_str(&self, mode: &str) -> Result<()> {
        let mode = mode.parse::<PumpMode>().map_err(|e| self.reject(e))?;
        self.set_mode(mode)
    }

    pub fn refill(&self, volume: f64) -> Result<()> {
        let volume = check_volume(volume).map_err(|e| self.reject(e))?;
        let total = {
            let mut m = self.shared.model();
            m.volume_remaining += volume;
            m.volume_remaining
        };
        self.shared.event(
            EventLevel::Info,
            &format!("refilled with {volume}ml. New volume: {total}ml"),
        );
        Ok(())
    }

    /// Dispense exactly `volume` ml, optionally at `rate` ml/min.
    ///
    /// Blocks the caller for `volume / rate * 60` seconds on the device clock.
    /// A pump that was off is started for the duration and stopped afterwards.
    pub fn dispense_volume(&self, volume: f64, rate: Option<f64>) -> Result<()> {
        self.dispense_volume_from(self.shared.ctx.clock.now(), volume, rate)
    }

    /// Like `dispense_volume`, but the wait ends at `started` plus the
    /// dispense duration. Dispenses sharing one `started` overlap in device
    /// time, so a simulated clock advances by the longest of them only.
    pub fn dispense_volume_from(
        &self,
        started: Instant,
        volume: f64,
        rate: Option<f64>,
    ) -> Result<()> {
        let volume = check_volume(volume).map_err(|e| self.reject(e))?;
        let rate = rate
            .map(|r| check_range("flow rate", r, 0.0, MAX_FLOW_RATE))
            .transpose()
            .map_err(|e| self.reject(e))?;

        let (target, amplitude, was_off) = {
            let mut m = self.shared.model();
            let checked = if m.dispensing {
                Err(DeviceError::Busy)
            } else if m.state == DeviceState::Error {
                Err(DeviceError::Faulted)
            } else if volume > m.volume_remaining {
                Err(DeviceError::InsufficientVolume {
                    requested: volume,
                    available: m.volume_remaining,
                })
            } else if rate.unwrap_or(m.target_flow_rate) <= 0.0 {
                Err(DeviceError::ZeroFlowRate)
            } else {
                Ok(())
            };
            // The rate is only applied once the dispense is accepted.
            let applied = checked.and_then(|()| rate.map_or(Ok(()), |r| m.apply_flow_rate(r)));
            if let Err(e) = applied {
                drop(m);
                return Err(self.reject(e));
            }
            m.dispensing = true;
            (m.target_flow_rate, m.amplitude, m.state == DeviceState::Off)
        };
        let _claim = DispenseClaim {
            shared: &self.shared,
        };
        if let Some(rate) = rate {
            self.shared.event(
                EventLevel::Info,
                &format!(
                    "flow rate set to {rate} ml/min for dispense (amplitude: {amplitude}%)"
                ),
            );
        }

        if was_off {
            self.start()?;
        }
        let seconds = volume / target * 60.0;
        self.shared.event(
            EventLevel::Info,
            &format!(
                "dispensing {volume}ml at {target} ml/min (will take {seconds:.1} seconds)"
            ),
        );
        self.shared
            .ctx
            .clock
            .sleep_until(started + Duration::from_secs_f64(seconds));
        if was_off {
            // A fault during the wait already left the pump in Error.
            if let Err(e) = self.stop() {
                tracing::debug!(
                    pump = %self.shared.id,
                    error = %e,
                    "scoped stop after dispense failed"
                );
            }
        }

        let remaining = {
            let mut m = self.shared.model();
            if m.state == DeviceState::Error {
                drop(m);
                return Err(self.reject(DeviceError::Faulted));
            }
            m.volume_remaining = (m.volume_remaining - volume).max(0.0);
            m.total_dispensed += volume;
            if m.state == DeviceState::On {
                m.last_tick = Some(self.shared.ctx.clock.now());
            }
            m.volume_remaining
        };
        self.shared.event(
            EventLevel::Info,
            &format!("finished dispensing {volume}ml. Remaining: {remaining}ml"),
        );
        Ok(())
    }
}

impl fmt::Debug for Pump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pump")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Device for Pump {
    fn id(&self) -> &str {
        Pump::id(self)
    }

    fn state(&self) -> DeviceState {
        Pump::state(self)
    }

    fn start(&self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Pump::start(self).map_err(Into::into)
    }

    fn stop(&self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Pump::stop(self).map_err(Into::into)
    }

    fn clear_fault(&self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Pump::clear_fault(self).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use microflow_traits::{FixedRandom, ScriptedRandom};
    use rstest::rstest;

    fn running(initial: f64) -> (PumpModel, Instant) {
        let t0 = Instant::now();
        let mut m = PumpModel::new(initial);
        m.state = DeviceState::On;
        m.last_tick = Some(t0);
        (m, t0)
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(1.0, 7.0)]
    #[case(5.0, 36.0)]
    #[case(7.0, 50.0)]
    #[case(13.99, 100.0)]
    #[case(14.0, 100.0)]
    fn flow_rate_sets_rounded_amplitude(#[case] rate: f64, #[case] amplitude: f64) {
        let mut m = PumpModel::new(100.0);
        m.apply_flow_rate(rate).unwrap();
        assert_eq!(m.amplitude, amplitude);
        assert_eq!(m.target_flow_rate, rate);
    }

    #[rstest]
    #[case(-0.1)]
    #[case(14.1)]
    #[case(f64::NAN)]
    fn invalid_flow_rate_changes_nothing(#[case] rate: f64) {
        let mut m = PumpModel::new(100.0);
        m.apply_flow_rate(3.0).unwrap();
        let before = m.clone();
        assert!(m.apply_flow_rate(rate).is_err());
        assert_eq!(m, before);
    }

    #[test]
    fn frequency_change_rescales_target() {
        let mut m = PumpModel::new(100.0);
        m.apply_flow_rate(10.0).unwrap();
        m.apply_frequency(475.0).unwrap();
        assert!((m.target_flow_rate - 7.5).abs() < 1e-12);
        m.apply_frequency(120.0).unwrap();
        assert!((m.target_flow_rate - 10.0).abs() < 1e-9);
    }

    #[test]
    fn amplitude_derives_target_from_frequency() {
        let mut m = PumpModel::new(100.0);
        m.apply_frequency(50.0).unwrap();
        m.apply_amplitude(80.0).unwrap();
        assert!((m.target_flow_rate - 0.8 * 14.0 * 0.75).abs() < 1e-12);
        assert!(m.apply_amplitude(100.5).is_err());
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("analog".parse::<PumpMode>().unwrap(), PumpMode::Analog);
        assert_eq!(" Digital ".parse::<PumpMode>().unwrap(), PumpMode::Digital);
        assert!(matches!(
            "turbo".parse::<PumpMode>(),
            Err(DeviceError::InvalidMode(_))
        ));
    }

    #[test]
    fn tick_ramps_at_most_two_ml_per_min_per_second() {
        let (mut m, t0) = running(100.0);
        m.apply_flow_rate(10.0).unwrap();
        let mut rng = FixedRandom::midpoint();
        m.tick(t0 + Duration::from_secs(1), &mut rng, 0.0);
        assert!((m.flow_rate - 2.0).abs() < 1e-9);
        m.tick(t0 + Duration::from_secs(10), &mut rng, 0.0);
        assert_eq!(m.flow_rate, 10.0);
    }

    #[test]
    fn tick_ramps_down_and_never_goes_negative() {
        let (mut m, t0) = running(100.0);
        m.flow_rate = 1.0;
        let mut rng = FixedRandom::midpoint();
        m.tick(t0 + Duration::from_secs(5), &mut rng, 0.0);
        assert_eq!(m.flow_rate, 0.0);
    }

    #[test]
    fn tick_books_dispensed_volume() {
        let (mut m, t0) = running(100.0);
        m.flow_rate = 6.0;
        m.target_flow_rate = 6.0;
        let mut rng = FixedRandom::midpoint();
        assert_eq!(
            m.tick(t0 + Duration::from_secs(10), &mut rng, 0.0),
            TickOutcome::Continue
        );
        assert!((m.total_dispensed - 1.0).abs() < 1e-9);
        assert!((m.volume_remaining - 99.0).abs() < 1e-9);
    }

    #[test]
    fn tick_skips_booking_while_dispensing() {
        let (mut m, t0) = running(100.0);
        m.flow_rate = 6.0;
        m.target_flow_rate = 6.0;
        m.dispensing = true;
        m.tick(t0 + Duration::from_secs(10), &mut FixedRandom::midpoint(), 0.0);
        assert_eq!(m.volume_remaining, 100.0);
        assert_eq!(m.total_dispensed, 0.0);
    }

    #[test]
    fn depletion_clamps_and_freezes_flow() {
        let (mut m, t0) = running(0.05);
        m.flow_rate = 6.0;
        m.target_flow_rate = 6.0;
        let out = m.tick(t0 + Duration::from_secs(1), &mut FixedRandom::midpoint(), 0.0);
        assert_eq!(out, TickOutcome::Depleted);
        assert_eq!(m.state, DeviceState::Error);
        assert_eq!(m.volume_remaining, 0.0);
        assert!((m.total_dispensed - 0.05).abs() < 1e-12);
        assert_eq!(m.flow_rate, 6.0);
        assert!(m.fault_status);
    }

    #[test]
    fn pressure_walk_is_bounded() {
        let (mut m, t0) = running(100.0);
        let mut up = FixedRandom(0.999_999);
        for i in 1..200 {
            m.tick(t0 + Duration::from_millis(i), &mut up, 0.0);
        }
        assert_eq!(m.pressure, MAX_PRESSURE_MBAR);
        let mut down = FixedRandom(0.0);
        for i in 200..400 {
            m.tick(t0 + Duration::from_millis(i), &mut down, 0.0);
        }
        assert_eq!(m.pressure, 0.0);
    }

    #[test]
    fn injected_fault_uses_probability() {
        let (mut m, t0) = running(100.0);
        // jitter draw, then fault draw
        let mut rng = ScriptedRandom::new(vec![0.5, 0.0005]);
        let out = m.tick(t0 + Duration::from_millis(100), &mut rng, 0.001);
        assert_eq!(out, TickOutcome::Faulted);
        assert_eq!(m.state, DeviceState::Error);
    }
}
