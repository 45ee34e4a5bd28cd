#![allow(dead_code)]

use microflow_core::{DeviceRegistry, MultiPumpController};
use microflow_hardware::{FaultInjection, SimContext, SimSettings, fixed_factory};
use microflow_traits::{FixedRandom, ManualClock, MemoryLog, SharedClock};
use std::sync::Arc;
use std::time::Duration;

pub fn settings() -> SimSettings {
    SimSettings {
        tick: Duration::from_millis(10),
        stop_timeout: Duration::from_millis(500),
        atomizer_warmup: Duration::from_millis(200),
        faults: FaultInjection::disabled(),
    }
}

pub fn context(clock: SharedClock, log: Arc<MemoryLog>) -> SimContext {
    SimContext::default()
        .with_settings(settings())
        .with_clock(clock)
        .with_log(log)
        .with_random(fixed_factory(FixedRandom::midpoint()))
}

/// Four pumps and `A1` on a manual clock.
pub fn manual_controller() -> (MultiPumpController, ManualClock, Arc<MemoryLog>) {
    let clock = ManualClock::new();
    let log = MemoryLog::shared();
    let registry = Arc::new(DeviceRegistry::new(context(
        Arc::new(clock.clone()),
        log.clone(),
    )));
    (
        MultiPumpController::with_pumps(registry, 4, 100.0),
        clock,
        log,
    )
}

/// Four pumps and `A1` on the real clock.
pub fn realtime_controller() -> MultiPumpController {
    let registry = Arc::new(DeviceRegistry::new(context(
        microflow_traits::MonotonicClock::shared(),
        MemoryLog::shared(),
    )));
    MultiPumpController::with_pumps(registry, 4, 100.0)
}

pub fn rates(pairs: &[(&str, f64)]) -> std::collections::BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
}

/// Poll `cond` every few milliseconds until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Run `id` dry at full flow so it latches `Error`.
pub fn deplete(c: &MultiPumpController, clock: &ManualClock, id: &str) {
    let pump = c.pump(id).unwrap();
    pump.set_flow_rate(14.0).unwrap();
    pump.start().unwrap();
    // 14 ml/min for ten minutes is more than the 100 ml reservoir
    clock.advance(Duration::from_secs(600));
    assert!(wait_until(Duration::from_secs(2), || {
        pump.state() == microflow_traits::DeviceState::Error
    }));
}

/// Like `manual_controller`, but every atomizer tick injects a fault.
pub fn faulty_atomizer_controller() -> MultiPumpController {
    let clock = ManualClock::new();
    let ctx = context(Arc::new(clock), MemoryLog::shared()).with_settings(SimSettings {
        faults: FaultInjection {
            enabled: true,
            pump_probability: 0.0,
            atomizer_probability: 1.0,
        },
        ..settings()
    });
    MultiPumpController::with_pumps(Arc::new(DeviceRegistry::new(ctx)), 4, 100.0)
}
