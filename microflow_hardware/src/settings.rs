//! Runtime knobs shared by every simulated device.
use std::time::Duration;

/// Randomized fault injection policy.
///
/// Each tick of a running device draws one independent trial with the
/// device kind's probability. Disabled injection never draws.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultInjection {
    pub enabled: bool,
    /// Per-tick fault probability for pumps.
    pub pump_probability: f64,
    /// Per-tick fault probability for atomizers.
    pub atomizer_probability: f64,
}

impl FaultInjection {
    pub const DEFAULT_PUMP_PROBABILITY: f64 = 0.001;
    pub const DEFAULT_ATOMIZER_PROBABILITY: f64 = 0.0005;

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    #[inline]
    pub fn pump(&self) -> f64 {
        if self.enabled { self.pump_probability } else { 0.0 }
    }

    #[inline]
    pub fn atomizer(&self) -> f64 {
        if self.enabled {
            self.atomizer_probability
        } else {
            0.0
        }
    }
}

impl Default for FaultInjection {
    fn default() -> Self {
        Self {
            enabled: false,
            pump_probability: Self::DEFAULT_PUMP_PROBABILITY,
            atomizer_probability: Self::DEFAULT_ATOMIZER_PROBABILITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimSettings {
    /// Period of each device's update loop.
    pub tick: Duration,
    /// Upper bound on how long `stop()` waits for a loop to quiesce.
    pub stop_timeout: Duration,
    /// Simulated transducer warm-up paid by `Atomizer::start`.
    pub atomizer_warmup: Duration,
    pub faults: FaultInjection,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            stop_timeout: Duration::from_secs(1),
            atomizer_warmup: Duration::from_millis(200),
            faults: FaultInjection::default(),
        }
    }
}
