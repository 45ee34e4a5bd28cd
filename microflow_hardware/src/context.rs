use crate::rng::{RandomFactory, seeded_factory};
use crate::settings::SimSettings;
use crate::tracing_log::TracingLog;
use microflow_traits::{MonotonicClock, SharedClock, SharedLog};
use std::sync::Arc;

/// Collaborators handed to every device at construction.
#[derive(Clone)]
pub struct SimContext {
    pub settings: SimSettings,
    pub clock: SharedClock,
    pub log: SharedLog,
    pub random: RandomFactory,
}

impl SimContext {
    pub fn new(
        settings: SimSettings,
        clock: SharedClock,
        log: SharedLog,
        random: RandomFactory,
    ) -> Self {
        Self {
            settings,
            clock,
            log,
            random,
        }
    }

    pub fn with_settings(mut self, settings: SimSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_log(mut self, log: SharedLog) -> Self {
        self.log = log;
        self
    }

    pub fn with_random(mut self, random: RandomFactory) -> Self {
        self.random = random;
        self
    }
}

impl Default for SimContext {
    /// Real time, `tracing` events, OS-seeded randomness.
    fn default() -> Self {
        Self {
            settings: SimSettings::default(),
            clock: MonotonicClock::shared(),
            log: Arc::new(TracingLog),
            random: seeded_factory(None),
        }
    }
}

impl std::fmt::Debug for SimContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
