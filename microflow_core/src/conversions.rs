//! Bridging `microflow_config` types to simulator and controller types.

use crate::controller::MultiPumpController;
use crate::error::ControlError;
use crate::registry::DeviceRegistry;
use crate::sequence::{PumpAction, SequenceStep, StepAction};
use microflow_config::{ActionCfg, ActionKind, Config, SequenceFile, StepCfg};
use microflow_hardware::{FaultInjection, PumpMode, SimContext, SimSettings, seeded_factory};
use std::sync::Arc;
use std::time::Duration;

// ── Simulation settings ──────────────────────────────────────────────────────

pub fn sim_settings(cfg: &Config) -> SimSettings {
    SimSettings {
        tick: Duration::from_millis(cfg.simulation.tick_ms),
        stop_timeout: Duration::from_millis(cfg.simulation.stop_timeout_ms),
        atomizer_warmup: Duration::from_millis(cfg.simulation.atomizer_warmup_ms),
        faults: FaultInjection {
            enabled: cfg.faults.enabled,
            pump_probability: cfg.faults.pump_probability,
            atomizer_probability: cfg.faults.atomizer_probability,
        },
    }
}

/// Real clock, `tracing` events, and per-device streams from the configured seed.
pub fn sim_context(cfg: &Config) -> SimContext {
    SimContext::default()
        .with_settings(sim_settings(cfg))
        .with_random(seeded_factory(cfg.simulation.seed))
}

// ── Devices ──────────────────────────────────────────────────────────────────

impl MultiPumpController {
    /// Register the configured pumps and atomizer in a fresh registry.
    pub fn from_config(cfg: &Config, ctx: SimContext) -> Self {
        let registry = Arc::new(DeviceRegistry::new(ctx));
        for p in &cfg.pumps {
            registry.add_pump(&p.id, p.initial_volume);
        }
        registry.add_atomizer(&cfg.atomizer.id);
        let ids = cfg.pumps.iter().map(|p| p.id.clone()).collect();
        Self::new(registry, ids, cfg.atomizer.id.clone())
    }
}

// ── Sequences ────────────────────────────────────────────────────────────────

impl TryFrom<&ActionCfg> for StepAction {
    type Error = ControlError;

    fn try_from(a: &ActionCfg) -> Result<Self, Self::Error> {
        let action = match &a.kind {
            ActionKind::Start { rate } => PumpAction::Start { rate: *rate },
            ActionKind::Stop => PumpAction::Stop,
            ActionKind::ClearFault => PumpAction::ClearFault,
            ActionKind::SetFlow { rate } => PumpAction::SetFlow { rate: *rate },
            ActionKind::SetFrequency { frequency } => PumpAction::SetFrequency { hz: *frequency },
            ActionKind::SetAmplitude { amplitude } => PumpAction::SetAmplitude { pct: *amplitude },
            ActionKind::SetMode { mode } => PumpAction::SetMode(
                mode.parse::<PumpMode>()
                    .map_err(|e| ControlError::Config(format!("pump {}: {e}", a.pump)))?,
            ),
            ActionKind::Dispense { volume, rate } => PumpAction::Dispense {
                volume: *volume,
                rate: *rate,
            },
        };
        Ok(StepAction {
            pump_id: a.pump.clone(),
            action,
        })
    }
}

impl TryFrom<&StepCfg> for SequenceStep {
    type Error = ControlError;

    fn try_from(s: &StepCfg) -> Result<Self, Self::Error> {
        let delay = Duration::try_from_secs_f64(s.delay_s)
            .map_err(|e| ControlError::Config(format!("delay_s {}: {e}", s.delay_s)))?;
        let actions = s
            .actions
            .iter()
            .map(StepAction::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SequenceStep { delay, actions })
    }
}

pub fn sequence_steps(file: &SequenceFile) -> Result<Vec<SequenceStep>, ControlError> {
    file.steps.iter().map(SequenceStep::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config() {
        let cfg = microflow_config::load_toml("[simulation]\ntick_ms = 25\n[faults]\nenabled = true\n")
            .unwrap();
        let s = sim_settings(&cfg);
        assert_eq!(s.tick, Duration::from_millis(25));
        assert!(s.faults.enabled);
        assert_eq!(s.faults.pump(), 0.001);
    }

    #[test]
    fn bad_mode_is_config_error() {
        let file = microflow_config::load_sequence_toml(
            "[[steps]]\n[[steps.actions]]\npump = \"P1\"\naction = \"set_mode\"\nmode = \"turbo\"\n",
        )
        .unwrap();
        assert!(matches!(sequence_steps(&file), Err(ControlError::Config(_))));
    }

    #[test]
    fn negative_delay_is_config_error() {
        let step = StepCfg {
            delay_s: -1.0,
            actions: Vec::new(),
        };
        assert!(SequenceStep::try_from(&step).is_err());
    }
}
