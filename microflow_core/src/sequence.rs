//! Declarative, time-phased pump sequences.
//!
//! A step waits for its delay, then runs its actions grouped by kind:
//! frequency/amplitude/mode changes and fault acknowledgements inline first,
//! then set-flow, start, dispense and stop, each group fanned out across its
//! pumps.
use crate::error::{ControlError, Result};
use microflow_hardware::PumpMode;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum PumpAction {
    /// Start the pump; a rate is applied in the set-flow phase first.
    Start { rate: Option<f64> },
    Stop,
    SetFlow { rate: f64 },
    SetFrequency { hz: f64 },
    SetAmplitude { pct: f64 },
    SetMode(PumpMode),
    /// Acknowledge a fault (Error → Off); runs with the inline changes.
    ClearFault,
    Dispense { volume: f64, rate: Option<f64> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepAction {
    pub pump_id: String,
    pub action: PumpAction,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceStep {
    pub delay: Duration,
    pub actions: Vec<StepAction>,
}

impl SequenceStep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with(mut self, pump_id: impl Into<String>, action: PumpAction) -> Self {
        self.actions.push(StepAction {
            pump_id: pump_id.into(),
            action,
        });
        self
    }
}

/// A step's actions sorted into execution groups.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct StepPlan {
    pub inline: Vec<(String, PumpAction)>,
    pub set_flow: BTreeMap<String, f64>,
    pub start: Vec<String>,
    pub dispense: BTreeMap<String, f64>,
    pub dispense_rates: BTreeMap<String, f64>,
    pub stop: Vec<String>,
    pub unknown: Vec<String>,
}

/// Reject a step that names the same pump twice.
pub(crate) fn check_step(step_no: usize, step: &SequenceStep) -> Result<()> {
    let mut seen = BTreeSet::new();
    for a in &step.actions {
        if !seen.insert(a.pump_id.as_str()) {
            return Err(ControlError::SequenceConflict {
                step: step_no,
                pump_id: a.pump_id.clone(),
            });
        }
    }
    Ok(())
}

pub(crate) fn plan_step(step: &SequenceStep, is_managed: impl Fn(&str) -> bool) -> StepPlan {
    let mut plan = StepPlan::default();
    for StepAction { pump_id, action } in &step.actions {
        if !is_managed(pump_id) {
            plan.unknown.push(pump_id.clone());
            continue;
        }
        let id = pump_id.clone();
        match action {
            PumpAction::Start { rate } => {
                if let Some(rate) = rate {
                    plan.set_flow.insert(id.clone(), *rate);
                }
                plan.start.push(id);
            }
            PumpAction::Stop => plan.stop.push(id),
            PumpAction::SetFlow { rate } => {
                plan.set_flow.insert(id, *rate);
            }
            PumpAction::Dispense { volume, rate } => {
                if let Some(rate) = rate {
                    plan.dispense_rates.insert(id.clone(), *rate);
                }
                plan.dispense.insert(id, *volume);
            }
            PumpAction::SetFrequency { .. }
            | PumpAction::SetAmplitude { .. }
            | PumpAction::SetMode(_)
            | PumpAction::ClearFault => plan.inline.push((id, action.clone())),
        }
    }
    plan
}
