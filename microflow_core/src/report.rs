//! Aggregated results of fan-out operations and sequences.
use crate::error::ControlError;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Result of one operation on one device.
pub type Outcome = Result<(), ControlError>;

#[derive(Serialize)]
struct OutcomeView {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&Outcome> for OutcomeView {
    fn from(o: &Outcome) -> Self {
        Self {
            ok: o.is_ok(),
            error: o.as_ref().err().map(ToString::to_string),
        }
    }
}

/// Per-device outcomes of one fan-out, keyed by device id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub results: BTreeMap<String, Outcome>,
}

impl BatchReport {
    pub fn insert(&mut self, id: impl Into<String>, outcome: Outcome) {
        self.results.insert(id.into(), outcome);
    }

    pub fn get(&self, id: &str) -> Option<&Outcome> {
        self.results.get(id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// True when every device succeeded (vacuously true when empty).
    pub fn success(&self) -> bool {
        self.results.values().all(Result::is_ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ControlError)> {
        self.results
            .iter()
            .filter_map(|(id, r)| r.as_ref().err().map(|e| (id.as_str(), e)))
    }

    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.is_ok()).count()
    }

    pub(crate) fn merge(&mut self, other: BatchReport) {
        self.results.extend(other.results);
    }
}

impl Serialize for BatchReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.results.len()))?;
        for (id, outcome) in &self.results {
            map.serialize_entry(id, &OutcomeView::from(outcome))?;
        }
        map.end()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ok", self.succeeded(), self.len())?;
        for (id, e) in self.failures() {
            write!(f, "; {id}: {e}")?;
        }
        Ok(())
    }
}

/// Per-field outcome of `set_parameters`. Fields that were not requested are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterReport {
    pub pump_id: String,
    pub frequency: Option<Outcome>,
    pub amplitude: Option<Outcome>,
    pub mode: Option<Outcome>,
    pub flow_rate: Option<Outcome>,
}

impl ParameterReport {
    fn fields(&self) -> [(&'static str, &Option<Outcome>); 4] {
        [
            ("frequency", &self.frequency),
            ("amplitude", &self.amplitude),
            ("mode", &self.mode),
            ("flow_rate", &self.flow_rate),
        ]
    }

    /// Conjunction of every applied field.
    pub fn success(&self) -> bool {
        self.fields()
            .into_iter()
            .all(|(_, o)| o.as_ref().is_none_or(Result::is_ok))
    }
}

impl Serialize for ParameterReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ParameterReport", 6)?;
        s.serialize_field("pump_id", &self.pump_id)?;
        s.serialize_field("success", &self.success())?;
        for (name, outcome) in self.fields() {
            match outcome {
                Some(o) => s.serialize_field(name, &OutcomeView::from(o))?,
                None => s.skip_field(name)?,
            }
        }
        s.end()
    }
}

/// Execution phases of a sequence step, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Frequency, amplitude and mode changes, applied one by one.
    Inline,
    SetFlow,
    Start,
    Dispense,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub results: BatchReport,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepReport {
    /// 1-based position in the sequence.
    pub step: usize,
    /// Phases that had work, in execution order.
    pub phases: Vec<PhaseReport>,
    /// Actions naming pumps this controller does not manage.
    pub skipped: BatchReport,
}

impl StepReport {
    pub fn phase(&self, phase: Phase) -> Option<&BatchReport> {
        self.phases
            .iter()
            .find(|p| p.phase == phase)
            .map(|p| &p.results)
    }

    pub fn phase_order(&self) -> Vec<Phase> {
        self.phases.iter().map(|p| p.phase).collect()
    }

    pub fn success(&self) -> bool {
        self.skipped.is_empty() && self.phases.iter().all(|p| p.results.success())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SequenceReport {
    pub steps: Vec<StepReport>,
    /// Set when the run stopped before its last step.
    pub interrupted: bool,
}

impl SequenceReport {
    pub fn success(&self) -> bool {
        !self.interrupted && self.steps.iter().all(StepReport::success)
    }
}
