#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas for the simulator setup and for sequence files.
//!
//! - `Config` describes which devices exist and how the simulation runs. Every
//!   section is optional; an empty file yields four pumps and one atomizer.
//! - `SequenceFile` is a list of timed steps, each carrying per-pump actions.
//!
//! Both are deserialized from TOML and checked with `validate()`.
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Simulation {
    /// Update loop period of every device (ms)
    pub tick_ms: u64,
    /// Upper bound on a device stop waiting for its loop (ms)
    pub stop_timeout_ms: u64,
    /// Atomizer warm-up paid on start (ms)
    pub atomizer_warmup_ms: u64,
    /// Base seed for per-device random streams; absent means OS entropy
    pub seed: Option<u64>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            stop_timeout_ms: 1000,
            atomizer_warmup_ms: 200,
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Faults {
    pub enabled: bool,
    /// Per-tick probability (0.0..=1.0)
    pub pump_probability: f64,
    /// Per-tick probability (0.0..=1.0)
    pub atomizer_probability: f64,
}

impl Default for Faults {
    fn default() -> Self {
        Self {
            enabled: false,
            pump_probability: 0.001,
            atomizer_probability: 0.0005,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PumpCfg {
    pub id: String,
    /// Reservoir content at start (ml)
    #[serde(default = "default_initial_volume")]
    pub initial_volume: f64,
}

fn default_initial_volume() -> f64 {
    100.0
}

fn default_pumps() -> Vec<PumpCfg> {
    (1..=4)
        .map(|i| PumpCfg {
            id: format!("P{i}"),
            initial_volume: default_initial_volume(),
        })
        .collect()
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AtomizerCfg {
    pub id: String,
}

impl Default for AtomizerCfg {
    fn default() -> Self {
        Self { id: "A1".into() }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub simulation: Simulation,
    pub faults: Faults,
    pub pumps: Vec<PumpCfg>,
    pub atomizer: AtomizerCfg,
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            simulation: Simulation::default(),
            faults: Faults::default(),
            pumps: default_pumps(),
            atomizer: AtomizerCfg::default(),
            logging: Logging::default(),
        }
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn check_probability(name: &str, p: f64) -> eyre::Result<()> {
    if !(p.is_finite() && (0.0..=1.0).contains(&p)) {
        eyre::bail!("{name} must be within 0.0..=1.0");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Simulation
        if self.simulation.tick_ms == 0 {
            eyre::bail!("simulation.tick_ms must be > 0");
        }
        if self.simulation.stop_timeout_ms == 0 {
            eyre::bail!("simulation.stop_timeout_ms must be > 0");
        }

        // Faults
        check_probability("faults.pump_probability", self.faults.pump_probability)?;
        check_probability(
            "faults.atomizer_probability",
            self.faults.atomizer_probability,
        )?;

        // Devices
        let mut seen = std::collections::BTreeSet::new();
        for p in &self.pumps {
            if p.id.trim().is_empty() {
                eyre::bail!("pumps.id must not be empty");
            }
            if !(p.initial_volume.is_finite() && p.initial_volume >= 0.0) {
                eyre::bail!("pumps.initial_volume must be >= 0 (pump {})", p.id);
            }
            if !seen.insert(p.id.as_str()) {
                eyre::bail!("duplicate pump id {:?}", p.id);
            }
        }
        if self.atomizer.id.trim().is_empty() {
            eyre::bail!("atomizer.id must not be empty");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref() {
            if !matches!(rot, "never" | "daily" | "hourly") {
                eyre::bail!("logging.rotation must be one of: never, daily, hourly");
            }
        }
        Ok(())
    }
}

// ── Sequence files ──

/// One pump action as written in a sequence file.
///
/// ```toml
/// [[steps.actions]]
/// pump = "P1"
/// action = "dispense"
/// volume = 1.5
/// rate = 6.0
/// ```
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ActionCfg {
    pub pump: String,
    #[serde(flatten)]
    pub kind: ActionKind,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionKind {
    Start {
        #[serde(default)]
        rate: Option<f64>,
    },
    Stop,
    SetFlow {
        rate: f64,
    },
    SetFrequency {
        frequency: f64,
    },
    SetAmplitude {
        amplitude: f64,
    },
    SetMode {
        mode: String,
    },
    ClearFault,
    Dispense {
        volume: f64,
        #[serde(default)]
        rate: Option<f64>,
    },
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct StepCfg {
    /// Wait before the step runs (seconds)
    #[serde(default)]
    pub delay_s: f64,
    #[serde(default)]
    pub actions: Vec<ActionCfg>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct SequenceFile {
    #[serde(default)]
    pub steps: Vec<StepCfg>,
}

pub fn load_sequence_toml(s: &str) -> Result<SequenceFile, toml::de::Error> {
    toml::from_str::<SequenceFile>(s)
}

impl SequenceFile {
    /// Shape checks only; device ranges and per-step conflicts are enforced
    /// when the sequence runs.
    pub fn validate(&self) -> eyre::Result<()> {
        for (i, step) in self.steps.iter().enumerate() {
            let n = i + 1;
            if !(step.delay_s.is_finite() && step.delay_s >= 0.0) {
                eyre::bail!("steps[{n}].delay_s must be >= 0");
            }
            for a in &step.actions {
                if a.pump.trim().is_empty() {
                    eyre::bail!("steps[{n}].actions.pump must not be empty");
                }
                let finite = match &a.kind {
                    ActionKind::Start { rate } => rate.is_none_or(f64::is_finite),
                    ActionKind::Stop | ActionKind::SetMode { .. } | ActionKind::ClearFault => true,
                    ActionKind::SetFlow { rate } => rate.is_finite(),
                    ActionKind::SetFrequency { frequency } => frequency.is_finite(),
                    ActionKind::SetAmplitude { amplitude } => amplitude.is_finite(),
                    ActionKind::Dispense { volume, rate } => {
                        volume.is_finite() && rate.is_none_or(f64::is_finite)
                    }
                };
                if !finite {
                    eyre::bail!("steps[{n}] action for {} has a non-finite value", a.pump);
                }
            }
        }
        Ok(())
    }
}
