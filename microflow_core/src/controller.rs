//! Concurrent control of a set of pumps plus one atomizer.
//!
//! Every fan-out spawns one scoped thread per targeted pump and joins all of
//! them before building its `BatchReport`, so a call returns only once each
//! device has finished. A failure on one pump never aborts the others.
use crate::error::{ControlError, DeviceKind, Result};
use crate::registry::DeviceRegistry;
use crate::report::{
    BatchReport, Outcome, ParameterReport, Phase, PhaseReport, SequenceReport, StepReport,
};
use crate::sequence::{PumpAction, SequenceStep, check_step, plan_step};
use microflow_hardware::{AtomizerStatus, Pump, PumpMode, PumpStatus};
use microflow_traits::EventLevel;
use std::collections::BTreeMap;
use std::sync::Arc;

const SOURCE: &str = "controller";

/// Parameters accepted by `set_parameters`; `None` fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PumpParameters {
    pub frequency: Option<f64>,
    pub amplitude: Option<f64>,
    pub mode: Option<PumpMode>,
    pub flow_rate: Option<f64>,
}

/// Loose parameters for a textual atomizer action.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AtomizerParams {
    /// Power level in percent.
    pub level: Option<f64>,
    /// Drive frequency in kHz.
    pub frequency: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AtomizerCommand {
    On,
    Off,
    ClearFault,
    SetPower(f64),
    SetFrequency(f64),
}

impl AtomizerCommand {
    /// Parse `on | off | clear_fault | set_power | set_frequency` with its parameter.
    pub fn parse(action: &str, params: &AtomizerParams) -> Result<Self> {
        match action {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            "clear_fault" => Ok(Self::ClearFault),
            "set_power" => params
                .level
                .map(Self::SetPower)
                .ok_or(ControlError::MissingParameter("level")),
            "set_frequency" => params
                .frequency
                .map(Self::SetFrequency)
                .ok_or(ControlError::MissingParameter("frequency")),
            other => Err(ControlError::UnknownAction(other.to_string())),
        }
    }
}

#[derive(Debug)]
pub struct MultiPumpController {
    registry: Arc<DeviceRegistry>,
    pump_ids: Vec<String>,
    atomizer_id: String,
}

impl MultiPumpController {
    /// Control already registered devices.
    pub fn new(
        registry: Arc<DeviceRegistry>,
        pump_ids: Vec<String>,
        atomizer_id: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            pump_ids,
            atomizer_id: atomizer_id.into(),
        }
    }

    /// Register pumps `P1..=Pn` and atomizer `A1`, then control them.
    pub fn with_pumps(registry: Arc<DeviceRegistry>, n: usize, initial_volume: f64) -> Self {
        let pump_ids: Vec<String> = (1..=n).map(|i| format!("P{i}")).collect();
        for id in &pump_ids {
            registry.add_pump(id, initial_volume);
        }
        registry.add_atomizer("A1");
        let this = Self::new(registry, pump_ids, "A1");
        this.log(EventLevel::Info, &format!("initialized with {n} pumps"));
        this
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn pump_ids(&self) -> &[String] {
        &self.pump_ids
    }

    pub fn atomizer_id(&self) -> &str {
        &self.atomizer_id
    }

    fn log(&self, level: EventLevel, message: &str) {
        self.registry.context().log.record(level, SOURCE, message);
    }

    fn is_managed(&self, id: &str) -> bool {
        self.pump_ids.iter().any(|p| p == id)
    }

    /// A pump this controller manages.
    pub fn pump(&self, id: &str) -> Result<Arc<Pump>> {
        if !self.is_managed(id) {
            return Err(ControlError::pump_not_found(id));
        }
        self.registry
            .pump(id)
            .ok_or_else(|| ControlError::pump_not_found(id))
    }

    /// Run `op` on every pump in `ids` concurrently and wait for all of them.
    fn fan_out<F>(&self, ids: &[String], op: F) -> BatchReport
    where
        F: Fn(&str, &Pump) -> microflow_hardware::Result<()> + Sync,
    {
        let mut report = BatchReport::default();
        let mut targets = Vec::with_capacity(ids.len());
        for id in ids {
            match self.pump(id) {
                Ok(p) => targets.push((id.as_str(), p)),
                Err(e) => report.insert(id.as_str(), Err(e)),
            }
        }

        let op = &op;
        let outcomes: Vec<(&str, Outcome)> = std::thread::scope(|s| {
            let handles: Vec<_> = targets
                .iter()
                .map(|(id, pump)| {
                    let id = *id;
                    (id, s.spawn(move || op(id, &**pump).map_err(ControlError::device(id))))
                })
                .collect();
            handles
                .into_iter()
                .map(|(id, h)| {
                    let outcome = h
                        .join()
                        .unwrap_or_else(|_| Err(ControlError::Panicked(id.to_string())));
                    (id, outcome)
                })
                .collect()
        });
        for (id, outcome) in outcomes {
            report.insert(id, outcome);
        }
        tracing::debug!(targets = ids.len(), ok = report.succeeded(), "fan-out complete");
        report
    }

    /// Apply `flow_rates` (if any), then start every managed pump.
    ///
    /// A pump whose flow rate was rejected is still started on its previous
    /// target; its entry carries the rate error unless the start itself failed.
    pub fn start_all(&self, flow_rates: Option<&BTreeMap<String, f64>>) -> BatchReport {
        let rate_failures: Vec<(String, ControlError)> = flow_rates
            .map(|rates| {
                self.set_flow_rates(rates)
                    .failures()
                    .map(|(id, e)| (id.to_string(), e.clone()))
                    .collect()
            })
            .unwrap_or_default();
        let mut report = self.start_pumps(&self.pump_ids);
        for (id, e) in rate_failures {
            if report.get(&id).is_none_or(Result::is_ok) {
                report.insert(id, Err(e));
            }
        }
        self.log(EventLevel::Info, &format!("start all: {report}"));
        report
    }

    pub fn start_pumps(&self, ids: &[String]) -> BatchReport {
        self.fan_out(ids, |_, p| p.start())
    }

    pub fn stop_all(&self) -> BatchReport {
        let report = self.stop_pumps(&self.pump_ids);
        self.log(EventLevel::Info, &format!("stop all: {report}"));
        report
    }

    pub fn stop_pumps(&self, ids: &[String]) -> BatchReport {
        self.fan_out(ids, |_, p| p.stop())
    }

    /// Acknowledge faults so the pumps may start again. Pumps that are not
    /// faulted report `InvalidState`.
    pub fn clear_faults(&self, ids: &[String]) -> BatchReport {
        let report = self.fan_out(ids, |_, p| p.clear_fault());
        self.log(EventLevel::Info, &format!("faults cleared: {report}"));
        report
    }

    /// Sequentially set target flow rates.
    pub fn set_flow_rates(&self, rates: &BTreeMap<String, f64>) -> BatchReport {
        let mut report = BatchReport::default();
        for (id, rate) in rates {
            let outcome = self
                .pump(id)
                .and_then(|p| p.set_flow_rate(*rate).map_err(ControlError::device(id)));
            report.insert(id.as_str(), outcome);
        }
        self.log(EventLevel::Info, &format!("flow rates set: {report}"));
        report
    }

    /// Apply driver parameters in the order frequency, amplitude, mode, flow rate.
    pub fn set_parameters(&self, id: &str, params: &PumpParameters) -> Result<ParameterReport> {
        let pump = self.pump(id).inspect_err(|e| self.log(EventLevel::Error, &e.to_string()))?;
        let wrap = |r: microflow_hardware::Result<()>| r.map_err(ControlError::device(id));
        let report = ParameterReport {
            pump_id: id.to_string(),
            frequency: params.frequency.map(|hz| wrap(pump.set_frequency(hz))),
            amplitude: params.amplitude.map(|pct| wrap(pump.set_amplitude(pct))),
            mode: params.mode.map(|m| wrap(pump.set_mode(m))),
            flow_rate: params.flow_rate.map(|r| wrap(pump.set_flow_rate(r))),
        };
        self.log(
            EventLevel::Info,
            &format!("parameters for pump {id} set (success: {})", report.success()),
        );
        Ok(report)
    }

    /// Dispense concurrently; each call blocks for its own duration, all
    /// measured from one shared start.
    pub fn dispense_volumes(
        &self,
        volumes: &BTreeMap<String, f64>,
        rates: Option<&BTreeMap<String, f64>>,
    ) -> BatchReport {
        let ids: Vec<String> = volumes.keys().cloned().collect();
        let started = self.registry.context().clock.now();
        let report = self.fan_out(&ids, |id, p| {
            let volume = volumes.get(id).copied().unwrap_or(0.0);
            let rate = rates.and_then(|r| r.get(id).copied());
            p.dispense_volume_from(started, volume, rate)
        });
        self.log(EventLevel::Info, &format!("volumes dispensed: {report}"));
        report
    }

    /// Statuses of the managed pumps, in management order.
    pub fn pump_statuses(&self) -> Vec<PumpStatus> {
        self.pump_ids
            .iter()
            .filter_map(|id| self.registry.pump(id))
            .map(|p| p.status())
            .collect()
    }

    pub fn atomizer_status(&self) -> Result<AtomizerStatus> {
        self.registry
            .atomizer(&self.atomizer_id)
            .map(|a| a.status())
            .ok_or_else(|| self.atomizer_not_found())
    }

    fn atomizer_not_found(&self) -> ControlError {
        ControlError::NotFound {
            kind: DeviceKind::Atomizer,
            id: self.atomizer_id.clone(),
        }
    }

    /// Textual atomizer control: `on`, `off`, `clear_fault`, `set_power` (needs `level`),
    /// `set_frequency` (needs `frequency`).
    pub fn control_atomizer(&self, action: &str, params: &AtomizerParams) -> Result<()> {
        let cmd = AtomizerCommand::parse(action, params)
            .inspect_err(|e| self.log(EventLevel::Error, &e.to_string()))?;
        self.apply_atomizer(cmd)
    }

    pub fn apply_atomizer(&self, cmd: AtomizerCommand) -> Result<()> {
        let atomizer = self
            .registry
            .atomizer(&self.atomizer_id)
            .ok_or_else(|| self.atomizer_not_found())?;
        let outcome = match cmd {
            AtomizerCommand::On => atomizer.start(),
            AtomizerCommand::Off => atomizer.stop(),
            AtomizerCommand::ClearFault => atomizer.clear_fault(),
            AtomizerCommand::SetPower(level) => atomizer.set_power_level(level),
            AtomizerCommand::SetFrequency(khz) => atomizer.set_frequency(khz),
        };
        outcome.map_err(ControlError::device(&self.atomizer_id))
    }

    /// Check every step before anything runs.
    pub fn validate_sequence(&self, steps: &[SequenceStep]) -> Result<()> {
        steps
            .iter()
            .enumerate()
            .try_for_each(|(i, step)| check_step(i + 1, step))
    }

    /// Run `steps` in order. Nothing runs when any step is invalid.
    pub fn run_sequence(&self, steps: &[SequenceStep]) -> Result<SequenceReport> {
        self.run_sequence_while(steps, || true)
    }

    /// Like `run_sequence`, but checks `keep_going` before each step and
    /// stops early (marking the report interrupted) once it returns false.
    pub fn run_sequence_while(
        &self,
        steps: &[SequenceStep],
        keep_going: impl Fn() -> bool,
    ) -> Result<SequenceReport> {
        self.validate_sequence(steps)
            .inspect_err(|e| self.log(EventLevel::Error, &e.to_string()))?;
        let mut report = SequenceReport::default();
        for (i, step) in steps.iter().enumerate() {
            if !keep_going() {
                self.log(
                    EventLevel::Warn,
                    &format!("sequence interrupted before step {}", i + 1),
                );
                report.interrupted = true;
                return Ok(report);
            }
            report.steps.push(self.execute_step(i + 1, step));
        }
        self.log(EventLevel::Info, "sequence execution completed");
        Ok(report)
    }

    /// Run one step; `step_no` is its 1-based position, used in reports.
    pub fn run_step(&self, step_no: usize, step: &SequenceStep) -> Result<StepReport> {
        check_step(step_no, step)?;
        Ok(self.execute_step(step_no, step))
    }

    fn execute_step(&self, step_no: usize, step: &SequenceStep) -> StepReport {
        if !step.delay.is_zero() {
            self.log(
                EventLevel::Info,
                &format!(
                    "sequence step {step_no}: waiting for {:.1} seconds",
                    step.delay.as_secs_f64()
                ),
            );
            self.registry.context().clock.sleep(step.delay);
        }
        self.log(EventLevel::Info, &format!("executing sequence step {step_no}"));

        let plan = plan_step(step, |id| self.is_managed(id));
        let mut report = StepReport {
            step: step_no,
            ..StepReport::default()
        };
        for id in plan.unknown {
            self.log(EventLevel::Warn, &format!("unknown pump id: {id}"));
            let err = ControlError::pump_not_found(&id);
            report.skipped.insert(id, Err(err));
        }

        let mut push = |phase: Phase, results: BatchReport| {
            report.phases.push(PhaseReport { phase, results });
        };
        if !plan.inline.is_empty() {
            let mut results = BatchReport::default();
            for (id, action) in &plan.inline {
                results.insert(id.as_str(), self.apply_inline(id, action));
            }
            push(Phase::Inline, results);
        }
        if !plan.set_flow.is_empty() {
            push(Phase::SetFlow, self.set_flow_rates(&plan.set_flow));
        }
        if !plan.start.is_empty() {
            push(Phase::Start, self.start_pumps(&plan.start));
        }
        if !plan.dispense.is_empty() {
            push(
                Phase::Dispense,
                self.dispense_volumes(&plan.dispense, Some(&plan.dispense_rates)),
            );
        }
        if !plan.stop.is_empty() {
            push(Phase::Stop, self.stop_pumps(&plan.stop));
        }
        report
    }

    fn apply_inline(&self, id: &str, action: &PumpAction) -> Outcome {
        let pump = self.pump(id)?;
        let r = match action {
            PumpAction::SetFrequency { hz } => pump.set_frequency(*hz),
            PumpAction::SetAmplitude { pct } => pump.set_amplitude(*pct),
            PumpAction::SetMode(mode) => pump.set_mode(*mode),
            PumpAction::ClearFault => pump.clear_fault(),
            _ => Ok(()),
        };
        r.map_err(ControlError::device(id))
    }

    /// Stop every running device in the registry.
    pub fn shutdown(&self) -> usize {
        let stopped = self.registry.shutdown();
        self.log(EventLevel::Info, "shut down");
        stopped
    }
}
