//! Guided walkthrough of every controller capability.

use eyre::WrapErr;
use microflow_core::{
    AtomizerCommand, MultiPumpController, PumpAction, PumpParameters, SequenceStep,
};
use microflow_hardware::PumpMode;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

/// Pumps the walkthrough drives; the config must provide at least this many.
const DEMO_PUMPS: usize = 4;

struct Printer {
    json: bool,
}

impl Printer {
    fn section(&self, title: &str, data: &impl Serialize, human: &str) {
        if self.json {
            let line = json!({ "section": title, "data": data });
            println!("{line}");
        } else {
            println!("== {title} ==");
            println!("{human}");
        }
    }
}

fn by_id(ids: &[String], values: &[f64]) -> BTreeMap<String, f64> {
    ids.iter().cloned().zip(values.iter().copied()).collect()
}

fn pump_table(c: &MultiPumpController) -> String {
    let mut out = String::new();
    for s in c.pump_statuses() {
        let _ = writeln!(
            out,
            "  {}: {} flow {:.2} ml/min (target {:.2}), {:.2} ml left, {:.2} ml dispensed",
            s.pump_id, s.state, s.flow_rate, s.target_flow_rate, s.volume_remaining, s.total_dispensed
        );
    }
    out.trim_end().to_string()
}

fn wait(c: &MultiPumpController, d: Duration) {
    c.registry().context().clock.sleep(d);
}

pub fn run(c: &MultiPumpController, json: bool) -> eyre::Result<()> {
    if c.pump_ids().len() < DEMO_PUMPS {
        eyre::bail!(
            "the demo needs at least {DEMO_PUMPS} pumps, {} configured",
            c.pump_ids().len()
        );
    }
    let ids = &c.pump_ids()[..DEMO_PUMPS];
    let out = Printer { json };

    // Continuous flow on every pump
    let rates = by_id(ids, &[5.0, 8.0, 10.0, 3.0]);
    let started = c.start_all(Some(&rates));
    out.section("start all", &started, &started.to_string());
    wait(c, Duration::from_secs(3));
    out.section("flowing", &c.pump_statuses(), &pump_table(c));
    let stopped = c.stop_all();
    out.section("stop all", &stopped, &stopped.to_string());

    // Precise volumes
    let volumes = by_id(ids, &[2.0, 3.0, 1.5, 4.0]);
    let dispense_rates = by_id(ids, &[6.0, 9.0, 12.0, 7.0]);
    let dispensed = c.dispense_volumes(&volumes, Some(&dispense_rates));
    out.section("dispense volumes", &dispensed, &dispensed.to_string());
    out.section("after dispense", &c.pump_statuses(), &pump_table(c));

    // Driver parameters on one pump
    let first = &ids[0];
    let params = PumpParameters {
        frequency: Some(120.0),
        amplitude: Some(80.0),
        mode: Some(PumpMode::Frequency),
        flow_rate: Some(6.0),
    };
    let applied = c.set_parameters(first, &params)?;
    out.section(
        "set parameters",
        &applied,
        &format!("  {first}: success {}", applied.success()),
    );
    let pump = c.pump(first)?;
    pump.start().wrap_err_with(|| format!("start {first}"))?;
    wait(c, Duration::from_secs(2));
    let status = pump.status();
    out.section(
        "frequency mode",
        &status,
        &format!(
            "  {first}: {} Hz, {}% amplitude, {} mode, {:.2} ml/min",
            status.frequency, status.amplitude, status.mode, status.flow_rate
        ),
    );
    pump.stop().wrap_err_with(|| format!("stop {first}"))?;

    // A timed sequence
    let steps = vec![
        SequenceStep::new()
            .with(&ids[0], PumpAction::Start { rate: Some(5.0) })
            .with(&ids[1], PumpAction::Start { rate: Some(3.0) }),
        SequenceStep::new()
            .after(Duration::from_secs(2))
            .with(&ids[0], PumpAction::Dispense { volume: 1.0, rate: None })
            .with(&ids[2], PumpAction::SetFrequency { hz: 150.0 })
            .with(&ids[3], PumpAction::SetMode(PumpMode::Digital)),
        SequenceStep::new()
            .after(Duration::from_secs(1))
            .with(&ids[0], PumpAction::Stop)
            .with(&ids[1], PumpAction::Stop)
            .with(&ids[2], PumpAction::Start { rate: Some(4.0) }),
        SequenceStep::new()
            .after(Duration::from_secs(2))
            .with(&ids[2], PumpAction::Stop),
    ];
    let report = c.run_sequence(&steps)?;
    let summary: Vec<String> = report
        .steps
        .iter()
        .map(|s| format!("  step {}: {:?} ok={}", s.step, s.phase_order(), s.success()))
        .collect();
    out.section("sequence", &report, &summary.join("\n"));

    // Atomizer
    c.apply_atomizer(AtomizerCommand::SetFrequency(115.0))?;
    c.apply_atomizer(AtomizerCommand::SetPower(75.0))?;
    c.apply_atomizer(AtomizerCommand::On)?;
    wait(c, Duration::from_secs(5));
    let a = c.atomizer_status()?;
    out.section(
        "atomizer",
        &a,
        &format!(
            "  {}: {} at {}% / {} kHz, {:.3} ml/s, {:.2} ml atomized, droplets {:.1} um",
            a.atomizer_id,
            a.state,
            a.power_level,
            a.frequency,
            a.atomization_rate,
            a.volume_atomized,
            a.droplet_size
        ),
    );
    c.apply_atomizer(AtomizerCommand::Off)?;

    out.section("final", &c.registry().snapshot(), &pump_table(c));
    Ok(())
}
