#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `microflow`: drive the simulated pumps and atomizer from the command line.

mod cli;
mod demo;
mod error_fmt;
mod logging;

use clap::Parser;
use cli::{Cli, Commands, JSON_MODE};
use error_fmt::{CliError, exit_code_for_error, format_error_json, humanize};
use eyre::WrapErr;
use microflow_config::Config;
use microflow_core::conversions::{sequence_steps, sim_context};
use microflow_core::{BatchReport, MultiPumpController};
use microflow_traits::ManualClock;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn main() {
    // Without the default features this only installs the plain report handler.
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = run(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn load_config(path: Option<&Path>) -> eyre::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    microflow_config::load_toml(&text)
        .map_err(|e| CliError::InvalidConfig(e.message().to_string()).into())
}

fn print_json(value: &impl serde::Serialize) -> eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> eyre::Result<()> {
    let mut cfg = load_config(cli.config.as_deref())?;
    if cli.seed.is_some() {
        cfg.simulation.seed = cli.seed;
    }
    if cli.faults {
        cfg.faults.enabled = true;
    }
    cfg.validate()
        .map_err(|e| CliError::InvalidConfig(e.to_string()))?;
    let _log_guard = logging::init(cli.json, cli.log_level.as_deref(), &cfg.logging)?;

    let mut ctx = sim_context(&cfg);
    if cli.instant {
        ctx = ctx.with_clock(Arc::new(ManualClock::new()));
    }
    let controller = MultiPumpController::from_config(&cfg, ctx);
    tracing::info!(
        pumps = controller.pump_ids().len(),
        atomizer = controller.atomizer_id(),
        instant = cli.instant,
        "simulator ready"
    );

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        if let Err(e) = ctrlc::set_handler(move || running.store(false, Ordering::SeqCst)) {
            tracing::warn!(error = %e, "Ctrl-C handler not installed");
        }
    }

    let result = match cli.cmd {
        Commands::Status => print_json(&controller.registry().snapshot()),
        Commands::Demo => demo::run(&controller, cli.json),
        Commands::Run { sequence } => run_sequence(&controller, &sequence, &running),
        Commands::SelfCheck => self_check(&controller),
    };
    let stopped = controller.shutdown();
    tracing::info!(stopped, "shutdown complete");
    result
}

fn run_sequence(
    controller: &MultiPumpController,
    path: &Path,
    running: &AtomicBool,
) -> eyre::Result<()> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read sequence {}", path.display()))?;
    let file = microflow_config::load_sequence_toml(&text)
        .map_err(|e| CliError::InvalidSequence(e.message().to_string()))?;
    file.validate()
        .map_err(|e| CliError::InvalidSequence(e.to_string()))?;
    let steps = sequence_steps(&file)?;
    tracing::info!(steps = steps.len(), file = %path.display(), "running sequence");

    let report = controller.run_sequence_while(&steps, || running.load(Ordering::SeqCst))?;
    print_json(&json!({
        "report": report,
        "success": report.success(),
        "snapshot": controller.registry().snapshot(),
    }))?;

    if report.interrupted {
        return Err(CliError::Interrupted {
            completed: report.steps.len(),
        }
        .into());
    }
    let failed = report.steps.iter().filter(|s| !s.success()).count();
    if failed > 0 {
        return Err(CliError::StepsFailed { failed }.into());
    }
    Ok(())
}

/// Start and stop every pump and the atomizer once, reporting each outcome.
fn self_check(controller: &MultiPumpController) -> eyre::Result<()> {
    let started = controller.start_all(None);
    let stopped = controller.stop_all();

    let mut atomizer = BatchReport::default();
    let id = controller.atomizer_id().to_string();
    let outcome = controller
        .apply_atomizer(microflow_core::AtomizerCommand::On)
        .and_then(|()| controller.apply_atomizer(microflow_core::AtomizerCommand::Off));
    atomizer.insert(id, outcome);

    print_json(&json!({
        "start": started,
        "stop": stopped,
        "atomizer": atomizer,
    }))?;

    let failed = [&started, &stopped, &atomizer]
        .iter()
        .map(|r| r.len() - r.succeeded())
        .sum::<usize>();
    if failed > 0 {
        return Err(CliError::SelfCheckFailed { failed }.into());
    }
    Ok(())
}
