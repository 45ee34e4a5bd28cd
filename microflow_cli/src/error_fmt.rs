//! Human-readable error descriptions and structured JSON error formatting.

use microflow_core::ControlError;
use microflow_hardware::DeviceError;
use thiserror::Error;

/// Failures raised by the CLI itself rather than by a device.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid sequence file: {0}")]
    InvalidSequence(String),
    #[error("sequence interrupted after {completed} step(s)")]
    Interrupted { completed: usize },
    #[error("{failed} sequence step(s) had failures")]
    StepsFailed { failed: usize },
    #[error("self-check failed on {failed} device(s)")]
    SelfCheckFailed { failed: usize },
}

fn explain(what: &str, causes: &str, fix: &str) -> String {
    format!("What happened: {what}\nLikely causes: {causes}\nHow to fix: {fix}")
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(ce) = err.downcast_ref::<CliError>() {
        return match ce {
            CliError::InvalidConfig(msg) => explain(
                &format!("Invalid configuration ({msg})."),
                "Missing or out-of-range values in the TOML.",
                "Edit the config file, then rerun. Omit --config to use the built-in defaults.",
            ),
            CliError::InvalidSequence(msg) => explain(
                &format!("The sequence file could not be used ({msg})."),
                "Unknown action name, missing volume/rate, or a negative delay.",
                "Each [[steps.actions]] needs `pump` and `action` plus the action's parameter.",
            ),
            CliError::Interrupted { completed } => explain(
                &format!("The sequence was interrupted after {completed} step(s)."),
                "Ctrl-C was pressed while the sequence was running.",
                "Rerun the sequence; every device was stopped on exit.",
            ),
            CliError::StepsFailed { failed } => explain(
                &format!("{failed} sequence step(s) reported failures."),
                "Out-of-range parameters, an empty reservoir, or a pump id that is not configured.",
                "Inspect the per-phase results printed above and fix the offending actions.",
            ),
            CliError::SelfCheckFailed { failed } => explain(
                &format!("{failed} device(s) failed the self-check."),
                "A device is faulted or its update loop could not be started.",
                "Re-run with --log-level=debug to see which operation failed.",
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<ControlError>() {
        return match ce {
            ControlError::SequenceConflict { step, pump_id } => explain(
                &format!("Step {step} names pump {pump_id} more than once."),
                "Two actions for the same pump were placed in one step.",
                "Move one of the actions into its own step (use delay_s = 0 to keep timing).",
            ),
            ControlError::NotFound { kind, id } => explain(
                &format!("No {kind} with id {id} is configured."),
                "The id is misspelled or missing from the [[pumps]]/[atomizer] config.",
                "Add the device to the config or fix the id.",
            ),
            ControlError::Device { id, source } if matches!(source, DeviceError::Faulted) => {
                explain(
                    &format!("Device {id} is faulted."),
                    "A simulated fault was injected (see --faults / [faults]).",
                    "Add a `clear_fault` action for the device before starting it again.",
                )
            }
            other => explain(
                &format!("{other}."),
                "See logs.",
                "Re-run with --log-level=debug or set RUST_LOG for more detail.",
            ),
        };
    }

    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes; anything unrecognised exits with 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(ce) = err.downcast_ref::<CliError>() {
        return match ce {
            CliError::InvalidConfig(_) | CliError::InvalidSequence(_) => 3,
            CliError::StepsFailed { .. } => 5,
            CliError::SelfCheckFailed { .. } => 6,
            CliError::Interrupted { .. } => 130,
        };
    }
    if let Some(ce) = err.downcast_ref::<ControlError>() {
        return match ce {
            ControlError::SequenceConflict { .. } | ControlError::Config(_) => 3,
            _ => 4,
        };
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(ce) = err.downcast_ref::<CliError>() {
        return match ce {
            CliError::InvalidConfig(_) => "InvalidConfig",
            CliError::InvalidSequence(_) => "InvalidSequence",
            CliError::Interrupted { .. } => "Interrupted",
            CliError::StepsFailed { .. } => "StepsFailed",
            CliError::SelfCheckFailed { .. } => "SelfCheckFailed",
        };
    }
    if let Some(ce) = err.downcast_ref::<ControlError>() {
        return match ce {
            ControlError::NotFound { .. } => "NotFound",
            ControlError::Device { .. } => "Device",
            ControlError::UnknownAction(_) => "UnknownAction",
            ControlError::MissingParameter(_) => "MissingParameter",
            ControlError::SequenceConflict { .. } => "SequenceConflict",
            ControlError::Config(_) => "Config",
            ControlError::Panicked(_) => "Panicked",
        };
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({ "reason": reason_name(err), "message": humanize(err) });
    if let Some(ControlError::SequenceConflict { step, pump_id }) = err.downcast_ref::<ControlError>() {
        obj["details"] = json!({ "step": step, "pump_id": pump_id });
    }
    obj.to_string()
}
