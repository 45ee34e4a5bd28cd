//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "microflow", version, about = "Microfluidic hardware simulator")]
pub struct Cli {
    /// Path to simulator config TOML; built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log as JSON lines instead of pretty, and report errors as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging].level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Base seed for device randomness; overrides [simulation].seed
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Enable random fault injection
    #[arg(long, action = ArgAction::SetTrue)]
    pub faults: bool,

    /// Simulated time: waits, warm-ups and dispenses complete instantly
    #[arg(long, action = ArgAction::SetTrue)]
    pub instant: bool,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a status snapshot of every configured device as JSON
    Status,
    /// Walk through starting, dispensing, parameter changes, a sequence and the atomizer
    Demo,
    /// Run a sequence file step by step (Ctrl-C stops between steps)
    Run {
        /// Sequence TOML ([[steps]] with [[steps.actions]])
        #[arg(long, value_name = "FILE")]
        sequence: PathBuf,
    },
    /// Start and stop every device once
    SelfCheck,
}
