//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;
use stepper_traits::Port;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "stepper", version, about = "Stepper actuator controller CLI")]
pub struct Cli {
    /// Path to config TOML (defaults apply when omitted)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print results and errors as JSON lines; logs become JSON too
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); RUST_LOG wins when set
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive one actuator to an absolute position
    Move {
        /// Port the actuator is connected to (A-D)
        #[arg(long)]
        port: Port,
        /// Target position in steps
        #[arg(long, allow_hyphen_values = true)]
        to: i32,
        /// Speed override (sign is ignored)
        #[arg(long, allow_hyphen_values = true)]
        speed: Option<i8>,
    },
    /// Drive several actuators together; every move of a pass starts at once
    Group {
        /// Target per port, e.g. --set A=120 --set C=-40
        #[arg(long = "set", value_name = "PORT=POS", required = true, value_parser = parse_assignment)]
        set: Vec<(Port, i32)>,
    },
    /// Play a motion script (CSV with headers a,b,c,d), one group pass per row
    Script {
        /// Path to the CSV file
        file: PathBuf,
    },
    /// Open every configured port and report its position
    SelfCheck,
}

/// Parse `PORT=POS`.
pub fn parse_assignment(s: &str) -> Result<(Port, i32), String> {
    let (port, pos) = s
        .split_once('=')
        .ok_or_else(|| format!("expected PORT=POS, got '{s}'"))?;
    let port: Port = port.parse().map_err(|e| format!("{e}"))?;
    let pos: i32 = pos
        .trim()
        .parse()
        .map_err(|e| format!("invalid position '{}': {e}", pos.trim()))?;
    Ok((port, pos))
}
