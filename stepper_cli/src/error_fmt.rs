//! Human-readable error descriptions, exit codes and structured JSON errors.

use serde_json::json;
use stepper_core::{BuildError, StepError};

use crate::run::CliError;

/// First error of type `E` anywhere in the report's chain.
fn find<'a, E: std::error::Error + 'static>(err: &'a eyre::Report) -> Option<&'a E> {
    err.chain().find_map(|c| c.downcast_ref::<E>())
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(se) = find::<StepError>(err) {
        return match se {
            StepError::NotConnected(p) => format!(
                "What happened: No actuator is connected on port {p}.\nLikely causes: Wrong port letter, or the port is missing from sim.connected / [pins.{p}].\nHow to fix: Check the wiring and the config, then rerun."
            ),
            StepError::PortBusy(p) => format!(
                "What happened: Port {p} is already bound by another controller.\nLikely causes: The same port was requested twice.\nHow to fix: Use each port in one controller only."
            ),
            StepError::Timeout(p) => format!(
                "What happened: Timed out talking to the actuator on port {p}.\nLikely causes: Driver not powered or not responding.\nHow to fix: Check power and wiring, then rerun."
            ),
            StepError::Hardware { port, reason } | StepError::HardwareFault { port, reason } => {
                format!(
                    "What happened: Hardware error on port {port} ({reason}).\nLikely causes: Wiring, GPIO permissions or a driver fault.\nHow to fix: Re-run with --log-level=debug for details."
                )
            }
            StepError::State(msg) => format!(
                "What happened: {msg}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(be) = find::<BuildError>(err) {
        return match be {
            BuildError::NoPorts => {
                "What happened: No ports to control.\nLikely causes: bus.ports is empty.\nHow to fix: List at least one port, e.g. ports = [\"A\"].".to_string()
            }
            BuildError::DuplicatePort(p) => format!(
                "What happened: Port {p} was requested twice.\nLikely causes: Duplicate entry in bus.ports or on the command line.\nHow to fix: List each port once."
            ),
            BuildError::Spawn(msg) => format!(
                "What happened: Could not start the control loop ({msg}).\nLikely causes: The system is out of threads or memory.\nHow to fix: Free resources and rerun."
            ),
        };
    }

    if let Some(ce) = find::<CliError>(err) {
        return match ce {
            CliError::IdleTimeout { ms } => format!(
                "What happened: Motion did not finish within {ms} ms.\nLikely causes: Target too far for the speed, a stalled actuator, or timeout too low.\nHow to fix: Raise motion.idle_timeout_ms or the speed."
            ),
            CliError::Interrupted { row } => format!(
                "What happened: Script interrupted by Ctrl-C before row {row}.\nLikely causes: Operator stop.\nHow to fix: Rerun the script when ready."
            ),
            CliError::NotReached {
                port,
                target,
                position,
            } => format!(
                "What happened: Port {port} stopped at {position}, short of target {target}.\nLikely causes: Zero speed, a stalled or blocked shaft, or a brake during the move.\nHow to fix: Check the speed and the mechanics, then rerun."
            ),
            CliError::BackendUnavailable => {
                "What happened: The gpio backend is not available in this build.\nLikely causes: Built without the hardware feature or not on Linux.\nHow to fix: Rebuild with --features hardware, or set bus.backend = \"sim\".".to_string()
            }
        };
    }

    // String-based heuristics for errors coming from config or scripts
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("motion script must have headers") {
        return "Invalid headers in motion script. Expected 'a,b,c,d'.".to_string();
    }

    if lower.contains("invalid configuration") || lower.contains("parse config") {
        return format!(
            "What happened: Configuration is invalid ({}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun.",
            err.root_cause()
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes; anything unclassified returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(se) = find::<StepError>(err) {
        return match se {
            StepError::NotConnected(_) => 3,
            StepError::PortBusy(_) => 4,
            StepError::Timeout(_) | StepError::Hardware { .. } | StepError::HardwareFault { .. } => 5,
            StepError::State(_) => 1,
        };
    }
    if find::<BuildError>(err).is_some() {
        return 2;
    }
    if let Some(ce) = find::<CliError>(err) {
        return match ce {
            CliError::IdleTimeout { .. } => 6,
            CliError::NotReached { .. } => 5,
            CliError::Interrupted { .. } => 130,
            CliError::BackendUnavailable => 1,
        };
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(se) = find::<StepError>(err) {
        return match se {
            StepError::NotConnected(_) => "NotConnected",
            StepError::PortBusy(_) => "PortBusy",
            StepError::Timeout(_) => "Timeout",
            StepError::Hardware { .. } | StepError::HardwareFault { .. } => "Hardware",
            StepError::State(_) => "State",
        };
    }
    if find::<BuildError>(err).is_some() {
        return "Build";
    }
    match find::<CliError>(err) {
        Some(CliError::IdleTimeout { .. }) => "IdleTimeout",
        Some(CliError::Interrupted { .. }) => "Interrupted",
        Some(CliError::NotReached { .. }) => "NotReached",
        Some(CliError::BackendUnavailable) => "BackendUnavailable",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    let mut obj = json!({
        "reason": reason_name(err),
        "message": humanize(err),
    });
    let port = find::<StepError>(err)
        .and_then(StepError::port)
        .or_else(|| match find::<CliError>(err) {
            Some(CliError::NotReached { port, .. }) => Some(*port),
            _ => None,
        });
    if let Some(p) = port {
        obj["port"] = json!(p.to_string());
    }
    obj.to_string()
}
