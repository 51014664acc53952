//! Command execution: backend assembly and the per-command flows.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use serde_json::json;
use stepper_config::{Backend, Config};
use stepper_core::{ControllerCfg, StepMotor, StepMotorGroup};
use stepper_traits::{Actuator, Bus, Port, SLOT_COUNT};
use thiserror::Error;

use crate::cli::Commands;

/// Failures raised by the CLI flows themselves.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("controller did not go idle within {ms} ms")]
    IdleTimeout { ms: u64 },
    #[error("port {port} stopped at {position}, short of target {target}")]
    NotReached {
        port: Port,
        target: i32,
        position: i32,
    },
    #[error("interrupted before script row {row}")]
    Interrupted { row: usize },
    #[error("gpio backend requires a build with --features hardware on Linux")]
    BackendUnavailable,
}

/// Per-invocation settings shared by every command flow.
struct Settings {
    ctl: ControllerCfg,
    idle: Duration,
    json: bool,
}

impl Settings {
    fn idle_timeout(&self) -> CliError {
        CliError::IdleTimeout {
            ms: u64::try_from(self.idle.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

pub fn run(cmd: &Commands, cfg: &Config, json: bool) -> eyre::Result<()> {
    let settings = Settings {
        ctl: ControllerCfg::try_from(cfg)?,
        idle: cfg.idle_timeout(),
        json,
    };
    match cfg.bus.backend {
        Backend::Sim => {
            let bus = stepper_hardware::SimBus::new(stepper_hardware::SimCfg {
                step_period: Duration::from_micros(cfg.sim.step_period_us),
                connected: cfg.sim_connected()?,
            });
            run_on(&bus, cmd, cfg, &settings)
        }
        Backend::Gpio => {
            #[cfg(all(feature = "hardware", target_os = "linux"))]
            {
                let pins = cfg.pin_map()?.map(|p| {
                    p.map(|p| stepper_hardware::gpio::StepDirPins {
                        step: p.step,
                        dir: p.dir,
                        enable: p.enable,
                    })
                });
                let bus = stepper_hardware::gpio::GpioBus::new(pins, cfg.hardware.max_steps_per_sec)
                    .wrap_err("open GPIO")?;
                run_on(&bus, cmd, cfg, &settings)
            }
            #[cfg(not(all(feature = "hardware", target_os = "linux")))]
            {
                Err(CliError::BackendUnavailable.into())
            }
        }
    }
}

fn run_on<B: Bus>(bus: &B, cmd: &Commands, cfg: &Config, s: &Settings) -> eyre::Result<()> {
    match cmd {
        Commands::Move { port, to, speed } => move_one(bus, s, *port, *to, *speed),
        Commands::Group { set } => {
            let mut ports = Vec::with_capacity(set.len());
            let mut targets = [None; SLOT_COUNT];
            for &(port, pos) in set {
                if targets[port.index()].replace(pos).is_some() {
                    eyre::bail!("port {port} assigned twice");
                }
                ports.push(port);
            }
            let g = StepMotorGroup::open(bus, &ports, &s.ctl)?;
            let started = Instant::now();
            g.targets().set_many(targets);
            settle_group(&g, s)?;
            report_positions(&g, "group", None, started, s.json)?;
            Ok(g.shutdown()?)
        }
        Commands::Script { file } => {
            let rows = stepper_config::load_script_csv(file)?;
            run_script(bus, cfg, s, &rows)
        }
        Commands::SelfCheck => {
            let g = StepMotorGroup::open(bus, &cfg.ports()?, &s.ctl)?;
            report_positions(&g, "self-check", None, Instant::now(), s.json)?;
            Ok(g.shutdown()?)
        }
    }
}

fn move_one<B: Bus>(
    bus: &B,
    s: &Settings,
    port: Port,
    to: i32,
    speed: Option<i8>,
) -> eyre::Result<()> {
    let m = StepMotor::open(bus, port, &s.ctl)?;
    if let Some(v) = speed {
        m.set_speed(v);
    }
    let started = Instant::now();
    m.set_target(to);
    if !m.wait_idle(s.idle) {
        m.brake()?;
        return Err(s.idle_timeout().into());
    }
    if let Some(e) = m.last_error() {
        return Err(e).wrap_err_with(|| format!("move port {port} to {to}"));
    }
    let position = m.position()?;
    let stats = m.stats();
    m.shutdown()?;
    if position != to {
        tracing::warn!(%port, target = to, position, stalls = stats.stalls, "target not reached");
        return Err(CliError::NotReached {
            port,
            target: to,
            position,
        }
        .into());
    }

    let elapsed = elapsed_ms(started);
    tracing::info!(%port, target = to, position, moves = stats.moves, "move finished");
    if s.json {
        println!(
            "{}",
            json!({
                "command": "move",
                "port": port.to_string(),
                "target": to,
                "position": position,
                "moves": stats.moves,
                "duration_ms": elapsed,
            })
        );
    } else {
        println!(
            "port {port}: target {to}, position {position} ({} move(s), {elapsed} ms)",
            stats.moves
        );
    }
    Ok(())
}

fn run_script<B: Bus>(
    bus: &B,
    cfg: &Config,
    s: &Settings,
    rows: &[stepper_config::ScriptRow],
) -> eyre::Result<()> {
    let ports = cfg.ports()?;
    for (i, row) in rows.iter().enumerate() {
        for (slot, cell) in row.targets().iter().enumerate() {
            let port = Port::ALL[slot];
            if cell.is_some() && !ports.contains(&port) {
                eyre::bail!(
                    "script row {} sets port {port}, which is not in bus.ports",
                    i + 2
                );
            }
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .wrap_err("install Ctrl-C handler")?;
    }

    let g = StepMotorGroup::open(bus, &ports, &s.ctl)?;
    for (i, row) in rows.iter().enumerate() {
        let row_no = i + 2;
        if stop.load(Ordering::SeqCst) {
            tracing::warn!(row = row_no, "script interrupted");
            g.brake_all()?;
            return Err(CliError::Interrupted { row: row_no }.into());
        }
        let started = Instant::now();
        g.targets().set_many(row.targets());
        settle_group(&g, s).wrap_err_with(|| format!("script row {row_no}"))?;
        report_positions(&g, "script", Some(row_no), started, s.json)?;
    }
    Ok(g.shutdown()?)
}

/// Wait for the group to go idle, then surface any fault from the passes
/// and any bound slot left short of its target.
fn settle_group<A: Actuator + 'static>(g: &StepMotorGroup<A>, s: &Settings) -> eyre::Result<()> {
    let faults_before = g.stats().faults;
    if !g.wait_idle(s.idle) {
        g.brake_all()?;
        return Err(s.idle_timeout().into());
    }
    if g.stats().faults > faults_before
        && let Some(e) = g.last_error()
    {
        return Err(e.into());
    }
    let targets = g.targets().snapshot();
    for (slot, pos) in g.positions()?.into_iter().enumerate() {
        if let Some(position) = pos
            && position != targets[slot]
        {
            let port = Port::ALL[slot];
            tracing::warn!(%port, target = targets[slot], position, "target not reached");
            return Err(CliError::NotReached {
                port,
                target: targets[slot],
                position,
            }
            .into());
        }
    }
    Ok(())
}

fn report_positions<A: Actuator + 'static>(
    g: &StepMotorGroup<A>,
    command: &str,
    row: Option<usize>,
    started: Instant,
    json: bool,
) -> eyre::Result<()> {
    let positions = g.positions()?;
    let elapsed = elapsed_ms(started);
    if json {
        let mut map = serde_json::Map::new();
        for (slot, pos) in positions.iter().enumerate() {
            if let Some(p) = pos {
                map.insert(Port::ALL[slot].to_string(), json!(p));
            }
        }
        let mut obj = json!({
            "command": command,
            "positions": map,
            "duration_ms": elapsed,
        });
        if let Some(r) = row {
            obj["row"] = json!(r);
        }
        println!("{obj}");
    } else {
        let parts: Vec<String> = positions
            .iter()
            .enumerate()
            .filter_map(|(slot, pos)| pos.map(|p| format!("{}: {p}", Port::ALL[slot])))
            .collect();
        match row {
            Some(r) => println!("row {r}: {} ({elapsed} ms)", parts.join(", ")),
            None => println!("{command}: {} ({elapsed} ms)", parts.join(", ")),
        }
    }
    Ok(())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
