#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and motion-script parsing for the stepper controllers.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Motion scripts are CSV files with strict `a,b,c,d` headers; each row is
//!   one set of group targets, empty cells keep the previous target.
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use stepper_traits::{Port, SLOT_COUNT};

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sim,
    Gpio,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BusCfg {
    pub backend: Backend,
    /// Ports to bind, e.g. ["A", "C"].
    pub ports: Vec<String>,
}

impl Default for BusCfg {
    fn default() -> Self {
        Self {
            backend: Backend::Sim,
            ports: vec!["A".into()],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MotionCfg {
    /// Initial speed for every bound port. Sign is ignored.
    pub speed: i8,
    /// How long the CLI waits for a controller to go idle (ms).
    pub idle_timeout_ms: u64,
    /// Ports whose polarity is reversed.
    pub reverse: Vec<String>,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            speed: i8::MAX,
            idle_timeout_ms: 30_000,
            reverse: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimCfg {
    /// Step interval at full speed (microseconds). 0 applies moves instantly.
    pub step_period_us: u64,
    /// Ports with a simulated motor attached. Defaults to all.
    pub connected: Option<Vec<String>>,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            step_period_us: 500,
            connected: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PinCfg {
    pub step: u8,
    pub dir: u8,
    pub enable: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Hardware {
    /// Step rate of a step/dir driver at full speed.
    pub max_steps_per_sec: u32,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            max_steps_per_sec: 800,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub bus: BusCfg,
    #[serde(default)]
    pub motion: MotionCfg,
    #[serde(default)]
    pub sim: SimCfg,
    /// Step/dir wiring per port, keyed by port letter (gpio backend).
    #[serde(default)]
    pub pins: BTreeMap<String, PinCfg>,
    #[serde(default)]
    pub hardware: Hardware,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Parse a list of port letters, rejecting unknown letters and duplicates.
pub fn parse_ports(what: &str, names: &[String]) -> eyre::Result<Vec<Port>> {
    let mut out: Vec<Port> = Vec::with_capacity(names.len());
    for n in names {
        let p: Port = n
            .parse()
            .map_err(|e| eyre::eyre!("{what}: {e}"))?;
        if out.contains(&p) {
            eyre::bail!("{what}: port {p} listed twice");
        }
        out.push(p);
    }
    Ok(out)
}

impl Config {
    /// Ports to bind, in configured order.
    pub fn ports(&self) -> eyre::Result<Vec<Port>> {
        parse_ports("bus.ports", &self.bus.ports)
    }

    pub fn reversed(&self) -> eyre::Result<Vec<Port>> {
        parse_ports("motion.reverse", &self.motion.reverse)
    }

    /// How long a command waits for its controller to go idle.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.motion.idle_timeout_ms)
    }

    /// Connected mask for the simulated bus.
    pub fn sim_connected(&self) -> eyre::Result<[bool; SLOT_COUNT]> {
        match &self.sim.connected {
            None => Ok([true; SLOT_COUNT]),
            Some(names) => {
                let mut mask = [false; SLOT_COUNT];
                for p in parse_ports("sim.connected", names)? {
                    mask[p.index()] = true;
                }
                Ok(mask)
            }
        }
    }

    /// Pin wiring indexed by port.
    pub fn pin_map(&self) -> eyre::Result<[Option<PinCfg>; SLOT_COUNT]> {
        let mut out = [None; SLOT_COUNT];
        for (name, pins) in &self.pins {
            let p: Port = name
                .parse()
                .map_err(|e| eyre::eyre!("pins: {e}"))?;
            out[p.index()] = Some(*pins);
        }
        Ok(out)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Bus
        let ports = self.ports()?;
        if ports.is_empty() {
            eyre::bail!("bus.ports must name at least one port");
        }

        // Motion
        if self.motion.speed == 0 {
            eyre::bail!("motion.speed must be non-zero");
        }
        if self.motion.idle_timeout_ms == 0 {
            eyre::bail!("motion.idle_timeout_ms must be >= 1");
        }
        if self.motion.idle_timeout_ms > 24 * 60 * 60 * 1000 {
            eyre::bail!("motion.idle_timeout_ms is unreasonably large (>24h)");
        }
        self.reversed()?;

        // Sim
        if self.sim.step_period_us > 1_000_000 {
            eyre::bail!("sim.step_period_us must be <= 1000000");
        }
        let connected = self.sim_connected()?;

        // Pins / hardware
        let pins = self.pin_map()?;
        for (i, p) in pins.iter().enumerate() {
            if let Some(p) = p
                && (p.step == p.dir || Some(p.step) == p.enable || Some(p.dir) == p.enable)
            {
                eyre::bail!("pins.{}: step, dir and enable must be distinct", Port::ALL[i]);
            }
        }
        if self.hardware.max_steps_per_sec == 0 || self.hardware.max_steps_per_sec > 100_000 {
            eyre::bail!("hardware.max_steps_per_sec must be in [1, 100000]");
        }
        match self.bus.backend {
            Backend::Sim => {
                if let Some(p) = ports.iter().find(|p| !connected[p.index()]) {
                    eyre::bail!("bus.ports: port {p} is not in sim.connected");
                }
            }
            Backend::Gpio => {
                if let Some(p) = ports.iter().find(|p| pins[p.index()].is_none()) {
                    eyre::bail!("gpio backend: missing [pins.{p}] section");
                }
            }
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        Ok(())
    }
}

/// One row of a motion script. `None` keeps the slot's current target.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptRow {
    pub a: Option<i32>,
    pub b: Option<i32>,
    pub c: Option<i32>,
    pub d: Option<i32>,
}

impl ScriptRow {
    /// Targets indexed by `Port::index()`.
    pub fn targets(&self) -> [Option<i32>; SLOT_COUNT] {
        [self.a, self.b, self.c, self.d]
    }
}

/// Read a motion script from any reader. Headers must be exactly `a,b,c,d`.
pub fn read_script<R: std::io::Read>(reader: R) -> eyre::Result<Vec<ScriptRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers: {}", e))?
        .clone();
    let expected = ["a", "b", "c", "d"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "motion script must have headers 'a,b,c,d', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<ScriptRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        if row.targets().iter().all(Option::is_none) {
            eyre::bail!("CSV row {} sets no targets", idx + 2);
        }
        rows.push(row);
    }
    if rows.is_empty() {
        eyre::bail!("motion script has no rows");
    }
    Ok(rows)
}

pub fn load_script_csv(path: &Path) -> eyre::Result<Vec<ScriptRow>> {
    let file = std::fs::File::open(path)
        .map_err(|e| eyre::eyre!("open motion script {:?}: {}", path, e))?;
    read_script(file)
}
