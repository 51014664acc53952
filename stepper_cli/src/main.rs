mod cli;
mod error_fmt;
mod logging;
mod run;

use std::path::Path;

use clap::Parser;
use eyre::WrapErr;

use crate::cli::{Cli, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error hooks: {e}");
    }
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(&cli) {
        tracing::error!(error = %format!("{e:#}"), "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main(cli: &Cli) -> eyre::Result<()> {
    let cfg = load_config(cli.config.as_deref())?;
    logging::init(&cli.log_level, cli.json, &cfg.logging)?;
    tracing::debug!(backend = ?cfg.bus.backend, ports = ?cfg.bus.ports, "config loaded");
    run::run(&cli.cmd, &cfg, cli.json)
}

fn load_config(path: Option<&Path>) -> eyre::Result<stepper_config::Config> {
    let cfg = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .wrap_err_with(|| format!("read config {}", p.display()))?;
            stepper_config::load_toml(&text).wrap_err("parse config")?
        }
        None => stepper_config::Config::default(),
    };
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}
