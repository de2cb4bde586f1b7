mod cli;
mod commands;
mod error;

use std::process::ExitCode;

use bookprint_config::Config;
use clap::Parser;
use exn::ResultExt;
use tracing_subscriber::EnvFilter;

use crate::cli::Args;
use crate::error::ErrorKind;

/// Log to stderr; `RUST_LOG` takes precedence over the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = match Config::load(args.config.as_deref()).or_raise(|| ErrorKind::Config) {
        Ok(config) => config,
        Err(err) => {
            init_tracing("info");
            tracing::error!(error = ?err, "Unable to load configuration");
            return ExitCode::FAILURE;
        },
    };
    init_tracing(args.log_level.as_deref().unwrap_or(&config.log.level));
    match commands::run(&config, args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = ?err, "Command failed");
            ExitCode::FAILURE
        },
    }
}
