use crate::{
    cli::Args,
    config::{create_default_config, init_config},
};

use aries::{Aries, AriesError};
use clap::Parser;
use std::{path::PathBuf, process::ExitCode, time::Duration};

mod cli;
mod config;
mod logging;

fn should_create_config() -> bool {
    std::env::var("CREATE_CONFIG")
        .map(|val| val == "1" || val.to_lowercase() == "true")
        .unwrap_or(false)
}

fn main() -> ExitCode {
    logging::init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<AriesError>() {
            Some(AriesError::Connection { addr, source }) => {
                tracing::error!(%addr, "Connection failed: {}", source);
                eprintln!("connection failed.");
                ExitCode::from(1)
            }
            _ => {
                eprintln!("Error: {:#}", e);
                ExitCode::from(2)
            }
        },
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    if should_create_config() {
        let path = create_default_config(None::<PathBuf>)?;
        tracing::info!(path = %path.display(), "Default configuration written");
    }

    let (config_manager, config) = init_config().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Run with CREATE_CONFIG=1 to create a default configuration file.");
        e
    })?;
    tracing::debug!(path = %config_manager.path().display(), "Configuration loaded");

    let mut aries = Aries::connect(&args.host, args.port, config)?;

    let result = execute(&mut aries, &args);
    let closed = aries.shutdown(false);

    result?;
    closed?;
    Ok(())
}

fn execute(aries: &mut Aries, args: &Args) -> anyhow::Result<()> {
    if let Some(speeds) = &args.speed {
        aries.set_speeds(speeds)?;
    }

    if let Some(command) = &args.command {
        let response = aries.raw_command(command)?;
        println!("{}", response);
        return Ok(());
    }

    if let Some(degrees) = &args.set_position {
        let targets = aries.set_position(degrees)?;
        tracing::info!(?targets, "Move issued");

        if args.wait {
            let max_wait = args.max_wait.map(max_wait).transpose()?;
            aries.wait_until_stopped(max_wait)?;
        }
        return Ok(());
    }

    print_position(aries)
}

fn max_wait(seconds: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| anyhow::anyhow!("invalid --max-wait value: {}", seconds))
}

fn print_position(aries: &mut Aries) -> anyhow::Result<()> {
    let degrees = aries.position()?;
    let pulses = aries.position_by_pulse()?;

    println!("position: {}", join(&degrees));
    println!("position_by_pulse: {}", join(&pulses));
    Ok(())
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("/")
}
