//! Example PID client for a running bridge.
//!
//! ```bash
//! cosim-controller --scenario scenarios/mass_spring_damper.toml --reset
//! ```

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use cosim::bus::zmq::{ZmqPublisher, ZmqSubscriber};
use cosim::controller::{self, ClosedLoop, ControllerScenario};
use cosim::setup::{self, SetupError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Cosim controller
///
/// Subscribes to the bridge's combined output, computes a PID command from
/// one measured output, and publishes it on one input topic.
#[derive(Parser, Debug)]
#[command(name = "cosim-controller")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Scenario TOML file with an optional [controller] table
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Override controller.target
    #[arg(long)]
    target: Option<f64>,

    /// Ask the bridge to reset before controlling
    #[arg(long)]
    reset: bool,

    /// Seconds to wait after connecting, so subscriptions propagate
    #[arg(long, default_value = "1.0")]
    startup_delay: f64,

    /// Stop after this many commands
    #[arg(long)]
    max_commands: Option<u64>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "cosim-controller failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), SetupError> {
    let mut scenario = match &cli.scenario {
        Some(path) => ControllerScenario::load(path)?,
        None => ControllerScenario::default(),
    };
    if let Some(target) = cli.target {
        scenario.controller.target = target;
    }
    let config = &scenario.controller;

    let interrupt = setup::interrupt_signal()?;
    let ctx = zmq::Context::new();
    let mut subscriber =
        ZmqSubscriber::open(&ctx, &config.subscribe, [scenario.topics.combined.as_bytes()])?;
    let mut publisher = ZmqPublisher::open(&ctx, &config.publish)?;
    info!(
        subscribe = %config.subscribe,
        publish = %config.publish,
        target = config.target,
        kp = config.kp,
        ki = config.ki,
        kd = config.kd,
        "controller connected"
    );

    let delay = Duration::try_from_secs_f64(cli.startup_delay).unwrap_or_default();
    if interrupt.wait_timeout(delay) {
        return Ok(());
    }

    let mut control = ClosedLoop::new(config.pid(), config.measurement.as_str());
    let report = controller::run(
        &mut control,
        &scenario.topics,
        &config.actuation,
        &mut publisher,
        &mut subscriber,
        &interrupt,
        cli.reset,
        cli.max_commands,
    )?;
    info!(
        samples = report.samples,
        commands = report.commands,
        stale = report.stale,
        rejected = report.rejected,
        "controller stopped"
    );
    Ok(())
}
