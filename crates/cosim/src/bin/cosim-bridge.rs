//! Cosim bridge CLI
//!
//! Serve a model over ZeroMQ, run it offline against the reference PID
//! controller, or print its topic table.
//!
//! # Example
//!
//! ```bash
//! # Serve the scenario until Ctrl-C
//! cosim-bridge run --scenario scenarios/mass_spring_damper.toml
//!
//! # 100 s closed-loop trajectory as CSV
//! cosim-bridge offline --scenario scenarios/mass_spring_damper.toml \
//!     --target 10 --kp 10 --ki 1 --kd 2 --stop-time 100 -o msd.csv
//! ```

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use cosim::engine::{Route, ScenarioConfig, TopicRouter};
use cosim::setup::{self, SetupError};
use cosim::{ControllerScenario, OfflineRun};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Cosim bridge
///
/// Exposes a stepped model over topic-addressed publish/subscribe.
#[derive(Parser, Debug)]
#[command(name = "cosim-bridge")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge over ZeroMQ until interrupted or the clock fails
    #[cfg(feature = "zmq")]
    Run(RunArgs),
    /// Run the model in lockstep with a PID controller and print CSV
    Offline(OfflineArgs),
    /// Print the topic table for a scenario
    Topics(ScenarioArg),
}

#[derive(Args, Debug)]
struct ScenarioArg {
    /// Scenario TOML file
    #[arg(long)]
    scenario: PathBuf,
}

#[cfg(feature = "zmq")]
#[derive(Args, Debug)]
struct RunArgs {
    /// Scenario TOML file
    #[arg(long)]
    scenario: PathBuf,

    /// Override clock.stop_time
    #[arg(long)]
    stop_time: Option<f64>,

    /// Override clock.step_size
    #[arg(long)]
    step_size: Option<f64>,

    /// Override publish.period (wall-clock seconds)
    #[arg(long)]
    publish_period: Option<f64>,
}

#[derive(Args, Debug)]
struct OfflineArgs {
    /// Scenario TOML file
    #[arg(long)]
    scenario: PathBuf,

    /// Setpoint. Defaults to controller.target
    #[arg(long)]
    target: Option<f64>,

    /// Proportional gain. Defaults to controller.kp
    #[arg(long)]
    kp: Option<f64>,

    /// Integral gain. Defaults to controller.ki
    #[arg(long)]
    ki: Option<f64>,

    /// Derivative gain. Defaults to controller.kd
    #[arg(long)]
    kd: Option<f64>,

    /// Stop time. Defaults to clock.stop_time
    #[arg(long)]
    stop_time: Option<f64>,

    /// Step size. Defaults to clock.step_size
    #[arg(long)]
    step_size: Option<f64>,

    /// Write CSV here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        #[cfg(feature = "zmq")]
        Command::Run(args) => run(args),
        Command::Offline(args) => offline(args),
        Command::Topics(args) => topics(args),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "cosim-bridge failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "zmq")]
fn run(args: RunArgs) -> Result<ExitCode, SetupError> {
    use cosim::engine::ClockOutcome;
    use std::time::Duration;

    let mut config = ScenarioConfig::load(&args.scenario)?;
    if let Some(stop_time) = args.stop_time {
        config.clock.stop_time = Some(stop_time);
    }
    if let Some(step_size) = args.step_size {
        config.clock.step_size = step_size;
    }
    if let Some(period) = args.publish_period {
        config.publish.period = period;
    }

    let interrupt = setup::interrupt_signal()?;
    let ctx = zmq::Context::new();
    let mut bridge = setup::start_zmq_bridge(&config, &ctx)?;
    info!(
        step_size = config.clock.step_size,
        stop_time = ?config.clock.stop_time,
        publish_period = config.publish.period,
        "bridge running"
    );

    while !interrupt.wait_timeout(Duration::from_millis(200)) {
        if bridge.any_task_finished() {
            break;
        }
    }

    let report = bridge.shutdown();
    info!(
        total_ms = report.total_ms,
        all_joined = report.all_joined,
        "bridge stopped"
    );
    if let Some(gateway) = &report.gateway {
        info!(
            applied = gateway.applied,
            resets = gateway.resets,
            malformed = gateway.malformed,
            ignored = gateway.ignored,
            "gateway"
        );
    }
    if let Some(publisher) = &report.publisher {
        info!(
            ticks = publisher.ticks,
            skipped = publisher.skipped,
            messages = publisher.messages,
            "publisher"
        );
    }
    if let Some(e) = report.transport_error() {
        error!(error = %e, "transport failed");
        return Ok(ExitCode::FAILURE);
    }
    match report.clock.map(|c| c.outcome) {
        Some(ClockOutcome::Failed(e)) => {
            error!(error = %e, "model step failed");
            Ok(ExitCode::FAILURE)
        }
        Some(ClockOutcome::Fatal(e)) => {
            error!(error = %e, "model could not be reset");
            Ok(ExitCode::FAILURE)
        }
        _ => Ok(ExitCode::SUCCESS),
    }
}

fn offline(args: OfflineArgs) -> Result<ExitCode, SetupError> {
    let config = ScenarioConfig::load(&args.scenario)?;
    let mut controller = ControllerScenario::load(&args.scenario)?.controller;
    if let Some(target) = args.target {
        controller.target = target;
    }
    if let Some(kp) = args.kp {
        controller.kp = kp;
    }
    if let Some(ki) = args.ki {
        controller.ki = ki;
    }
    if let Some(kd) = args.kd {
        controller.kd = kd;
    }
    let stop_time = args
        .stop_time
        .or(config.clock.stop_time)
        .ok_or(SetupError::MissingStopTime)?;

    let run = OfflineRun {
        measurement: controller.measurement.clone(),
        actuation: controller.actuation.clone(),
        step_size: args.step_size.unwrap_or(config.clock.step_size),
        stop_time,
    };
    let (mut stepper, _) = setup::prepare(&config)?;
    let rows = run.execute(&mut stepper, &controller.pid())?;

    let written = match &args.output {
        Some(path) => File::create(path)
            .and_then(|file| run.write_csv(&mut BufWriter::new(file), &rows))
            .map_err(|source| SetupError::Io {
                path: Some(path.clone()),
                source,
            }),
        None => run
            .write_csv(&mut io::stdout().lock(), &rows)
            .map_err(|source| SetupError::Io { path: None, source }),
    };
    written?;
    info!(rows = rows.len(), "trajectory written");
    Ok(ExitCode::SUCCESS)
}

fn topics(args: ScenarioArg) -> Result<ExitCode, SetupError> {
    let config = ScenarioConfig::load(&args.scenario)?;
    let (_, router) = setup::prepare(&config)?;
    for (topic, route) in router.table() {
        println!("{topic:<24} {}", describe(&router, route));
    }
    Ok(ExitCode::SUCCESS)
}

fn describe(router: &TopicRouter, route: Route) -> String {
    match route {
        Route::Input(id) => format!("in   {}", router.name(id)),
        Route::Output(id) => format!("out  {}", router.name(id)),
        Route::Reset => "in   <reset>".to_string(),
        Route::CombinedOutput => "out  <all outputs>".to_string(),
        Route::Unrecognized => "?".to_string(),
    }
}
