mod artifacts;
mod config;
mod fanout;
mod nodes;
mod process;
mod run;

#[cfg(test)]
mod nodes_test;
#[cfg(test)]
mod process_test;

use crate::{
    config::{ConfigError, SupervisorConfig},
    fanout::Fanouts,
    nodes::{AllocationError, NodeHandle},
    run::{JobRun, RunDirError},
};
use clap::Parser;
use std::{
    io,
    os::unix::process::ExitStatusExt,
    path::PathBuf,
    process::{Command, ExitCode, ExitStatus},
};
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Wraps one batch job: starts a metrics sampler on every allocated node,
/// runs the workload and takes the samplers down again once it is done.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path of the yaml config
    #[arg(short, long, default_value = "nosy.yaml")]
    config: PathBuf,

    /// The workload command, everything after the --
    #[arg(last = true, required = true)]
    workload: Vec<String>,
}

#[derive(Error, Debug)]
enum SupervisorError {
    #[error("The config could not be loaded")]
    Config(#[from] ConfigError),
    #[error("The config did not pass the preflight checks")]
    Preflight,
    #[error("The node allocation could not be determined")]
    Allocation(#[from] AllocationError),
    #[error("The run directory could not be prepared")]
    RunDir(#[from] RunDirError),
    #[error("The workload could not be run")]
    Workload(#[from] io::Error),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match supervise(&cli) {
        Ok(code) => code,
        Err(error) => {
            error!(error = ?error, "Supervision failed: {error}");
            ExitCode::FAILURE
        }
    }
}

fn supervise(cli: &Cli) -> Result<ExitCode, SupervisorError> {
    let mut config = SupervisorConfig::load(&cli.config)?;
    if config.preflight_checks() {
        return Err(SupervisorError::Preflight);
    }

    let fanouts = Fanouts::load(&config)?;
    let nodes = resolve_nodes(&config)?;
    let run = JobRun::create(&config.runs, nodes)?;
    info!(
        run = run.id(),
        nodes = run.nodes().len(),
        "Supervising the job run"
    );

    let started = fanouts.launch_all(&run, &config.logger);
    if started == 0 && !run.nodes().is_empty() {
        warn!("No sampler came up, the workload runs without metrics");
    }

    // hold the workload result back, the samplers come down either way
    let status = run_workload(&run, &cli.workload);

    let registered = run.registered();
    let graceful = fanouts.stop_all(&run, &config.stop.policy());
    if graceful < registered {
        warn!(graceful, registered, "Some samplers did not stop gracefully");
    } else if registered > 0 {
        info!(registered, "All samplers stopped gracefully");
    }

    let report = artifacts::verify(&run);
    if report.clean() {
        info!(
            nodes = report.complete.len(),
            "Every node delivered its metrics"
        );
    }
    // the summary itself is assembled by the surrounding job tooling
    info!(dir = ?run.dir(), summary = ?run.summary_file(), "Run artifacts are ready");

    Ok(workload_exit(status?))
}

fn resolve_nodes(config: &SupervisorConfig) -> Result<Vec<NodeHandle>, AllocationError> {
    if let Some(pinned) = config.fanout_nodes() {
        return Ok(pinned.into_iter().map(NodeHandle::from).collect());
    }

    let nodes = nodes::allocated_nodes()?;
    if config.fanout.name == "local" && nodes.len() > 1 {
        // a local sampler cannot watch the other nodes of the allocation
        warn!(
            nodes = nodes.len(),
            "The local strategy samples only this node"
        );
        return Ok(vec![nodes::local_node()?]);
    }

    Ok(nodes)
}

fn run_workload(run: &JobRun, workload: &[String]) -> Result<ExitStatus, io::Error> {
    let (program, args) = workload
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty workload"))?;

    info!(command = ?workload, "Starting the workload");
    let mut child = Command::new(program)
        .args(args)
        .env("NOSY_RUN_DIR", run.dir())
        .env("NOSY_RUN_ID", run.id())
        .spawn()?;
    let status = child.wait()?;
    info!(status = %status, "Workload finished");

    Ok(status)
}

/// Exit like the workload exited, a signal death becomes 128 plus the signal.
fn workload_exit(status: ExitStatus) -> ExitCode {
    match (status.code(), status.signal()) {
        (Some(code), _) => ExitCode::from(code.clamp(0, 255) as u8),
        (None, Some(signal)) => ExitCode::from(128_u8.saturating_add(signal as u8)),
        (None, None) => ExitCode::FAILURE,
    }
}
