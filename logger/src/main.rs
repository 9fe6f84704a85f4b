mod sample;


use crate::sample::{Sampler, CSV_HEADER};
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// how quickly a raised stop flag cuts the current window short
const POLL: Duration = Duration::from_millis(100);

/// Samples cpu, memory, disk and network counters of this host into a csv
/// until it is told to stop.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Csv file the samples are written to
    #[arg(short, long)]
    output: PathBuf,

    /// Seconds between two samples
    #[arg(short, long, default_value_t = 5)]
    interval: u64,
}

#[derive(Error, Debug)]
enum LoggerError {
    #[error("The metrics file could not be written")]
    Output(#[from] io::Error),
    #[error("The shutdown flag could not be registered")]
    Signals(#[source] io::Error),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match log_metrics(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(error = ?error, "Sampling failed: {error}");
            ExitCode::FAILURE
        }
    }
}

fn log_metrics(cli: &Cli) -> Result<(), LoggerError> {
    let stop = shutdown_flag()?;
    let mut writer = open_output(&cli.output)?;
    let window = Duration::from_secs(cli.interval.max(1));

    info!(output = ?cli.output, interval = cli.interval, "Sampling system metrics");
    writeln!(writer, "{CSV_HEADER}")?;
    writer.flush()?;

    let mut sampler = Sampler::new();
    let mut rows = 0_u64;
    while !wait_for(&stop, window) {
        let sample = sampler.sample();
        writeln!(writer, "{}", sample.render())?;
        // every closed window lands on disk, a later kill loses nothing
        writer.flush()?;
        rows += 1;
    }

    info!(rows, "Shutting down after the stop request");
    Ok(())
}

fn shutdown_flag() -> Result<Arc<AtomicBool>, LoggerError> {
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop)).map_err(LoggerError::Signals)?;
    }

    Ok(stop)
}

fn open_output(path: &Path) -> Result<BufWriter<File>, LoggerError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    Ok(BufWriter::new(File::create(path)?))
}

/// Sleep through one window, cut short when the stop flag is raised.
/// Returns true when the flag ended the wait.
fn wait_for(stop: &Arc<AtomicBool>, window: Duration) -> bool {
    let deadline = Instant::now() + window;
    while Instant::now() < deadline {
        if stop.load(Ordering::Relaxed) {
            return true;
        }
        thread::sleep(POLL.min(deadline - Instant::now()));
    }

    stop.load(Ordering::Relaxed)
}
