mod local;
mod shell;
mod srun;
mod ssh;


use crate::{
    config::{ConfigError, LoggerConfig, SupervisorConfig},
    nodes::NodeHandle,
    process::{self, Control, LaunchError, StopOutcome, StopPolicy},
    run::{JobRun, LoggerProcess},
};
use rayon::prelude::*;
use std::{path::Path, time::Instant};
use tracing::{error, info, warn};

/// Per node launch seam shared by all strategies.
pub trait Fanout {
    /// Start `argv` on `node` with both streams redirected into the given
    /// files, returning the handle the stop protocol drives later.
    fn launch(
        &self,
        node: &NodeHandle,
        argv: &[String],
        stdout: &Path,
        stderr: &Path,
    ) -> Result<Control, LaunchError>;
}

/// All possible fan-out strategies
/// These should be initialized from `Fanouts::load`
/// (this is deliberately not made with dynamic dispatch to avoid the headache)
#[derive(Debug)]
pub enum Fanouts {
    Local(local::LocalFanout),
    Ssh(ssh::SshFanout),
    Srun(srun::SrunFanout),
}

impl Fanouts {
    pub fn load(config: &SupervisorConfig) -> Result<Self, ConfigError> {
        match config.fanout.name.as_str() {
            "local" => Ok(Self::Local(local::LocalFanout::new())),
            "ssh" => Ok(Self::Ssh(ssh::SshFanout::new(config))),
            "srun" => Ok(Self::Srun(srun::SrunFanout::new(config))),
            _ => Err(ConfigError::UnsupportedFanout(config.fanout.name.clone())),
        }
    }

    /// Start one sampler per allocated node, best effort. A node that refuses
    /// its sampler is logged and skipped, the others keep theirs. Returns how
    /// many samplers came up.
    pub fn launch_all(&self, run: &JobRun, logger: &LoggerConfig) -> usize {
        run.nodes()
            .par_iter()
            .filter(|node| match self.launch_one(run, logger, node) {
                Ok(()) => true,
                Err(error) => {
                    error!(
                        error = ?error,
                        node = %node,
                        "Could not start a sampler on this node, continuing without it"
                    );
                    false
                }
            })
            .count()
    }

    fn launch_one(
        &self,
        run: &JobRun,
        logger: &LoggerConfig,
        node: &NodeHandle,
    ) -> Result<(), LaunchError> {
        let argv = logger.argv(&run.metrics_file(node));
        let control = self.launch(
            node,
            &argv,
            &run.logger_stdout(node),
            &run.logger_stderr(node),
        )?;

        info!(node = %node, pid = control.id(), "Sampler is up");
        run.register(
            node.clone(),
            LoggerProcess {
                control,
                started: Instant::now(),
            },
        );

        Ok(())
    }

    /// Stop every registered sampler, interrupt first and kill only after the
    /// timeout. Returns how many went down gracefully.
    pub fn stop_all(&self, run: &JobRun, policy: &StopPolicy) -> usize {
        run.drain()
            .into_par_iter()
            .map(|(node, mut logger)| stop_one(&node, &mut logger, policy))
            .filter(|graceful| *graceful)
            .count()
    }
}

impl Fanout for Fanouts {
    fn launch(
        &self,
        node: &NodeHandle,
        argv: &[String],
        stdout: &Path,
        stderr: &Path,
    ) -> Result<Control, LaunchError> {
        match self {
            Self::Local(fanout) => fanout.launch(node, argv, stdout, stderr),
            Self::Ssh(fanout) => fanout.launch(node, argv, stdout, stderr),
            Self::Srun(fanout) => fanout.launch(node, argv, stdout, stderr),
        }
    }
}

fn stop_one(node: &NodeHandle, logger: &mut LoggerProcess, policy: &StopPolicy) -> bool {
    let sampled = logger.started.elapsed().as_secs();

    match process::stop(&mut logger.control, policy) {
        Ok(StopOutcome::AlreadyStopped) => {
            warn!(node = %node, sampled, "Sampler was already gone, its metrics may be cut short");
            false
        }
        Ok(outcome) => {
            info!(node = %node, sampled, "Sampler {outcome}");
            outcome == StopOutcome::GracefulStop
        }
        Err(error) => {
            error!(error = ?error, node = %node, "Could not stop the sampler cleanly");
            false
        }
    }
}
