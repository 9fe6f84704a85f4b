use crate::{
    config::SupervisorConfig,
    fanout::Fanout,
    nodes::NodeHandle,
    process::{ChildControl, Control, LaunchError},
};
use std::{fs::File, os::unix::process::CommandExt, path::Path, process::Command};
use tracing::debug;

/// Starts the sampler as a single task job step pinned to its node. srun stays
/// around locally, streams the remote output into the redirect targets and
/// forwards the interrupt to the step, so the step behaves like a local child.
#[derive(Debug)]
pub struct SrunFanout {
    program: String,
}

impl SrunFanout {
    pub fn new(config: &SupervisorConfig) -> Self {
        Self {
            program: config
                .fanout_program("srun")
                .unwrap_or_else(|| String::from("srun")),
        }
    }
}

impl Fanout for SrunFanout {
    fn launch(
        &self,
        node: &NodeHandle,
        argv: &[String],
        stdout: &Path,
        stderr: &Path,
    ) -> Result<Control, LaunchError> {
        if argv.is_empty() {
            return Err(LaunchError::EmptyCommand);
        }

        let mut command = Command::new(&self.program);
        command
            .arg("--nodes=1")
            .arg("--ntasks=1")
            // share the allocation with the main workload instead of queueing behind it
            .arg("--overlap")
            .arg(format!("--nodelist={node}"))
            .args(argv)
            .stdout(File::create(stdout)?)
            .stderr(File::create(stderr)?);
        command.process_group(0);

        let child = command.spawn()?;
        debug!(node = %node, pid = child.id(), "Started the sampler as a job step");

        Ok(Control::Child(ChildControl::new(child)))
    }
}
