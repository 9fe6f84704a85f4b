use crate::{
    fanout::Fanout,
    nodes::NodeHandle,
    process::{ChildControl, Control, LaunchError},
};
use std::{fs::File, os::unix::process::CommandExt, path::Path, process::Command};
use tracing::debug;

/// Starts the sampler as a plain child process on the supervisor's own host.
#[derive(Debug)]
pub struct LocalFanout {}

impl LocalFanout {
    pub fn new() -> Self {
        Self {}
    }
}

impl Fanout for LocalFanout {
    fn launch(
        &self,
        node: &NodeHandle,
        argv: &[String],
        stdout: &Path,
        stderr: &Path,
    ) -> Result<Control, LaunchError> {
        let (program, args) = argv.split_first().ok_or(LaunchError::EmptyCommand)?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdout(File::create(stdout)?)
            .stderr(File::create(stderr)?);
        // own process group, an interrupt aimed at the job must not take the sampler with it
        command.process_group(0);

        let child = command.spawn()?;
        debug!(node = %node, pid = child.id(), "Started the sampler locally");

        Ok(Control::Child(ChildControl::new(child)))
    }
}
