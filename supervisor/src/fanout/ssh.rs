use crate::{
    config::SupervisorConfig,
    fanout::{shell, Fanout},
    nodes::NodeHandle,
    process::{Control, LaunchError, RemoteControl, RemoteShell},
};
use std::path::Path;
use tracing::{debug, error};

/// Starts the sampler through ssh and leaves it detached on the node, so the
/// connection does not have to stay up for the lifetime of the sampler.
#[derive(Debug)]
pub struct SshFanout {
    program: String,
}

impl SshFanout {
    pub fn new(config: &SupervisorConfig) -> Self {
        Self {
            program: config
                .fanout_program("ssh")
                .unwrap_or_else(|| String::from("ssh")),
        }
    }

    fn shell(&self, node: &NodeHandle) -> RemoteShell {
        // BatchMode, a password prompt on a compute node would hang forever
        RemoteShell::new(
            self.program.clone(),
            vec![
                String::from("-n"),
                String::from("-o"),
                String::from("BatchMode=yes"),
                node.as_str().to_string(),
            ],
        )
    }
}

impl Fanout for SshFanout {
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

        let shell = self.shell(node);
        let output = shell.output(&shell::detached(argv, stdout, stderr))?;
        if !output.status.success() {
            error!(
                node = %node,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "The remote launch failed"
            );
            return Err(LaunchError::Dispatch(output.status));
        }

        let pid = parse_pid(&String::from_utf8_lossy(&output.stdout))?;
        debug!(node = %node, pid, "Started the sampler over ssh");

        Ok(Control::Remote(RemoteControl::new(shell, pid)))
    }
}

fn parse_pid(stdout: &str) -> Result<i32, LaunchError> {
    // login banners may precede the echo, the pid is the last line
    stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .and_then(|line| line.trim().parse().ok())
        .ok_or_else(|| LaunchError::Pid(stdout.trim().to_string()))
}
