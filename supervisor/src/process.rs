use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use std::{
    fmt,
    io::{self, ErrorKind},
    process::{Child, Command, ExitStatus, Output, Stdio},
    thread,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::warn;
use wait_timeout::ChildExt;

/// cadence of the liveness poll while waiting for a graceful exit
pub const POLL_TICK: Duration = Duration::from_secs(1);

/// bounded wait for the zombie after a forced kill
const REAP_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Sampler process could not be spawned")]
    Spawn(#[from] io::Error),
    #[error("Sampler command is empty")]
    EmptyCommand,
    #[error("Remote dispatch failed")]
    Dispatch(ExitStatus),
    #[error("Remote dispatch reported no usable pid")]
    Pid(String),
}

#[derive(Error, Debug)]
pub enum StopError {
    #[error("Signal could not be delivered")]
    Signal(#[from] Errno),
    #[error("Child state could not be read")]
    Child(#[from] io::Error),
    #[error("Remote probe failed")]
    Remote(ExitStatus),
}

/// how one sampler went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// the process was gone before any signal was sent
    AlreadyStopped,
    /// the process exited on its own after the interrupt
    GracefulStop,
    /// the process survived the full window and was killed
    ForcedStop,
}

impl fmt::Display for StopOutcome {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::AlreadyStopped => "already stopped",
            Self::GracefulStop => "stopped gracefully",
            Self::ForcedStop => "killed after timeout",
        })
    }
}

/// bounds for the interrupt-then-kill shutdown window
#[derive(Debug, Clone, Copy)]
pub struct StopPolicy {
    /// how long the process may take between interrupt and forced kill
    pub timeout: Duration,
    /// liveness poll cadence within the window
    pub tick: Duration,
}

impl StopPolicy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            tick: POLL_TICK,
        }
    }
}

/// liveness and signal seam shared by local children and remote processes
pub trait ProcessControl {
    /// whether the process still exists
    fn alive(&mut self) -> Result<bool, StopError>;
    /// ask the process to shut down in an orderly way
    fn interrupt(&mut self) -> Result<(), StopError>;
    /// take the process down
    fn kill(&mut self) -> Result<(), StopError>;
}

/// Stop a process with one interrupt, a bounded liveness poll and at most one
/// forced kill. The kill is not confirmed, its delivery is assumed terminal.
pub fn stop(
    control: &mut dyn ProcessControl,
    policy: &StopPolicy,
) -> Result<StopOutcome, StopError> {
    if !control.alive()? {
        return Ok(StopOutcome::AlreadyStopped);
    }

    control.interrupt()?;

    let deadline = Instant::now() + policy.timeout;
    loop {
        if !control.alive()? {
            return Ok(StopOutcome::GracefulStop);
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }

        thread::sleep(policy.tick.min(deadline - now));
    }

    warn!("Process ignored the interrupt for {:?}, killing it", policy.timeout);
    control.kill()?;

    Ok(StopOutcome::ForcedStop)
}

/// the two shapes a supervised sampler can take
#[derive(Debug)]
pub enum Control {
    Child(ChildControl),
    Remote(RemoteControl),
}

impl Control {
    /// pid of the underlying process
    pub fn id(&self) -> i32 {
        match self {
            Self::Child(control) => control.id(),
            Self::Remote(control) => control.id(),
        }
    }
}

impl ProcessControl for Control {
    fn alive(&mut self) -> Result<bool, StopError> {
        match self {
            Self::Child(control) => control.alive(),
            Self::Remote(control) => control.alive(),
        }
    }

    fn interrupt(&mut self) -> Result<(), StopError> {
        match self {
            Self::Child(control) => control.interrupt(),
            Self::Remote(control) => control.interrupt(),
        }
    }

    fn kill(&mut self) -> Result<(), StopError> {
        match self {
            Self::Child(control) => control.kill(),
            Self::Remote(control) => control.kill(),
        }
    }
}

/// control over a sampler spawned as a direct child
#[derive(Debug)]
pub struct ChildControl {
    child: Child,
}

impl ChildControl {
    pub fn new(child: Child) -> Self {
        Self { child }
    }

    pub fn id(&self) -> i32 {
        self.child.id() as i32
    }
}

impl ProcessControl for ChildControl {
    fn alive(&mut self) -> Result<bool, StopError> {
        Ok(self.child.try_wait()?.is_none())
    }

    fn interrupt(&mut self) -> Result<(), StopError> {
        match signal::kill(Pid::from_raw(self.id()), Signal::SIGINT) {
            // gone between the liveness check and the signal, the next poll sees it
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(error) => Err(StopError::Signal(error)),
        }
    }

    fn kill(&mut self) -> Result<(), StopError> {
        match self.child.kill() {
            Ok(()) => {
                // collect the zombie so the pid is released right away
                self.child.wait_timeout(REAP_TIMEOUT)?;

                Ok(())
            }
            // already reaped by a previous liveness poll
            Err(error) if error.kind() == ErrorKind::InvalidInput => Ok(()),
            Err(error) => Err(StopError::Child(error)),
        }
    }
}

/// control over a sampler on another node, reached through a remote shell
#[derive(Debug)]
pub struct RemoteControl {
    shell: RemoteShell,
    pid: i32,
}

impl RemoteControl {
    pub fn new(shell: RemoteShell, pid: i32) -> Self {
        Self { shell, pid }
    }

    pub fn id(&self) -> i32 {
        self.pid
    }

    fn signal(&self, name: &str) -> Result<(), StopError> {
        let status = self.shell.status(&signal_command(name, self.pid))?;

        match status.code() {
            // 1 means the pid is gone, the remote twin of ESRCH
            Some(0) | Some(1) => Ok(()),
            _ => Err(StopError::Remote(status)),
        }
    }
}

impl ProcessControl for RemoteControl {
    fn alive(&mut self) -> Result<bool, StopError> {
        let status = self.shell.status(&probe_command(self.pid))?;

        match status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(StopError::Remote(status)),
        }
    }

    fn interrupt(&mut self) -> Result<(), StopError> {
        self.signal("INT")
    }

    fn kill(&mut self) -> Result<(), StopError> {
        self.signal("KILL")
    }
}

/// probe whether a pid still exists, exit 0 alive, exit 1 gone
fn probe_command(pid: i32) -> String {
    format!("kill -0 {pid} 2> /dev/null")
}

fn signal_command(name: &str, pid: i32) -> String {
    format!("kill -s {name} {pid} 2> /dev/null")
}

/// invocation template that runs one command line on a fixed target node
#[derive(Debug, Clone)]
pub struct RemoteShell {
    program: String,
    args: Vec<String>,
}

impl RemoteShell {
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// run a command line on the node, discarding all output
    pub fn status(&self, command: &str) -> Result<ExitStatus, io::Error> {
        Command::new(&self.program)
            .args(self.args.iter())
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
    }

    /// run a command line on the node and capture what it prints
    pub fn output(&self, command: &str) -> Result<Output, io::Error> {
        Command::new(&self.program)
            .args(self.args.iter())
            .arg(command)
            .stdin(Stdio::null())
            .output()
    }
}
