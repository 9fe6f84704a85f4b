use crate::process::{
    stop, ChildControl, ProcessControl, RemoteControl, RemoteShell, StopError, StopOutcome,
    StopPolicy,
};
use std::{
    collections::VecDeque,
    path::Path,
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};
use tempfile::tempdir;

/// scripted liveness sequence standing in for a real process
struct Scripted {
    alive: VecDeque<bool>,
    fallback: bool,
    interrupts: usize,
    kills: usize,
}

impl Scripted {
    fn new(alive: &[bool], fallback: bool) -> Self {
        Self {
            alive: alive.iter().copied().collect(),
            fallback,
            interrupts: 0,
            kills: 0,
        }
    }
}

impl ProcessControl for Scripted {
    fn alive(&mut self) -> Result<bool, StopError> {
        Ok(self.alive.pop_front().unwrap_or(self.fallback))
    }

    fn interrupt(&mut self) -> Result<(), StopError> {
        self.interrupts += 1;

        Ok(())
    }

    fn kill(&mut self) -> Result<(), StopError> {
        self.kills += 1;

        Ok(())
    }
}

fn quick(timeout_ms: u64) -> StopPolicy {
    StopPolicy {
        timeout: Duration::from_millis(timeout_ms),
        tick: Duration::from_millis(5),
    }
}

#[test]
pub fn already_stopped_sends_nothing() {
    let mut control = Scripted::new(&[false], false);

    assert_eq!(
        stop(&mut control, &quick(50)).unwrap(),
        StopOutcome::AlreadyStopped
    );
    assert_eq!(control.interrupts, 0);
    assert_eq!(control.kills, 0);
}

#[test]
pub fn graceful_after_one_interrupt() {
    let mut control = Scripted::new(&[true, true, false], false);

    assert_eq!(
        stop(&mut control, &quick(100)).unwrap(),
        StopOutcome::GracefulStop
    );
    assert_eq!(control.interrupts, 1);
    assert_eq!(control.kills, 0);
}

#[test]
pub fn forced_after_the_timeout() {
    let mut control = Scripted::new(&[true], true);
    let started = Instant::now();

    assert_eq!(
        stop(&mut control, &quick(30)).unwrap(),
        StopOutcome::ForcedStop
    );
    assert!(started.elapsed() >= Duration::from_millis(30));
    assert_eq!(control.interrupts, 1);
    assert_eq!(control.kills, 1);
}

#[test]
pub fn graceful_wins_at_the_deadline() {
    let mut control = Scripted::new(&[true, false], true);

    assert_eq!(
        stop(&mut control, &quick(0)).unwrap(),
        StopOutcome::GracefulStop
    );
    assert_eq!(control.kills, 0);
}

fn spawn_sh(script: &str) -> ChildControl {
    let child = Command::new("sh")
        .arg("-c")
        .arg(script)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    ChildControl::new(child)
}

#[test]
pub fn child_stops_gracefully_on_interrupt() {
    let mut control = spawn_sh("exec sleep 30");
    thread::sleep(Duration::from_millis(50));

    assert_eq!(
        stop(&mut control, &quick(2_000)).unwrap(),
        StopOutcome::GracefulStop
    );
    assert!(!control.alive().unwrap());
}

#[test]
pub fn child_is_killed_when_it_ignores_the_interrupt() {
    let mut control = spawn_sh("trap '' INT; sleep 30");
    thread::sleep(Duration::from_millis(50));
    let started = Instant::now();

    assert_eq!(
        stop(&mut control, &quick(200)).unwrap(),
        StopOutcome::ForcedStop
    );
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(!control.alive().unwrap());
}

#[test]
pub fn exited_child_reports_already_stopped() {
    let mut control = spawn_sh("exit 0");
    thread::sleep(Duration::from_millis(200));

    assert_eq!(
        stop(&mut control, &quick(1_000)).unwrap(),
        StopOutcome::AlreadyStopped
    );
}

fn local_shell() -> RemoteShell {
    RemoteShell::new(String::from("sh"), vec![String::from("-c")])
}

#[test]
pub fn remote_shell_reports_the_exit_status() {
    assert_eq!(local_shell().status("exit 7").unwrap().code(), Some(7));
}

#[test]
pub fn remote_shell_captures_output() {
    let output = local_shell().output("echo 4711").unwrap();

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "4711");
}

/// stand-in for a sampler behind the detached launch line
/// background children of a non-interactive shell start with SIGINT ignored
/// and a shell trap cannot bring it back, the handler has to come from
/// sigaction, it touches the marker file once the handler is in place
const INTERRUPTIBLE: &str = "import signal, sys\n\
    signal.signal(signal.SIGINT, lambda *unused: sys.exit(0))\n\
    open(sys.argv[1], \"w\").close()\n\
    signal.pause()";

/// start a detached process the way the remote launch command does and
/// return the pid it reports
fn detach(command: &str) -> i32 {
    let output = local_shell().output(command).unwrap();
    assert!(output.status.success());

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse()
        .unwrap()
}

fn await_file(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(5);

    while !path.exists() {
        assert!(Instant::now() < deadline, "marker file never appeared");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
pub fn remote_control_probes_and_stops() {
    let dir = tempdir().unwrap();
    let ready = dir.path().join("ready");
    let pid = detach(&format!(
        "nohup python3 -c '{INTERRUPTIBLE}' {} > /dev/null 2> /dev/null < /dev/null & echo $!",
        ready.display()
    ));
    await_file(&ready);

    let mut control = RemoteControl::new(local_shell(), pid);

    assert!(control.alive().unwrap());
    assert_eq!(
        stop(&mut control, &quick(2_000)).unwrap(),
        StopOutcome::GracefulStop
    );
    assert!(!control.alive().unwrap());
}

#[test]
pub fn remote_control_detects_a_gone_pid() {
    let pid = detach("true & echo $!");
    thread::sleep(Duration::from_millis(200));

    let mut control = RemoteControl::new(local_shell(), pid);

    assert_eq!(
        stop(&mut control, &quick(1_000)).unwrap(),
        StopOutcome::AlreadyStopped
    );
}
