//! Tokio child-process handle for stdio backends.

use super::StderrTail;
use crate::service::domain::LaunchCommand;
use crate::supervisor::domain::ProcessExit;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

/// A spawned backend with its stdio split out.
///
/// The child is spawned with `kill_on_drop`, so dropping the handle on any
/// path reaps the process.
#[derive(Debug)]
pub struct SpawnedChild {
    /// Process handle.
    pub child: Child,
    /// Protocol input.
    pub stdin: ChildStdin,
    /// Protocol output, buffered so readiness probing does not lose bytes.
    pub stdout: BufReader<ChildStdout>,
    /// Background stderr collector.
    pub stderr: StderrTail,
}

impl SpawnedChild {
    /// Spawns `command` with piped stdio.
    ///
    /// # Errors
    ///
    /// Returns the spawn I/O error, for example when the program is missing
    /// or not executable.
    pub fn spawn(label: &str, command: &LaunchCommand) -> std::io::Result<Self> {
        let mut process = Command::new(command.program());
        process
            .args(command.args())
            .envs(command.env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(directory) = command.working_directory() {
            process.current_dir(directory);
        }

        let mut child = process.spawn()?;
        let missing = |stream: &str| std::io::Error::other(format!("child {stream} was not piped"));
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;
        debug!(backend = %label, pid = child.id(), program = command.program(), "spawned backend");

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr: StderrTail::spawn(label.to_owned(), stderr),
        })
    }
}

/// Converts a platform exit status.
#[must_use]
pub fn exit_of(status: ExitStatus) -> ProcessExit {
    ProcessExit {
        code: status.code(),
        signal: exit_signal(status),
    }
}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
const fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}

/// Stops a child: polite termination first, a kill once `grace` elapses.
///
/// Returns the observed exit, or `None` when it could not be collected.
pub async fn terminate(label: &str, child: &mut Child, grace: Duration) -> Option<ProcessExit> {
    if let Ok(Some(status)) = child.try_wait() {
        return Some(exit_of(status));
    }

    if request_termination(label, child) {
        if let Ok(Ok(status)) = tokio::time::timeout(grace, child.wait()).await {
            debug!(backend = %label, "backend terminated");
            return Some(exit_of(status));
        }
        warn!(backend = %label, grace = ?grace, "backend ignored termination, killing");
    }

    if let Err(err) = child.kill().await {
        warn!(backend = %label, error = %err, "failed to kill backend");
        return None;
    }
    child.try_wait().ok().flatten().map(exit_of)
}

#[cfg(unix)]
fn request_termination(label: &str, child: &Child) -> bool {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|raw| i32::try_from(raw).ok()) else {
        return false;
    };
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => true,
        Err(err) => {
            debug!(backend = %label, error = %err, "SIGTERM failed");
            false
        }
    }
}

#[cfg(not(unix))]
const fn request_termination(_label: &str, _child: &Child) -> bool {
    false
}
