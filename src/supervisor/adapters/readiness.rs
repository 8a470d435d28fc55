//! Waiting for a spawned backend's readiness signal.

use super::{SpawnedChild, exit_of};
use crate::service::domain::ReadinessProbe;
use crate::supervisor::domain::ProcessExit;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

/// Time allowed for collecting the exit status once output has closed.
const EXIT_COLLECTION_GRACE: Duration = Duration::from_secs(1);

/// Why readiness was not observed.
#[derive(Debug, Clone, Error)]
pub enum ReadinessError {
    /// No signal arrived in time.
    #[error("no readiness signal within {0:?}")]
    Timeout(Duration),
    /// The process exited before signalling readiness.
    #[error("exited before readiness ({})", describe_exit(.0))]
    Exited(Option<ProcessExit>),
    /// Reading the signal stream failed.
    #[error("readiness stream failed: {0}")]
    Io(Arc<std::io::Error>),
}

fn describe_exit(exit: &Option<ProcessExit>) -> String {
    exit.map_or_else(|| "status unavailable".to_owned(), |status| status.to_string())
}

enum Signal {
    Observed,
    StreamClosed,
}

/// Waits until `probe` is satisfied by the child's output.
///
/// [`ReadinessProbe::Handshake`] resolves immediately; the handshake itself
/// is performed by the caller over the RPC client.
///
/// # Errors
///
/// Returns [`ReadinessError::Timeout`] when nothing matches in time and
/// [`ReadinessError::Exited`] when the child exits or closes its output
/// first.
pub async fn await_readiness(
    label: &str,
    probe: &ReadinessProbe,
    spawned: &mut SpawnedChild,
    timeout: Duration,
) -> Result<(), ReadinessError> {
    let child = &mut spawned.child;
    let stdout = &mut spawned.stdout;
    let stderr = &spawned.stderr;

    let signal = async {
        match probe {
            ReadinessProbe::Handshake => Ok(Signal::Observed),
            ReadinessProbe::FirstStdoutLine | ReadinessProbe::StdoutPattern(_) => {
                read_stdout_signal(label, probe, stdout).await
            }
            ReadinessProbe::StderrPattern(_) => {
                let seen = stderr.wait_for(|line| probe.matches_stderr(line)).await;
                Ok(if seen {
                    Signal::Observed
                } else {
                    Signal::StreamClosed
                })
            }
        }
    };

    let outcome = tokio::select! {
        biased;
        signal_outcome = signal => signal_outcome,
        status = child.wait() => {
            return Err(ReadinessError::Exited(status.ok().map(exit_of)));
        }
        () = tokio::time::sleep(timeout) => return Err(ReadinessError::Timeout(timeout)),
    };

    match outcome {
        Ok(Signal::Observed) => Ok(()),
        Ok(Signal::StreamClosed) => {
            let status = tokio::time::timeout(EXIT_COLLECTION_GRACE, child.wait()).await;
            Err(ReadinessError::Exited(
                status.ok().and_then(Result::ok).map(exit_of),
            ))
        }
        Err(err) => Err(ReadinessError::Io(Arc::new(err))),
    }
}

async fn read_stdout_signal<R>(
    label: &str,
    probe: &ReadinessProbe,
    stdout: &mut R,
) -> std::io::Result<Signal>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if stdout.read_line(&mut line).await? == 0 {
            return Ok(Signal::StreamClosed);
        }
        let trimmed = line.trim_end();
        if probe.matches_stdout(trimmed) {
            debug!(backend = %label, line = %trimmed, "readiness signal observed");
            return Ok(Signal::Observed);
        }
        debug!(backend = %label, line = %trimmed, "skipping pre-readiness output");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::service::domain::LaunchCommand;
    use tokio::io::AsyncReadExt;

    fn spawn_shell(script: &str) -> SpawnedChild {
        let command = LaunchCommand::new("sh")
            .expect("valid command")
            .with_args(["-c", script]);
        SpawnedChild::spawn("test", &command).expect("shell spawns")
    }

    #[tokio::test]
    async fn pattern_probe_skips_earlier_lines_and_keeps_the_rest() {
        let mut spawned = spawn_shell("echo booting; echo 'server ready'; echo payload; sleep 5");
        let probe = ReadinessProbe::StdoutPattern("ready".to_owned());

        await_readiness("test", &probe, &mut spawned, Duration::from_secs(5))
            .await
            .expect("readiness observed");

        let mut rest = [0_u8; 8];
        spawned
            .stdout
            .read_exact(&mut rest)
            .await
            .expect("remaining output readable");
        assert_eq!(&rest, b"payload\n");
    }

    #[tokio::test]
    async fn exit_before_readiness_is_reported() {
        let mut spawned = spawn_shell("exit 4");

        let result = await_readiness(
            "test",
            &ReadinessProbe::FirstStdoutLine,
            &mut spawned,
            Duration::from_secs(5),
        )
        .await;

        let Err(ReadinessError::Exited(exit)) = result else {
            panic!("expected exit before readiness, got {result:?}");
        };
        assert_eq!(exit.and_then(|status| status.code), Some(4));
    }

    #[tokio::test]
    async fn silent_process_times_out() {
        let mut spawned = spawn_shell("sleep 5");

        let result = await_readiness(
            "test",
            &ReadinessProbe::FirstStdoutLine,
            &mut spawned,
            Duration::from_millis(100),
        )
        .await;

        assert!(matches!(result, Err(ReadinessError::Timeout(_))));
    }

    #[tokio::test]
    async fn stderr_pattern_probe_watches_stderr() {
        let mut spawned = spawn_shell("echo 'listening on stdio' >&2; sleep 5");
        let probe = ReadinessProbe::StderrPattern("listening".to_owned());

        await_readiness("test", &probe, &mut spawned, Duration::from_secs(5))
            .await
            .expect("readiness observed");
    }
}
