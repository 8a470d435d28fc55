//! Bounded collector for a child's stderr.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

/// Number of stderr lines retained for crash classification.
pub const STDERR_TAIL_LINES: usize = 64;

#[derive(Debug, Default)]
struct TailState {
    lines: Mutex<VecDeque<String>>,
    closed: AtomicBool,
    changed: Notify,
}

/// Drains a stderr stream in the background, keeping its last lines.
///
/// Draining keeps the child from blocking on a full pipe; the retained tail
/// feeds crash classification and stderr readiness patterns.
#[derive(Debug)]
pub struct StderrTail {
    state: Arc<TailState>,
    task: JoinHandle<()>,
}

impl StderrTail {
    /// Starts draining `stream`. Lines are logged at debug level under
    /// `label`.
    pub fn spawn<R>(label: String, stream: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let state = Arc::new(TailState::default());
        let task = tokio::spawn(drain(label, stream, Arc::clone(&state)));
        Self { state, task }
    }

    /// Returns the retained lines, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.state
            .lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Returns whether the stream has ended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    /// Waits until a retained line satisfies `predicate`.
    ///
    /// Returns `false` if the stream ends first.
    pub async fn wait_for(&self, predicate: impl Fn(&str) -> bool) -> bool {
        loop {
            let changed = self.state.changed.notified();
            if self.snapshot().iter().any(|line| predicate(line.as_str())) {
                return true;
            }
            if self.is_closed() {
                return false;
            }
            changed.await;
        }
    }
}

impl Drop for StderrTail {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn drain<R>(label: String, stream: R, state: Arc<TailState>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer).await {
            Ok(0) => break,
            Ok(_) => {
                // Stderr is not guaranteed to be UTF-8.
                let line = String::from_utf8_lossy(&buffer)
                    .trim_end_matches(['\n', '\r'])
                    .to_owned();
                debug!(backend = %label, line = %line, "backend stderr");
                let mut tail = state.lines.lock().unwrap_or_else(PoisonError::into_inner);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
                drop(tail);
                state.changed.notify_waiters();
            }
            Err(err) => {
                debug!(backend = %label, error = %err, "stderr read failed");
                break;
            }
        }
    }
    state.closed.store(true, Ordering::Release);
    state.changed.notify_waiters();
}
