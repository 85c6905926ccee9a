//! Periodic "still running" reports for debug runs

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use gantry_exec::Session;
use tracing::{info, warn};

/// Wait before the first report; each later wait doubles
pub(crate) const REPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Waits starting at an interval and doubling each time
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    next: Duration,
}

impl Backoff {
    pub(crate) fn new(interval: Duration) -> Self {
        Self { next: interval }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = current.saturating_mul(2);
        Some(current)
    }
}

/// Run `f` while a background thread logs the session's current task
pub(crate) fn with_progress_reports<T>(
    session: &Session,
    interval: Duration,
    f: impl FnOnce() -> T,
) -> T {
    let (done, stopped) = mpsc::channel::<()>();

    thread::scope(|scope| {
        let reporter = thread::Builder::new()
            .name("gantry-progress".to_string())
            .spawn_scoped(scope, move || {
                report_until(&stopped, Backoff::new(interval), |elapsed| {
                    let task = session.current_task().unwrap_or_else(|| "-".to_string());
                    info!(task = %task, elapsed_secs = elapsed.as_secs(), "still running");
                })
            });
        if let Err(e) = reporter {
            warn!(error = %e, "failed to start progress reporter");
        }

        let result = f();
        drop(done);
        result
    })
}

/// Call `report` after each wait until `stopped` fires or disconnects
fn report_until<W, R>(stopped: &Receiver<()>, waits: W, mut report: R)
where
    W: IntoIterator<Item = Duration>,
    R: FnMut(Duration),
{
    let started = Instant::now();
    for wait in waits {
        match stopped.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => report(started.elapsed()),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
