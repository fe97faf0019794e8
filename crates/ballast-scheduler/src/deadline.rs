use std::panic::AssertUnwindSafe;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::{CancellationToken, TaskError};

/// How often the waiting caller checks for an external cancel.
const CANCEL_POLL: Duration = Duration::from_millis(5);

/// Runs `f` on a dedicated thread and blocks the caller for at most `timeout`.
///
/// On timeout `token` is cancelled and [`TaskError::DeadlineExceeded`] is returned; the worker is
/// left running detached and should poll the token to stop early. Cancelling `token` from
/// elsewhere ends the wait with [`TaskError::Cancelled`].
pub fn run_with_timeout<T, F>(
    timeout: Duration,
    token: CancellationToken,
    f: F,
) -> Result<T, TaskError>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> T + Send + 'static,
{
    if token.is_cancelled() {
        return Err(TaskError::Cancelled);
    }

    let (tx, rx) = mpsc::sync_channel(1);
    let worker_token = token.clone();
    std::thread::Builder::new()
        .name("ballast-deadline".into())
        .spawn(move || {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| f(worker_token)))
                .map_err(|_| TaskError::Panicked);
            let _ = tx.send(outcome);
        })
        .map_err(|err| {
            tracing::warn!(
                target = "ballast.scheduler",
                error = %err,
                "failed to spawn deadline worker"
            );
            TaskError::Panicked
        })?;

    let deadline = Instant::now() + timeout;
    while !token.is_cancelled() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            token.cancel();
            return Err(TaskError::DeadlineExceeded(timeout));
        }
        match rx.recv_timeout(remaining.min(CANCEL_POLL)) {
            Ok(outcome) => return outcome,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Err(TaskError::Panicked),
        }
    }
    Err(TaskError::Cancelled)
}
