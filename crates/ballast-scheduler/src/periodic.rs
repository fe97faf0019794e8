use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use ballast_core::panic_payload_to_str;

use crate::CancellationToken;

/// A running periodic timer.
///
/// Cancelling is idempotent, and dropping the handle cancels the timer, so a handle kept in an
/// `Option` gives start/stop semantics that can never leave a duplicate timer behind.
pub struct PeriodicHandle {
    name: Arc<str>,
    token: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl PeriodicHandle {
    pub(crate) fn spawn<F>(
        runtime: &tokio::runtime::Handle,
        name: Arc<str>,
        interval: Duration,
        tick: F,
    ) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        // `tokio::time::interval` panics on a zero period.
        let interval = interval.max(Duration::from_millis(1));
        let token = CancellationToken::new();
        let token_for_task = token.clone();
        let name_for_task = name.clone();

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token_for_task.cancelled() => break,
                    _ = ticker.tick() => {
                        if token_for_task.is_cancelled() {
                            break;
                        }
                        if let Err(panic) =
                            std::panic::catch_unwind(std::panic::AssertUnwindSafe(&tick))
                        {
                            tracing::error!(
                                target = "ballast.scheduler",
                                timer = %name_for_task,
                                panic = %panic_payload_to_str(&*panic),
                                "periodic tick panicked"
                            );
                        }
                    }
                }
            }

            tracing::trace!(target = "ballast.scheduler", timer = %name_for_task, "timer stopped");
        });

        Self {
            name,
            token,
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the timer loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PeriodicHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for PeriodicHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicHandle")
            .field("name", &self.name)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
