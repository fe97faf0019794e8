use std::sync::Arc;
use std::time::Duration;

use ballast_scheduler::{PeriodicHandle, Scheduler};
use parking_lot::Mutex;

/// A subsystem with its own periodic work that the engine can pause and resume.
///
/// `stop` must be idempotent and safe to call before `start`; `start` on a running monitor is a
/// no-op.
pub trait Monitored: Send + Sync {
    fn name(&self) -> &str;
    fn start(&self);
    fn stop(&self);
    fn is_running(&self) -> bool;
}

/// [`Monitored`] implementation over a scheduler periodic timer.
pub struct Monitor {
    name: Arc<str>,
    interval: Duration,
    scheduler: Scheduler,
    tick: Arc<dyn Fn() + Send + Sync>,
    handle: Mutex<Option<PeriodicHandle>>,
}

impl Monitor {
    pub fn new(
        name: impl Into<Arc<str>>,
        interval: Duration,
        scheduler: Scheduler,
        tick: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            interval,
            scheduler,
            tick: Arc::new(tick),
            handle: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Monitored for Monitor {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.as_ref().is_some_and(|handle| !handle.is_cancelled()) {
            return;
        }
        let tick = self.tick.clone();
        *handle = Some(
            self.scheduler
                .spawn_periodic(self.name.clone(), self.interval, move || tick()),
        );
        tracing::debug!(
            target = "ballast.engine",
            monitor = %self.name,
            interval_ms = self.interval.as_millis() as u64,
            "monitor started"
        );
    }

    fn stop(&self) {
        // Dropping the handle cancels the timer.
        if self.handle.lock().take().is_some() {
            tracing::debug!(target = "ballast.engine", monitor = %self.name, "monitor stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_cancelled() && !handle.is_finished())
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}
