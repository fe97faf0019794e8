use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use rayon::ThreadPool;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;

use ballast_core::panic_payload_to_str;

use crate::periodic::PeriodicHandle;
use crate::task::BlockingTask;
use crate::{CancellationToken, Cancelled, TaskError};

/// Where background jobs run.
enum Pool {
    Threads(ThreadPool),
    /// On the calling thread, before `spawn_background` returns.
    Inline,
}

impl Pool {
    /// Halves the thread count on failure (`EAGAIN` under a low `RLIMIT_NPROC`) and ends up
    /// inline rather than failing startup.
    fn build(threads: usize) -> Self {
        let mut threads = threads;
        while threads > 0 {
            let built = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|idx| format!("ballast-background-{idx}"))
                .build();
            match built {
                Ok(pool) => return Pool::Threads(pool),
                Err(err) if threads == 1 => {
                    tracing::warn!(
                        target = "ballast.scheduler",
                        error = %err,
                        "failed to start background pool; running background work inline"
                    );
                }
                Err(_) => {}
            }
            threads /= 2;
        }
        Pool::Inline
    }

    fn run(&self, job: impl FnOnce() + Send + 'static) {
        match self {
            Pool::Threads(pool) => pool.spawn(job),
            Pool::Inline => job(),
        }
    }
}

/// The timer runtime. Falls back to a current-thread runtime, which needs no extra threads.
fn timer_runtime(threads: usize) -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads.max(1))
        .enable_time()
        .thread_name("ballast-timer")
        .build()
        .or_else(|_| {
            tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
        })
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Threads in the background pool. `0` runs background work inline on the caller.
    pub background_threads: usize,
    /// Worker threads for the runtime driving periodic timers.
    pub timer_threads: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            // Cleanup and disk I/O are latency tolerant and must not compete with the render
            // loop for more than two cores.
            background_threads: available.clamp(1, 2),
            timer_threads: 1,
        }
    }
}

/// Owns the background pool and the timer runtime.
///
/// Cloning is cheap; all clones share the same pool and runtime.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    pool: Pool,
    // `None` once dropped; see `Drop`.
    runtime: Option<Runtime>,
    timers: Handle,
}

impl Scheduler {
    /// # Panics
    ///
    /// If not even a current-thread timer runtime can be created.
    pub fn new(config: SchedulerConfig) -> Self {
        let runtime = match timer_runtime(config.timer_threads) {
            Ok(runtime) => runtime,
            Err(err) => panic!("failed to build the ballast timer runtime: {err}"),
        };
        let timers = runtime.handle().clone();
        Self {
            inner: Arc::new(SchedulerInner {
                pool: Pool::build(config.background_threads),
                runtime: Some(runtime),
                timers,
            }),
        }
    }

    /// Background work runs synchronously on the calling thread, so its side effects are
    /// visible as soon as the triggering call returns. Timers still run on their own runtime.
    pub fn inline() -> Self {
        Self::new(SchedulerConfig {
            background_threads: 0,
            timer_threads: 1,
        })
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.inner.pool, Pool::Inline)
    }

    pub fn spawn_background<T, F>(&self, f: F) -> BlockingTask<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Result<T, Cancelled> + Send + 'static,
    {
        self.spawn_background_with_token(CancellationToken::new(), f)
    }

    /// Like [`Scheduler::spawn_background`]; `f` never runs when `token` is already cancelled.
    pub fn spawn_background_with_token<T, F>(
        &self,
        token: CancellationToken,
        f: F,
    ) -> BlockingTask<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Result<T, Cancelled> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        if token.is_cancelled() {
            let _ = tx.send(Err(TaskError::Cancelled));
        } else {
            let job_token = token.clone();
            self.inner.pool.run(move || {
                let _ = tx.send(run_job(f, job_token));
            });
        }
        BlockingTask::new(token, rx)
    }

    /// Run `tick` every `interval` until the returned handle is cancelled or dropped.
    ///
    /// The first tick fires one full `interval` after spawning. Ticks never overlap; a slow tick
    /// delays the next one instead of queueing a burst.
    pub fn spawn_periodic<F>(
        &self,
        name: impl Into<Arc<str>>,
        interval: Duration,
        tick: F,
    ) -> PeriodicHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        PeriodicHandle::spawn(&self.inner.timers, name.into(), interval, tick)
    }
}

fn run_job<T, F>(f: F, token: CancellationToken) -> Result<T, TaskError>
where
    F: FnOnce(CancellationToken) -> Result<T, Cancelled>,
{
    match std::panic::catch_unwind(AssertUnwindSafe(|| f(token))) {
        Ok(result) => result.map_err(TaskError::from),
        Err(panic) => {
            tracing::error!(
                target = "ballast.scheduler",
                panic = %panic_payload_to_str(&*panic),
                "background task panicked"
            );
            Err(TaskError::Panicked)
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("inline", &self.is_inline())
            .finish_non_exhaustive()
    }
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        // The last clone may be dropped from inside a timer tick; a blocking shutdown there
        // would panic.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
