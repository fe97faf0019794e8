//! Task scheduling for Ballast.
//!
//! - Blocking work (disk I/O, compression, cache clears) runs on a rayon background pool, or
//!   inline when the pool cannot be created (or when explicitly requested for tests).
//! - Periodic timers run on a small Tokio runtime owned by the scheduler.
//! - Every background job and timer is tied to a [`CancellationToken`].
//! - [`run_with_timeout`] bounds how long a caller waits for a job.

mod deadline;
mod periodic;
mod scheduler;
mod task;

pub use deadline::run_with_timeout;
pub use periodic::PeriodicHandle;
pub use scheduler::{Scheduler, SchedulerConfig};
pub use task::BlockingTask;
pub use tokio_util::sync::CancellationToken;

use std::time::Duration;

/// Returned by task bodies that observed cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task was cancelled")]
    Cancelled,
    #[error("task panicked")]
    Panicked,
    #[error("task exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

impl From<Cancelled> for TaskError {
    fn from(_: Cancelled) -> Self {
        TaskError::Cancelled
    }
}
