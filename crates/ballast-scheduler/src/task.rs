use tokio::sync::oneshot::{self, error::TryRecvError};

use crate::{CancellationToken, TaskError};

/// Handle to a job on the background pool.
///
/// Dropping the handle detaches the job; it still runs to completion.
pub struct BlockingTask<T> {
    token: CancellationToken,
    result: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> BlockingTask<T> {
    pub(crate) fn new(
        token: CancellationToken,
        result: oneshot::Receiver<Result<T, TaskError>>,
    ) -> Self {
        Self { token, result }
    }

    /// Ask the job to stop. Jobs see this through their token; a job that already finished keeps
    /// its result.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The job's result if it already finished. Never blocks.
    pub fn try_result(&mut self) -> Option<Result<T, TaskError>> {
        match self.result.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            // The sender is only dropped unsent when the job never ran to the reporting step.
            Err(TryRecvError::Closed) => Some(Err(TaskError::Panicked)),
        }
    }
}

impl<T> std::fmt::Debug for BlockingTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingTask")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
