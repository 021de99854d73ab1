//! The counting join behind each layer barrier.

use std::future::Future;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tokio::time::Instant;

/// The run deadline passed before every task finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeadlineExpired;

/// Spawned tasks of one layer phase, drained in completion order.
///
/// Dropping the set aborts whatever is still running.
pub(crate) struct LayerTasks<T> {
    pending: FuturesUnordered<JoinHandle<T>>,
    aborts: Vec<AbortHandle>,
    deadline: Option<Instant>,
}

impl<T: Send + 'static> LayerTasks<T> {
    pub(crate) fn new(deadline: Option<Instant>) -> Self {
        Self {
            pending: FuturesUnordered::new(),
            aborts: Vec::new(),
            deadline,
        }
    }

    pub(crate) fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.aborts.push(handle.abort_handle());
        self.pending.push(handle);
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Next finished task, `Ok(None)` once all have terminated.
    pub(crate) async fn next(&mut self) -> Result<Option<Result<T, JoinError>>, DeadlineExpired> {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, self.pending.next())
                .await
                .map_err(|_| DeadlineExpired),
            None => Ok(self.pending.next().await),
        }
    }
}

impl<T> Drop for LayerTasks<T> {
    fn drop(&mut self) {
        for handle in &self.aborts {
            handle.abort();
        }
    }
}
