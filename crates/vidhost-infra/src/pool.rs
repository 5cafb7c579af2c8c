//! Bounded fan-out with a join barrier.
//!
//! Tasks are spawned immediately but each waits for one of `max_concurrency` permits
//! before running its body. [`BoundedPool::join_all`] and [`BoundedPool::try_join_all`]
//! are the barrier: they return only once every spawned task has finished or been
//! cancelled.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

#[derive(Debug, thiserror::Error)]
pub enum PoolError<E> {
    #[error("{0}")]
    Task(E),

    #[error("Pool task panicked or was cancelled: {0}")]
    Join(#[from] JoinError),
}

impl<E> PoolError<E> {
    /// The task's own error, if the failure came from the task body.
    pub fn into_task_error(self) -> Option<E> {
        match self {
            PoolError::Task(e) => Some(e),
            PoolError::Join(_) => None,
        }
    }
}

pub struct BoundedPool<T> {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<T>,
    max_concurrency: usize,
}

impl<T: Send + 'static> BoundedPool<T> {
    /// `max_concurrency` of zero is treated as one.
    pub fn new(max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            tasks: JoinSet::new(),
            max_concurrency,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Tasks spawned and not yet joined.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        self.tasks.spawn(async move {
            // The semaphore is never closed, so acquisition only fails if it is dropped.
            let _permit = semaphore.acquire_owned().await.ok();
            task.await
        });
    }

    /// Wait for every task. Results arrive in completion order.
    pub async fn join_all(mut self) -> Result<Vec<T>, JoinError> {
        let mut results = Vec::with_capacity(self.tasks.len());
        let mut first_error = None;
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(value) => results.push(value),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(_) => {}
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}

impl<R: Send + 'static, E: Send + 'static> BoundedPool<Result<R, E>> {
    /// Wait for every task, stopping at the first failure.
    ///
    /// On failure, tasks still waiting for a permit or running are cancelled and
    /// drained before the error is returned, so nothing spawned by this pool
    /// outlives the call. Successful results arrive in completion order.
    pub async fn try_join_all(mut self) -> Result<Vec<R>, PoolError<E>> {
        let mut results = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            let failure = match joined {
                Ok(Ok(value)) => {
                    results.push(value);
                    continue;
                }
                Ok(Err(e)) => PoolError::Task(e),
                Err(e) => PoolError::Join(e),
            };

            self.tasks.abort_all();
            let mut cancelled = 0usize;
            while let Some(rest) = self.tasks.join_next().await {
                if matches!(&rest, Err(e) if e.is_cancelled()) {
                    cancelled += 1;
                }
            }
            tracing::debug!(
                completed = results.len(),
                cancelled,
                "Bounded pool stopped after first failure"
            );
            return Err(failure);
        }
        Ok(results)
    }
}
