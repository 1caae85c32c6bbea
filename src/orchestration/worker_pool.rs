//! Bounded per-task worker pool.
//!
//! Each task owns one pool sized by `executor.task_threads`. Work beyond the
//! bound queues on the semaphore without limit. Spawned work is detached from the
//! caller: dropping a [`JoinHandle`] does not cancel it, so an in-flight subtask
//! always runs to completion.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::{CommissionerError, Result};

#[derive(Debug, Clone)]
pub struct TaskWorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl TaskWorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run `work` once a worker is free
    pub fn spawn<F, T>(&self, work: F) -> JoinHandle<Result<T>>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.map_err(|e| {
                CommissionerError::Internal(format!("task worker pool closed: {e}"))
            })?;
            work.await
        })
    }
}
