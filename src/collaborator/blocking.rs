//! Off-loading synchronous collaborators onto a bounded worker pool.
//!
//! A blocking `invoke` would stall the cooperative scheduler. The adapter
//! moves each call onto tokio's blocking threads, admitting at most
//! `workers` calls at a time. A call that is already running cannot be
//! interrupted: its worker slot is held until `invoke_blocking` returns, so
//! implementations must bound their own running time.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::{GenerationCall, TextGenerator};
use crate::error::CollaboratorError;

/// A collaborator whose calls block the current thread.
pub trait BlockingTextGenerator: Send + Sync + 'static {
    fn invoke_blocking(&self, call: &GenerationCall) -> Result<String, CollaboratorError>;
}

/// Async adapter for a [`BlockingTextGenerator`].
pub struct BlockingGenerator<G> {
    inner: Arc<G>,
    workers: Arc<Semaphore>,
    worker_count: usize,
}

impl<G: BlockingTextGenerator> BlockingGenerator<G> {
    /// Wraps `inner`; `workers` is clamped to at least one.
    pub fn new(inner: G, workers: usize) -> Self {
        let worker_count = workers.max(1);
        Self {
            inner: Arc::new(inner),
            workers: Arc::new(Semaphore::new(worker_count)),
            worker_count,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}

#[async_trait]
impl<G: BlockingTextGenerator> TextGenerator for BlockingGenerator<G> {
    async fn invoke(&self, call: &GenerationCall) -> Result<String, CollaboratorError> {
        let permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| CollaboratorError::WorkerPool(e.to_string()))?;
        let inner = Arc::clone(&self.inner);
        let call = call.clone();

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            inner.invoke_blocking(&call)
        })
        .await
        .map_err(|e| CollaboratorError::WorkerPool(e.to_string()))?
    }
}
