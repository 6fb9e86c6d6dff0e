//! Batch scheduling across (trait, source item) pairs.
//!
//! Every pair becomes one task admitted by an outer semaphore. Completions
//! are consumed as they arrive, but only to drive progress reporting: each
//! result is written to the slot of its (trait, index) pair. The first task
//! error aborts the batch. The remaining tasks are cancelled and the error is
//! returned with the failing pair attached.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::ItemPipeline;
use crate::error::{GenerationError, Result};
use crate::model::{
    BatchProgress, BatchResults, GenerationRequest, ItemResult, TraitProfile, TraitResults,
};
use crate::progress::{NoopProgress, ProgressReporter};

/// One trait and the source items to generate from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitBatch {
    pub profile: TraitProfile,
    pub items: Vec<String>,
}

impl TraitBatch {
    pub fn new(profile: TraitProfile, items: Vec<String>) -> Self {
        Self { profile, items }
    }
}

/// The full set of pairs submitted together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub traits: Vec<TraitBatch>,
}

impl BatchRequest {
    pub fn new(traits: Vec<TraitBatch>) -> Self {
        Self { traits }
    }

    /// Number of (trait, item) tasks the batch will run.
    pub fn task_count(&self) -> usize {
        self.traits.iter().map(|t| t.items.len()).sum()
    }

    /// Checks trait metadata and item lists before anything is scheduled.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for t in &self.traits {
            t.profile.validate()?;
            if !seen.insert(t.profile.id.as_str()) {
                return Err(GenerationError::configuration(format!(
                    "trait {} is listed more than once",
                    t.profile.id
                )));
            }
            if t.items.is_empty() {
                return Err(GenerationError::configuration(format!(
                    "trait {} has no source items",
                    t.profile.id
                )));
            }
        }
        Ok(())
    }
}

/// Configuration for batch execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum tasks in flight. `None` admits every task at once.
    pub max_concurrency: Option<usize>,
    /// Cues requested per source item.
    pub items_per_source: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            items_per_source: 3,
        }
    }
}

impl BatchConfig {
    /// The semaphore size for a batch of `total` tasks.
    pub fn effective_concurrency(&self, total: usize) -> usize {
        let total = total.max(1);
        self.max_concurrency.unwrap_or(total).clamp(1, total)
    }
}

/// Runs an [`ItemPipeline`] over every pair of a [`BatchRequest`].
pub struct BatchScheduler {
    pipeline: Arc<dyn ItemPipeline>,
    config: BatchConfig,
    progress: Arc<dyn ProgressReporter>,
}

impl BatchScheduler {
    pub fn new(pipeline: Arc<dyn ItemPipeline>, config: BatchConfig) -> Self {
        Self {
            pipeline,
            config,
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Runs the batch. Returns every result in request order, or the first
    /// task error wrapped with its (trait, index).
    pub async fn run(&self, request: &BatchRequest) -> Result<BatchResults> {
        request.validate()?;
        if self.config.items_per_source == 0 {
            return Err(GenerationError::configuration(
                "items_per_source must be at least 1",
            ));
        }

        let total = request.task_count();
        let limit = self.config.effective_concurrency(total);
        let semaphore = Semaphore::new(limit);
        let items_per_source = self.config.items_per_source;
        info!(
            traits = request.traits.len(),
            tasks = total,
            concurrency = limit,
            "Starting batch"
        );

        let mut slots: Vec<Vec<Option<ItemResult>>> = request
            .traits
            .iter()
            .map(|t| (0..t.items.len()).map(|_| None).collect())
            .collect();
        let mut progress = BatchProgress::new(total);

        let mut in_flight = FuturesUnordered::new();
        for (trait_pos, batch) in request.traits.iter().enumerate() {
            for (index, item) in batch.items.iter().enumerate() {
                let semaphore = &semaphore;
                let pipeline = &self.pipeline;
                in_flight.push(async move {
                    let result = async {
                        let _permit = semaphore.acquire().await.map_err(|e| {
                            GenerationError::configuration(format!("batch semaphore closed: {e}"))
                        })?;
                        let request = GenerationRequest::new(
                            batch.profile.clone(),
                            item.clone(),
                            items_per_source,
                        )?;
                        pipeline.generate(request).await
                    }
                    .await;
                    (trait_pos, index, result)
                });
            }
        }

        while let Some((trait_pos, index, result)) = in_flight.next().await {
            let trait_id = &request.traits[trait_pos].profile.id;
            match result {
                Ok(item) => {
                    slots[trait_pos][index] = Some(item);
                    progress.record_completion(format!("{trait_id} item {} done", index + 1));
                    self.progress.report(
                        progress.completed_count,
                        progress.total_count,
                        &progress.last_detail_message,
                    );
                }
                Err(source) => {
                    let cancelled = in_flight.len();
                    // Dropping the set cancels every task still pending or running.
                    drop(in_flight);
                    self.progress.finish();
                    let err = GenerationError::batch_task(trait_id.clone(), index, source);
                    warn!(cancelled, "Batch aborted: {err}");
                    return Err(err);
                }
            }
        }
        self.progress.finish();

        let mut traits = Vec::with_capacity(request.traits.len());
        for (batch, slot) in request.traits.iter().zip(slots) {
            let items = slot.into_iter().collect::<Option<Vec<_>>>().ok_or_else(|| {
                GenerationError::configuration(format!(
                    "batch finished with missing results for trait {}",
                    batch.profile.id
                ))
            })?;
            traits.push(TraitResults {
                trait_id: batch.profile.id.clone(),
                items,
            });
        }

        info!(completed = progress.completed_count, "Batch finished");
        Ok(BatchResults { traits })
    }
}
