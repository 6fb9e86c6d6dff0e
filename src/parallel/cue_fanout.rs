//! Cue fan-out for a single source item.
//!
//! One source item is analyzed once, expanded into cues, and each cue is
//! refined into its own item. Cue pipelines share a single semaphore owned by
//! the scheduler, so the limit holds across every outer task using the same
//! scheduler. A failing cue becomes a `Failed` record and never cancels its
//! siblings.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::error::{GenerationError, Result};
use crate::model::{
    AnchorPair, CueFanoutResult, CueTaskResult, GenerationRecord, GenerationRequest, Stage,
    TraitAnalysis,
};
use crate::refinement::{RefinementMachine, StageRunner};

/// Runs cue pipelines under a generator-wide concurrency limit.
pub struct CueFanoutScheduler {
    stages: Arc<StageRunner>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    polish_anchors: bool,
}

impl CueFanoutScheduler {
    /// `concurrency` is clamped to at least one.
    pub fn new(stages: Arc<StageRunner>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            stages,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            polish_anchors: true,
        }
    }

    pub fn with_polish_anchors(mut self, enabled: bool) -> Self {
        self.polish_anchors = enabled;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Cue pipelines that could start right now.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Expands `request` into `request.item_count()` cues and refines each.
    ///
    /// Errors before the fan-out (trait analysis, anchor polishing, cue
    /// generation) fail the whole call. Errors inside one cue pipeline are
    /// recorded in that cue's slot.
    pub async fn run(&self, request: &GenerationRequest) -> Result<CueFanoutResult> {
        let analyzed = self
            .stages
            .analyze_trait(GenerationRecord::new(request.clone()))
            .await?;
        let analysis = analyzed.require_analysis(Stage::TraitAnalysis)?.clone();

        let anchors = if self.polish_anchors {
            Some(self.stages.polish_anchors(request, &analysis).await?)
        } else {
            None
        };

        let cues = self
            .stages
            .generate_cues(request, &analysis, anchors.as_ref(), request.item_count())
            .await?;

        // join_all yields results in input order, whatever order they finish in.
        let items = join_all(
            cues.iter()
                .map(|cue| self.run_cue(request, &analysis, anchors.as_ref(), cue)),
        )
        .await;

        let result = CueFanoutResult {
            source_item: request.source_item().to_string(),
            trait_analysis: analysis,
            polished_anchors: anchors,
            cues,
            items,
        };
        info!(
            trait_id = request.trait_id(),
            cues = result.cues.len(),
            succeeded = result.success_count(),
            "Cue fan-out finished"
        );
        Ok(result)
    }

    async fn run_cue(
        &self,
        request: &GenerationRequest,
        analysis: &TraitAnalysis,
        anchors: Option<&AnchorPair>,
        cue: &str,
    ) -> CueTaskResult {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(e) => return CueTaskResult::failed(e.to_string(), cue),
        };

        let record =
            GenerationRecord::seeded(request.clone(), analysis.clone(), anchors.cloned(), cue);
        match RefinementMachine::new(&self.stages).run_seeded(record).await {
            Ok(item) => CueTaskResult::Generated(item.into_cue_item(cue)),
            Err(source) => {
                let message = source.to_string();
                let err = GenerationError::CueTask {
                    cue: cue.to_string(),
                    source: Box::new(source),
                };
                warn!(trait_id = request.trait_id(), "{err}");
                CueTaskResult::failed(message, cue)
            }
        }
    }
}
