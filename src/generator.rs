//! The SJT generator: one collaborator, one cue concurrency limit, and the
//! per-pair pipeline the batch scheduler drives.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::collaborator::{CommandGenerator, OpenAiCompatibleGenerator, TextGenerator};
use crate::config::{BackendKind, GenerationMode, GeneratorConfig};
use crate::error::{GenerationError, Result};
use crate::model::{CueFanoutResult, GenerationRecord, GenerationRequest, ItemResult, RefinedItem};
use crate::parallel::{BatchConfig, BatchScheduler, CueFanoutScheduler, ItemPipeline};
use crate::progress::ProgressReporter;
use crate::refinement::{RefinementMachine, StageRunner, StageSettings};

/// Builds the collaborator described by `config.backend`.
pub fn backend_from_config(config: &GeneratorConfig) -> Result<Arc<dyn TextGenerator>> {
    let backend = &config.backend;
    match backend.kind {
        BackendKind::OpenAi => {
            let generator =
                OpenAiCompatibleGenerator::from_env(backend.endpoint.clone(), &backend.api_key_env)
                    .map_err(|e| GenerationError::configuration(e.to_string()))?
                    .with_temperature(backend.temperature)
                    .with_timeout(config.call_timeout());
            Ok(Arc::new(generator))
        }
        BackendKind::Command => {
            let (program, args) = backend.command.split_first().ok_or_else(|| {
                GenerationError::configuration("the command backend needs backend.command")
            })?;
            let command = CommandGenerator::new(program)
                .with_args(args.iter().cloned())
                .with_max_processes(config.blocking_workers);
            Ok(Arc::new(command))
        }
    }
}

/// Generates SJT items for single requests or whole batches.
///
/// The cue concurrency limit belongs to the generator, so every batch task
/// sharing this instance draws from the same pool of cue permits.
pub struct SjtGenerator {
    stages: Arc<StageRunner>,
    fanout: CueFanoutScheduler,
    mode: GenerationMode,
}

impl SjtGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &GeneratorConfig) -> Self {
        let stages = Arc::new(StageRunner::new(generator, StageSettings::from(config)));
        let fanout = CueFanoutScheduler::new(Arc::clone(&stages), config.cue_concurrency)
            .with_polish_anchors(config.polish_anchors);
        Self {
            stages,
            fanout,
            mode: config.mode,
        }
    }

    /// Validates `config` and connects to its backend.
    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(backend_from_config(config)?, config))
    }

    pub fn mode(&self) -> GenerationMode {
        self.mode
    }

    pub fn cue_concurrency(&self) -> usize {
        self.fanout.concurrency()
    }

    /// Expands one source item into cue-seeded items.
    pub async fn generate_item(&self, request: &GenerationRequest) -> Result<CueFanoutResult> {
        self.fanout.run(request).await
    }

    /// Runs the full refinement once for one source item.
    pub async fn refine_item(&self, request: &GenerationRequest) -> Result<RefinedItem> {
        RefinementMachine::new(&self.stages)
            .run(GenerationRecord::new(request.clone()))
            .await
    }

    /// A batch scheduler driving this generator.
    pub fn batch_scheduler(
        self: &Arc<Self>,
        config: &GeneratorConfig,
        progress: Arc<dyn ProgressReporter>,
    ) -> BatchScheduler {
        let batch_config = BatchConfig {
            max_concurrency: config.batch_concurrency,
            items_per_source: config.items_per_source,
        };
        let pipeline: Arc<dyn ItemPipeline> = Arc::clone(self) as Arc<dyn ItemPipeline>;
        BatchScheduler::new(pipeline, batch_config).with_progress(progress)
    }
}

#[async_trait]
impl ItemPipeline for SjtGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<ItemResult> {
        debug!(
            trait_id = request.trait_id(),
            mode = ?self.mode,
            "Generating item"
        );
        match self.mode {
            GenerationMode::CueFanout => {
                self.generate_item(&request).await.map(ItemResult::CueFanout)
            }
            GenerationMode::SingleItem => {
                self.refine_item(&request).await.map(ItemResult::Refined)
            }
        }
    }
}
