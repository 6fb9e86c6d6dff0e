//! Bounded-concurrency scheduling.
//!
//! Two independent limits apply. The batch scheduler bounds how many
//! (trait, item) tasks run at once and fails fast. The cue fan-out bounds how
//! many cue pipelines run at once across the whole generator and isolates
//! failures per cue.

pub mod batch;
pub mod cue_fanout;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{GenerationRequest, ItemResult};

pub use batch::{BatchConfig, BatchRequest, BatchScheduler, TraitBatch};
pub use cue_fanout::CueFanoutScheduler;

/// Produces the result for one (trait, source item) pair.
#[async_trait]
pub trait ItemPipeline: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<ItemResult>;
}
