//! Situational judgment test item generation.
//!
//! A batch of (trait, source item) pairs is scheduled under an outer
//! concurrency limit. Each pair is expanded into cues, and every cue is
//! refined through a quality-gated state machine under a generator-wide
//! inner limit. Results are flattened into an indexed collection per trait.

pub mod aggregate;
pub mod collaborator;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod generator;
pub mod logging;
pub mod model;
pub mod parallel;
pub mod progress;
pub mod quality;
pub mod refinement;
pub mod testing;

pub use aggregate::{flatten, ResultAggregator, RunSummary};
pub use collaborator::{GenerationCall, ResponseFormat, TextGenerator};
pub use config::{GenerationMode, GeneratorConfig};
pub use dataset::Dataset;
pub use error::{CollaboratorError, DecodeError, GenerationError, Result};
pub use generator::SjtGenerator;
pub use model::{
    BatchResults, FinalItemCollection, GenerationRequest, OptionScheme, Stage, TraitProfile,
};
pub use parallel::{BatchConfig, BatchRequest, BatchScheduler, ItemPipeline, TraitBatch};
pub use progress::ProgressReporter;
pub use quality::{evaluate, QualityGate, QualityMetrics};
