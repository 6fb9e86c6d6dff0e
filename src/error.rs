//! Error types for SJT item generation.
//!
//! The taxonomy mirrors the two failure policies of the orchestration layer:
//! cue-level errors are recovered into data, batch-level errors abort the
//! whole call with (trait, item index) context attached.

use std::time::Duration;

use thiserror::Error;

use crate::model::Stage;

/// Errors raised by a text-generation collaborator round trip.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("backend response carried no message content")]
    EmptyResponse,

    #[error("worker pool unavailable: {0}")]
    WorkerPool(String),

    #[error("{0}")]
    Backend(String),
}

/// A collaborator response that could not be coerced into the shape a stage
/// expects, even after the fallback extraction pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to decode {stage} response: {reason}")]
pub struct DecodeError {
    pub stage: Stage,
    pub reason: String,
    /// The raw collaborator text, kept for debugging.
    pub raw: String,
}

impl DecodeError {
    pub fn new(stage: Stage, reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
            raw: raw.into(),
        }
    }
}

/// Top-level error type for the generation pipeline.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("collaborator call failed during {stage}: {source}")]
    Collaborator {
        stage: Stage,
        #[source]
        source: CollaboratorError,
    },

    #[error("cue '{cue}' failed: {source}")]
    CueTask {
        cue: String,
        #[source]
        source: Box<GenerationError>,
    },

    #[error("failed to generate items for trait {trait_id} at index {index}: {source}")]
    BatchTask {
        trait_id: String,
        index: usize,
        #[source]
        source: Box<GenerationError>,
    },

    #[error("stage {stage} ran before {missing} was populated")]
    StageOrder { stage: Stage, missing: &'static str },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GenerationError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn collaborator(stage: Stage, source: CollaboratorError) -> Self {
        Self::Collaborator { stage, source }
    }

    /// Wraps an error raised inside one (trait, item) task.
    pub fn batch_task(trait_id: impl Into<String>, index: usize, source: GenerationError) -> Self {
        Self::BatchTask {
            trait_id: trait_id.into(),
            index,
            source: Box::new(source),
        }
    }

    /// The (trait, item index) pair a batch-level error refers to, if any.
    pub fn batch_context(&self) -> Option<(&str, usize)> {
        match self {
            Self::BatchTask {
                trait_id, index, ..
            } => Some((trait_id.as_str(), *index)),
            _ => None,
        }
    }

    /// Walks through batch and cue wrappers to the underlying cause.
    pub fn root_cause(&self) -> &GenerationError {
        match self {
            Self::BatchTask { source, .. } | Self::CueTask { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<config::ConfigError> for GenerationError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, GenerationError>;
