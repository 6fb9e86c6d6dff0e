//! Text-generation collaborators.
//!
//! Every stage talks to the backend through [`TextGenerator::invoke`], passing
//! a fixed template id, named parameters, and the response contract. The raw
//! reply is decoded by the calling stage with [`decode::decode_json`].

pub mod blocking;
pub mod command;
pub mod decode;
pub mod openai;
pub mod prompts;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CollaboratorError;
use crate::model::Stage;

pub use blocking::{BlockingGenerator, BlockingTextGenerator};
pub use command::CommandGenerator;
pub use decode::{decode_json, extract_first_object};
pub use openai::OpenAiCompatibleGenerator;

/// How the collaborator should shape its reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// A single JSON object matching `schema`.
    Json { schema: Value },
    /// Free text.
    Text,
}

impl ResponseFormat {
    /// The JSON response contract for a stage output type.
    pub fn json_for<T: schemars::JsonSchema>() -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null);
        ResponseFormat::Json { schema }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, ResponseFormat::Json { .. })
    }
}

/// One collaborator round trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationCall {
    pub template_id: Stage,
    pub model: String,
    pub params: Map<String, Value>,
    pub response_format: ResponseFormat,
}

impl GenerationCall {
    pub fn new(template_id: Stage, model: impl Into<String>, response_format: ResponseFormat) -> Self {
        Self {
            template_id,
            model: model.into(),
            params: Map::new(),
            response_format,
        }
    }

    /// Adds a named parameter. Values that fail to serialize become `null`.
    pub fn param(mut self, name: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.params.insert(name.to_string(), value);
        self
    }

    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }
}

/// A backend able to answer generation calls.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn invoke(&self, call: &GenerationCall) -> Result<String, CollaboratorError>;
}
