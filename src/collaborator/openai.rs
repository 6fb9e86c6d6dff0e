//! OpenAI-compatible chat completions backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{prompts, GenerationCall, TextGenerator};
use crate::error::CollaboratorError;

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Talks to any endpoint exposing `POST {endpoint}/chat/completions`.
#[derive(Clone)]
pub struct OpenAiCompatibleGenerator {
    client: Client,
    endpoint: String,
    api_key: String,
    temperature: f32,
    timeout: Duration,
}

impl OpenAiCompatibleGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            temperature: 0.7,
            timeout: Duration::from_secs(120),
        })
    }

    /// Reads the API key from the named environment variable.
    pub fn from_env(
        endpoint: impl Into<String>,
        api_key_env: &str,
    ) -> Result<Self, CollaboratorError> {
        let api_key = std::env::var(api_key_env)
            .map_err(|_| CollaboratorError::MissingApiKey(api_key_env.to_string()))?;
        Self::new(endpoint, api_key)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the HTTP-level request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }

    fn request_body(&self, call: &GenerationCall) -> Value {
        let mut body = json!({
            "model": call.model,
            "messages": prompts::render(call),
            "temperature": self.temperature,
        });
        if call.response_format.is_json() {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    async fn invoke(&self, call: &GenerationCall) -> Result<String, CollaboratorError> {
        debug!(template = %call.template_id, model = %call.model, "Sending chat completion");

        let response = self
            .client
            .post(self.url())
            .timeout(self.timeout)
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(&self.api_key)
            .json(&self.request_body(call))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status { status, body });
        }

        let completion: ChatCompletion = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(CollaboratorError::EmptyResponse)
    }
}
