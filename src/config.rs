//! Generator configuration.
//!
//! Settings are layered with the `config` crate: built-in defaults, then an
//! optional TOML file, then `SJT_`-prefixed environment variables
//! (`SJT_MODEL`, `SJT_BACKEND__ENDPOINT`, ...).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, Result};
use crate::model::OptionScheme;

/// How each (trait, source item) pair is generated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Expand the source item into cues and refine one item per cue.
    #[default]
    CueFanout,
    /// Run the full refinement once per source item.
    SingleItem,
}

/// Which collaborator backs the generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    OpenAi,
    /// An external program speaking JSON over stdin/stdout.
    Command,
}

/// Text-generation backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Base URL of an OpenAI-compatible API.
    pub endpoint: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    /// Program and arguments for the command backend.
    pub command: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::OpenAi,
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.7,
            command: Vec::new(),
        }
    }
}

/// Configuration for an SJT generator and the batches it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Model identifier passed on every call.
    /// Default: "gpt-4o-mini"
    pub model: String,

    /// Broad theme situations are drawn from.
    /// Default: "workplace"
    pub situation_theme: String,

    /// Who the items are written for.
    /// Default: "working adults"
    pub target_population: String,

    /// Maximum cue pipelines in flight across the whole generator.
    /// Default: 100
    pub cue_concurrency: usize,

    /// Maximum (trait, item) tasks in flight. `None` admits every task.
    /// Default: None
    pub batch_concurrency: Option<usize>,

    /// Cues (and so items) generated per source item.
    /// Default: 3
    pub items_per_source: usize,

    /// Option scheme used for every item in a run.
    /// Default: five_option
    pub option_scheme: OptionScheme,

    /// Length budget for one option's action text, in characters.
    /// Default: 80
    pub max_option_chars: usize,

    /// Whether to rewrite trait anchors neutrally before cue generation.
    /// Default: true
    pub polish_anchors: bool,

    /// Per-call timeout for collaborator round trips, in seconds.
    /// Default: 120
    pub call_timeout_secs: u64,

    /// Concurrent backend processes for the command backend, and worker
    /// threads for blocking collaborators.
    /// Default: 4
    pub blocking_workers: usize,

    /// Generation mode for each (trait, item) pair.
    /// Default: cue_fanout
    pub mode: GenerationMode,

    pub backend: BackendConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            situation_theme: "workplace".to_string(),
            target_population: "working adults".to_string(),
            cue_concurrency: 100,
            batch_concurrency: None,
            items_per_source: 3,
            option_scheme: OptionScheme::FiveOption,
            max_option_chars: 80,
            polish_anchors: true,
            call_timeout_secs: 120,
            blocking_workers: 4,
            mode: GenerationMode::CueFanout,
            backend: BackendConfig::default(),
        }
    }
}

impl GeneratorConfig {
    /// Creates a new GeneratorConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads defaults, then `path` (if given), then `SJT_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix("SJT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        let loaded: Self = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Parses a TOML document on top of the defaults, without environment overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let loaded: Self = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Rejects limits that would stall or misconfigure a run.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(GenerationError::configuration("model must not be empty"));
        }
        if self.cue_concurrency == 0 {
            return Err(GenerationError::configuration(
                "cue_concurrency must be at least 1",
            ));
        }
        if self.batch_concurrency == Some(0) {
            return Err(GenerationError::configuration(
                "batch_concurrency must be at least 1 when set",
            ));
        }
        if self.items_per_source == 0 {
            return Err(GenerationError::configuration(
                "items_per_source must be at least 1",
            ));
        }
        if self.blocking_workers == 0 {
            return Err(GenerationError::configuration(
                "blocking_workers must be at least 1",
            ));
        }
        if self.backend.kind == BackendKind::Command && self.backend.command.is_empty() {
            return Err(GenerationError::configuration(
                "the command backend needs backend.command",
            ));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Sets the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_situation_theme(mut self, theme: impl Into<String>) -> Self {
        self.situation_theme = theme.into();
        self
    }

    pub fn with_target_population(mut self, population: impl Into<String>) -> Self {
        self.target_population = population.into();
        self
    }

    /// Sets the generator-wide cue concurrency limit.
    pub fn with_cue_concurrency(mut self, limit: usize) -> Self {
        self.cue_concurrency = limit;
        self
    }

    /// Sets the outer (trait, item) concurrency limit.
    pub fn with_batch_concurrency(mut self, limit: Option<usize>) -> Self {
        self.batch_concurrency = limit;
        self
    }

    pub fn with_items_per_source(mut self, count: usize) -> Self {
        self.items_per_source = count;
        self
    }

    pub fn with_option_scheme(mut self, scheme: OptionScheme) -> Self {
        self.option_scheme = scheme;
        self
    }

    pub fn with_polish_anchors(mut self, enabled: bool) -> Self {
        self.polish_anchors = enabled;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_mode(mut self, mode: GenerationMode) -> Self {
        self.mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_values() {
        let config = GeneratorConfig::default();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.cue_concurrency, 100);
        assert_eq!(config.batch_concurrency, None);
        assert_eq!(config.items_per_source, 3);
        assert_eq!(config.option_scheme, OptionScheme::FiveOption);
        assert_eq!(config.call_timeout(), Duration::from_secs(120));
        assert_eq!(config.mode, GenerationMode::CueFanout);
        assert_eq!(config.backend.kind, BackendKind::OpenAi);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = GeneratorConfig::new()
            .with_model("local-model")
            .with_cue_concurrency(4)
            .with_batch_concurrency(Some(2))
            .with_items_per_source(5)
            .with_option_scheme(OptionScheme::FourLevel)
            .with_polish_anchors(false)
            .with_call_timeout(Duration::from_secs(30))
            .with_mode(GenerationMode::SingleItem);

        assert_eq!(config.model, "local-model");
        assert_eq!(config.cue_concurrency, 4);
        assert_eq!(config.batch_concurrency, Some(2));
        assert_eq!(config.items_per_source, 5);
        assert_eq!(config.option_scheme, OptionScheme::FourLevel);
        assert!(!config.polish_anchors);
        assert_eq!(config.call_timeout_secs, 30);
        assert_eq!(config.mode, GenerationMode::SingleItem);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = GeneratorConfig::from_toml_str(
            r#"
            model = "qwen2.5"
            option_scheme = "four_level"
            batch_concurrency = 8

            [backend]
            endpoint = "http://localhost:11434/v1"
            "#,
        )
        .unwrap();
        assert_eq!(config.model, "qwen2.5");
        assert_eq!(config.option_scheme, OptionScheme::FourLevel);
        assert_eq!(config.batch_concurrency, Some(8));
        assert_eq!(config.backend.endpoint, "http://localhost:11434/v1");
        assert_eq!(config.backend.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.cue_concurrency, 100);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "situation_theme = \"campus life\"\nitems_per_source = 2").unwrap();
        let config = GeneratorConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.situation_theme, "campus life");
        assert_eq!(config.items_per_source, 2);
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = GeneratorConfig::load(Some(Path::new("/nonexistent/sjt.toml"))).unwrap_err();
        assert!(matches!(err, GenerationError::Configuration(_)));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        assert!(GeneratorConfig::new().with_cue_concurrency(0).validate().is_err());
        assert!(GeneratorConfig::new()
            .with_batch_concurrency(Some(0))
            .validate()
            .is_err());
        assert!(GeneratorConfig::new().with_items_per_source(0).validate().is_err());
    }

    #[test]
    fn test_command_backend_needs_command() {
        let result = GeneratorConfig::from_toml_str("[backend]\nkind = \"command\"\n");
        assert!(result.is_err());
        let config = GeneratorConfig::from_toml_str(
            "[backend]\nkind = \"command\"\ncommand = [\"./fake-llm\"]\n",
        )
        .unwrap();
        assert_eq!(config.backend.command, vec!["./fake-llm"]);
    }
}
