//! Stage functions of the refinement pipeline.
//!
//! Each collaborator-backed stage is a single round trip: build the call,
//! invoke with a timeout, decode the reply into the stage's fixed output
//! shape, and return the updated record.

use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::collaborator::{decode_json, GenerationCall, ResponseFormat, TextGenerator};
use crate::config::GeneratorConfig;
use crate::error::{CollaboratorError, DecodeError, GenerationError, Result};
use crate::model::{
    AnchorPair, BehaviorOption, CueList, GenerationRecord, GenerationRequest, OptionDraft,
    OptionScheme, RevisionDraft, SituationDraft, Stage, TraitAnalysis,
};
use crate::quality::QualityGate;

/// Per-generator settings every stage call carries.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSettings {
    pub model: String,
    pub situation_theme: String,
    pub target_population: String,
    pub scheme: OptionScheme,
    pub max_option_chars: usize,
    pub call_timeout: Duration,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self::from(&GeneratorConfig::default())
    }
}

impl From<&GeneratorConfig> for StageSettings {
    fn from(config: &GeneratorConfig) -> Self {
        Self {
            model: config.model.clone(),
            situation_theme: config.situation_theme.clone(),
            target_population: config.target_population.clone(),
            scheme: config.option_scheme,
            max_option_chars: config.max_option_chars,
            call_timeout: config.call_timeout(),
        }
    }
}

/// Runs stage functions against one collaborator.
pub struct StageRunner {
    generator: Arc<dyn TextGenerator>,
    settings: StageSettings,
    gate: QualityGate,
}

impl StageRunner {
    pub fn new(generator: Arc<dyn TextGenerator>, settings: StageSettings) -> Self {
        let gate = QualityGate::new(settings.scheme);
        Self {
            generator,
            settings,
            gate,
        }
    }

    pub fn settings(&self) -> &StageSettings {
        &self.settings
    }

    fn call(&self, stage: Stage, format: ResponseFormat) -> GenerationCall {
        GenerationCall::new(stage, self.settings.model.clone(), format)
            .param("target_population", &self.settings.target_population)
            .param("situation_theme", &self.settings.situation_theme)
    }

    async fn invoke<T>(&self, call: GenerationCall) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let stage = call.template_id;
        debug!(%stage, "Invoking collaborator");
        let timeout = self.settings.call_timeout;
        let raw = match tokio::time::timeout(timeout, self.generator.invoke(&call)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(GenerationError::collaborator(stage, e)),
            Err(_) => {
                return Err(GenerationError::collaborator(
                    stage,
                    CollaboratorError::Timeout(timeout),
                ))
            }
        };
        Ok(decode_json(stage, &raw)?)
    }

    async fn invoke_json<T>(&self, call: GenerationCall) -> Result<T>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let call = GenerationCall {
            response_format: ResponseFormat::json_for::<T>(),
            ..call
        };
        self.invoke(call).await
    }

    fn check_option_count(&self, stage: Stage, options: &[BehaviorOption]) -> Result<()> {
        let expected = self.settings.scheme.option_count();
        if options.len() != expected {
            let raw = serde_json::to_string(options).unwrap_or_default();
            return Err(DecodeError::new(
                stage,
                format!("expected {expected} options, got {}", options.len()),
                raw,
            )
            .into());
        }
        Ok(())
    }

    /// Init -> Analyzed: decompose the trait for the source item.
    pub async fn analyze_trait(&self, mut record: GenerationRecord) -> Result<GenerationRecord> {
        let request = record.request();
        let profile = request.profile();
        let call = self
            .call(Stage::TraitAnalysis, ResponseFormat::Text)
            .param("trait_name", &profile.name)
            .param("trait_description", &profile.description)
            .param("low_anchor", &profile.low_anchor)
            .param("high_anchor", &profile.high_anchor)
            .param("source_item", request.source_item());

        let analysis: TraitAnalysis = self.invoke_json(call).await?;
        check_analysis(&analysis)?;
        record.trait_analysis = Some(analysis);
        Ok(record)
    }

    /// Rewrites the trait's anchors neutrally.
    pub async fn polish_anchors(
        &self,
        request: &GenerationRequest,
        analysis: &TraitAnalysis,
    ) -> Result<AnchorPair> {
        let profile = request.profile();
        let call = self
            .call(Stage::AnchorPolish, ResponseFormat::Text)
            .param("trait_name", &profile.name)
            .param("low_anchor", &profile.low_anchor)
            .param("high_anchor", &profile.high_anchor)
            .param("components", &analysis.components);
        self.invoke_json(call).await
    }

    /// Asks for `count` situational cues for the source item.
    ///
    /// Blank cues are dropped and extras are truncated. Getting none back is
    /// a decode failure; getting fewer than asked for is accepted.
    pub async fn generate_cues(
        &self,
        request: &GenerationRequest,
        analysis: &TraitAnalysis,
        anchors: Option<&AnchorPair>,
        count: usize,
    ) -> Result<Vec<String>> {
        let profile = request.profile();
        let call = self
            .call(Stage::CueGeneration, ResponseFormat::Text)
            .param("trait_name", &profile.name)
            .param("source_item", request.source_item())
            .param("observable_cues", &analysis.mapping.observable_cues)
            .param("anchors", anchors)
            .param("cue_count", count);

        let list: CueList = self.invoke_json(call).await?;
        let raw_len = list.cues.len();
        let mut cues: Vec<String> = list
            .cues
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if cues.is_empty() {
            return Err(DecodeError::new(
                Stage::CueGeneration,
                "no usable cues returned",
                format!("{raw_len} blank cues"),
            )
            .into());
        }
        if cues.len() < count {
            warn!(
                trait_id = request.trait_id(),
                requested = count,
                received = cues.len(),
                "Collaborator returned fewer cues than requested"
            );
        }
        cues.truncate(count);
        Ok(cues)
    }

    /// Analyzed -> Constructed: build the outline and narrate the scenario.
    pub async fn construct_situation(
        &self,
        mut record: GenerationRecord,
    ) -> Result<GenerationRecord> {
        let analysis = record.require_analysis(Stage::SituationConstruction)?;
        let request = record.request();
        let profile = request.profile();
        let mut call = self
            .call(Stage::SituationConstruction, ResponseFormat::Text)
            .param("trait_name", &profile.name)
            .param("source_item", request.source_item())
            .param("trait_mapping", &analysis.mapping);
        if let Some(anchors) = record.polished_anchors() {
            call = call.param("anchors", anchors);
        }
        if let Some(cue) = record.seed_cue() {
            call = call.param("cue", cue);
        }

        let draft: SituationDraft = self.invoke_json(call).await?;
        if draft.scenario_text.trim().is_empty() {
            return Err(DecodeError::new(
                Stage::SituationConstruction,
                "scenario_text is empty",
                serde_json::to_string(&draft).unwrap_or_default(),
            )
            .into());
        }

        let mut outline = draft.outline;
        if let Some(cue) = record.seed_cue() {
            if !outline.cues.iter().any(|c| c == cue) {
                outline.cues.insert(0, cue.to_string());
            }
        }
        record.situation_outline = Some(outline);
        record.scenario_text = Some(draft.scenario_text);
        Ok(record)
    }

    /// Constructed -> Adapted: draft the graded options.
    pub async fn adapt_behavior(&self, mut record: GenerationRecord) -> Result<GenerationRecord> {
        let (outline, scenario_text) = record.require_outline(Stage::BehaviorAdaptation)?;
        let glossary = record
            .trait_analysis()
            .map(|a| a.evidence_glossary.clone())
            .unwrap_or_default();
        let scheme = self.settings.scheme;
        let call = self
            .call(Stage::BehaviorAdaptation, ResponseFormat::Text)
            .param("scenario_text", scenario_text)
            .param("outline", outline)
            .param("glossary", &glossary)
            .param("option_count", scheme.option_count())
            .param("labels", scheme.labels())
            .param("trait_levels", scheme.levels())
            .param("max_option_chars", self.settings.max_option_chars);

        let draft: OptionDraft = self.invoke_json(call).await?;
        self.check_option_count(Stage::BehaviorAdaptation, &draft.options)?;
        record.options = Some(draft.options);
        Ok(record)
    }

    /// Adapted -> Checked: score the current options. No collaborator call.
    pub fn check_quality(&self, mut record: GenerationRecord) -> Result<GenerationRecord> {
        let options = record.require_options(Stage::BehaviorAdaptation)?;
        let (outline, _) = record.require_outline(Stage::BehaviorAdaptation)?;
        let metrics = self.gate.evaluate(options, &outline.cues);
        debug!(
            trait_id = record.request().trait_id(),
            iteration = record.iteration_count,
            pass = metrics.pass,
            "{}",
            metrics.summary()
        );
        record.revise_notes = metrics.deficiencies();
        record.quality = Some(metrics);
        Ok(record)
    }

    /// Revised -> Adapted: rewrite options (and maybe the scenario) to fix
    /// the recorded deficiencies.
    pub async fn revise(&self, mut record: GenerationRecord) -> Result<GenerationRecord> {
        let options = record.require_options(Stage::Revision)?;
        let (outline, scenario_text) = record.require_outline(Stage::Revision)?;
        let issues: Vec<&str> = record.revise_notes().iter().map(|d| d.as_str()).collect();
        let scheme = self.settings.scheme;
        let call = self
            .call(Stage::Revision, ResponseFormat::Text)
            .param("issues", &issues)
            .param("scenario_text", scenario_text)
            .param("outline", outline)
            .param("options", options)
            .param("option_count", scheme.option_count())
            .param("labels", scheme.labels())
            .param("trait_levels", scheme.levels())
            .param("max_option_chars", self.settings.max_option_chars);

        let draft: RevisionDraft = self.invoke_json(call).await?;
        self.check_option_count(Stage::Revision, &draft.options)?;
        if let Some(text) = draft.scenario_text.filter(|t| !t.trim().is_empty()) {
            record.scenario_text = Some(text);
        }
        record.options = Some(draft.options);
        record.iteration_count += 1;
        Ok(record)
    }
}

/// A usable analysis decomposes the trait and names observable cues.
fn check_analysis(analysis: &TraitAnalysis) -> Result<()> {
    let components = &analysis.components;
    let reason = if components.cognitive.is_empty()
        && components.affective.is_empty()
        && components.behavioral.is_empty()
    {
        "empty component decomposition"
    } else if analysis.mapping.observable_cues.is_empty() {
        "no observable cues in evidence mapping"
    } else {
        return Ok(());
    };
    let raw = serde_json::to_string(analysis).unwrap_or_default();
    Err(DecodeError::new(Stage::TraitAnalysis, reason, raw).into())
}
