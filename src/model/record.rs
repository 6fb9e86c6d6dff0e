//! The per-run generation record and the fixed output shape of each stage.
//!
//! Every collaborator response is decoded into one of the structs below. The
//! shapes derive `JsonSchema` so the same type doubles as the response
//! contract attached to the call.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

use super::{CueItem, GenerationRequest, Stage};
use crate::error::{GenerationError, Result};
use crate::quality::{Deficiency, QualityMetrics};

/// Cognitive, affective, and behavioral components of a trait.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TraitComponents {
    #[serde(default, alias = "cognition")]
    pub cognitive: Vec<String>,
    #[serde(default, alias = "affect")]
    pub affective: Vec<String>,
    #[serde(default, alias = "behavior")]
    pub behavioral: Vec<String>,
}

/// Maps trait components onto elements a situation can carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EvidenceMapping {
    pub observable_cues: Vec<String>,
    #[serde(default)]
    pub action_bases: Vec<String>,
    #[serde(default)]
    pub outcome_feedback: Vec<String>,
}

/// Typical high/low expressions of the trait, used to grade option intensity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EvidenceGlossary {
    #[serde(default)]
    pub high: Vec<String>,
    #[serde(default)]
    pub low: Vec<String>,
}

/// Output of the trait analysis stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TraitAnalysis {
    pub components: TraitComponents,
    pub mapping: EvidenceMapping,
    #[serde(default)]
    pub evidence_glossary: EvidenceGlossary,
}

/// One pole of a trait, described neutrally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PoleDescription {
    pub cognitive: String,
    pub emotional: String,
    pub behavioral: String,
}

/// Output of the anchor polishing stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnchorPair {
    pub high_score: PoleDescription,
    pub low_score: PoleDescription,
}

/// Output of the cue generation stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CueList {
    pub cues: Vec<String>,
}

/// Skeleton of a situation before it is narrated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SituationOutline {
    #[serde(default)]
    pub prototype: String,
    #[serde(default)]
    pub setting: String,
    #[serde(default)]
    pub trigger: String,
    /// Cues the options are expected to pick up.
    #[serde(default)]
    pub cues: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    #[schemars(with = "Vec<String>")]
    pub constraints: Vec<String>,
}

/// Output of the situation construction stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SituationDraft {
    pub outline: SituationOutline,
    pub scenario_text: String,
}

/// A single graded behavioral response option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BehaviorOption {
    pub label: String,
    pub action: String,
    #[serde(default)]
    pub rationale: String,
    pub trait_level: String,
}

impl BehaviorOption {
    pub fn new(
        label: impl Into<String>,
        action: impl Into<String>,
        rationale: impl Into<String>,
        trait_level: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            action: action.into(),
            rationale: rationale.into(),
            trait_level: trait_level.into(),
        }
    }
}

/// Output of the behavior adaptation stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OptionDraft {
    pub options: Vec<BehaviorOption>,
}

/// Output of the revision stage. The scenario may be left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RevisionDraft {
    #[serde(default)]
    pub scenario_text: Option<String>,
    pub options: Vec<BehaviorOption>,
}

fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) if s.trim().is_empty() => Vec::new(),
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// State accumulated by one refinement run.
///
/// Fields are filled in stage order: analysis, then outline and scenario,
/// then options, then quality. The stage functions enforce that order through
/// the `require_*` accessors, which fail with [`GenerationError::StageOrder`]
/// instead of running on a half-built record.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRecord {
    pub(crate) request: GenerationRequest,
    pub(crate) seed_cue: Option<String>,
    pub(crate) trait_analysis: Option<TraitAnalysis>,
    pub(crate) polished_anchors: Option<AnchorPair>,
    pub(crate) situation_outline: Option<SituationOutline>,
    pub(crate) scenario_text: Option<String>,
    pub(crate) options: Option<Vec<BehaviorOption>>,
    pub(crate) quality: Option<QualityMetrics>,
    pub(crate) revise_notes: Vec<Deficiency>,
    pub(crate) iteration_count: u32,
}

impl GenerationRecord {
    pub fn new(request: GenerationRequest) -> Self {
        Self {
            request,
            seed_cue: None,
            trait_analysis: None,
            polished_anchors: None,
            situation_outline: None,
            scenario_text: None,
            options: None,
            quality: None,
            revise_notes: Vec::new(),
            iteration_count: 0,
        }
    }

    /// A record that starts after trait analysis, with situation construction
    /// conditioned on a single cue. Used by the cue fan-out.
    pub fn seeded(
        request: GenerationRequest,
        analysis: TraitAnalysis,
        anchors: Option<AnchorPair>,
        cue: impl Into<String>,
    ) -> Self {
        let mut record = Self::new(request);
        record.trait_analysis = Some(analysis);
        record.polished_anchors = anchors;
        record.seed_cue = Some(cue.into());
        record
    }

    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }

    pub fn seed_cue(&self) -> Option<&str> {
        self.seed_cue.as_deref()
    }

    pub fn trait_analysis(&self) -> Option<&TraitAnalysis> {
        self.trait_analysis.as_ref()
    }

    pub fn polished_anchors(&self) -> Option<&AnchorPair> {
        self.polished_anchors.as_ref()
    }

    pub fn situation_outline(&self) -> Option<&SituationOutline> {
        self.situation_outline.as_ref()
    }

    pub fn scenario_text(&self) -> Option<&str> {
        self.scenario_text.as_deref()
    }

    pub fn options(&self) -> Option<&[BehaviorOption]> {
        self.options.as_deref()
    }

    pub fn quality(&self) -> Option<&QualityMetrics> {
        self.quality.as_ref()
    }

    pub fn revise_notes(&self) -> &[Deficiency] {
        &self.revise_notes
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub(crate) fn require_analysis(&self, stage: Stage) -> Result<&TraitAnalysis> {
        self.trait_analysis
            .as_ref()
            .ok_or(GenerationError::StageOrder {
                stage,
                missing: "trait_analysis",
            })
    }

    pub(crate) fn require_outline(&self, stage: Stage) -> Result<(&SituationOutline, &str)> {
        match (&self.situation_outline, &self.scenario_text) {
            (Some(outline), Some(text)) => Ok((outline, text.as_str())),
            _ => Err(GenerationError::StageOrder {
                stage,
                missing: "situation_outline",
            }),
        }
    }

    pub(crate) fn require_options(&self, stage: Stage) -> Result<&[BehaviorOption]> {
        self.options.as_deref().ok_or(GenerationError::StageOrder {
            stage,
            missing: "options",
        })
    }

    /// Packages a finished record. Fails if any stage output is missing.
    pub fn into_refined(self) -> Result<RefinedItem> {
        let quality = self.quality.ok_or(GenerationError::StageOrder {
            stage: Stage::BehaviorAdaptation,
            missing: "quality",
        })?;
        let trait_analysis = self.trait_analysis.ok_or(GenerationError::StageOrder {
            stage: Stage::TraitAnalysis,
            missing: "trait_analysis",
        })?;
        let (situation_outline, scenario_text) =
            match (self.situation_outline, self.scenario_text) {
                (Some(outline), Some(text)) => (outline, text),
                _ => {
                    return Err(GenerationError::StageOrder {
                        stage: Stage::SituationConstruction,
                        missing: "situation_outline",
                    })
                }
            };
        let options = self.options.ok_or(GenerationError::StageOrder {
            stage: Stage::BehaviorAdaptation,
            missing: "options",
        })?;
        let profile = self.request.profile();

        Ok(RefinedItem {
            trait_id: profile.id.clone(),
            trait_name: profile.name.clone(),
            source_item: self.request.source_item().to_string(),
            cue: self.seed_cue,
            scenario_text,
            options,
            quality,
            trait_analysis,
            situation_outline,
            iteration_count: self.iteration_count,
        })
    }
}

/// A terminal refinement result with its full provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefinedItem {
    pub trait_id: String,
    pub trait_name: String,
    pub source_item: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cue: Option<String>,
    pub scenario_text: String,
    pub options: Vec<BehaviorOption>,
    pub quality: QualityMetrics,
    pub trait_analysis: TraitAnalysis,
    pub situation_outline: SituationOutline,
    pub iteration_count: u32,
}

impl RefinedItem {
    /// Drops the shared trait analysis, keeping what one cue produced.
    pub fn into_cue_item(self, cue: impl Into<String>) -> CueItem {
        CueItem {
            situation: self.scenario_text,
            options: self.options,
            cue: cue.into(),
            situation_outline: self.situation_outline,
            quality: self.quality,
            iteration_count: self.iteration_count,
        }
    }
}
