//! Shared data model for SJT generation.
//!
//! Requests and trait profiles live here. The per-run generation record and
//! the stage output shapes are in [`record`]. Scheduler outputs and the final
//! indexed collection are in [`results`].

pub mod record;
pub mod results;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, Result};

pub use record::{
    AnchorPair, BehaviorOption, CueList, EvidenceGlossary, EvidenceMapping, GenerationRecord,
    OptionDraft, PoleDescription, RefinedItem, RevisionDraft, SituationDraft, SituationOutline,
    TraitAnalysis, TraitComponents,
};
pub use results::{
    BatchProgress, BatchResults, CueFanoutResult, CueItem, CueTaskResult, FinalEntry,
    FinalItemCollection, ItemResult, TraitResults,
};

/// One collaborator round trip in the pipeline. Doubles as the template id
/// passed to the text-generation collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    TraitAnalysis,
    AnchorPolish,
    CueGeneration,
    SituationConstruction,
    BehaviorAdaptation,
    Revision,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::TraitAnalysis => "trait_analysis",
            Stage::AnchorPolish => "anchor_polish",
            Stage::CueGeneration => "cue_generation",
            Stage::SituationConstruction => "situation_construction",
            Stage::BehaviorAdaptation => "behavior_adaptation",
            Stage::Revision => "revision",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Graded option scheme used for a run. The two schemes are mutually
/// exclusive: every option in a run carries a level from the same scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionScheme {
    /// Five options A-E spanning high/mid/low.
    #[default]
    FiveOption,
    /// Four options A-D graded lowest/low/high/highest.
    FourLevel,
}

impl OptionScheme {
    pub fn option_count(&self) -> usize {
        self.labels().len()
    }

    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            OptionScheme::FiveOption => &["A", "B", "C", "D", "E"],
            OptionScheme::FourLevel => &["A", "B", "C", "D"],
        }
    }

    /// Trait levels an option list must cover under this scheme.
    pub fn levels(&self) -> &'static [&'static str] {
        match self {
            OptionScheme::FiveOption => &["high", "mid", "low"],
            OptionScheme::FourLevel => &["lowest", "low", "high", "highest"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionScheme::FiveOption => "five_option",
            OptionScheme::FourLevel => "four_level",
        }
    }
}

/// Descriptive metadata for one trait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitProfile {
    /// Short identifier, e.g. `N1`.
    pub id: String,
    /// Human-readable name, e.g. `Neuroticism-Anxiety`.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// What a low scorer looks like.
    pub low_anchor: String,
    /// What a high scorer looks like.
    pub high_anchor: String,
}

impl TraitProfile {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        low_anchor: impl Into<String>,
        high_anchor: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            low_anchor: low_anchor.into(),
            high_anchor: high_anchor.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Rejects profiles missing the metadata every stage relies on.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(GenerationError::configuration("trait id is empty"));
        }
        if self.name.trim().is_empty() {
            return Err(GenerationError::configuration(format!(
                "trait {} has no name",
                self.id
            )));
        }
        if self.low_anchor.trim().is_empty() || self.high_anchor.trim().is_empty() {
            return Err(GenerationError::configuration(format!(
                "trait {} is missing a low or high anchor description",
                self.id
            )));
        }
        Ok(())
    }
}

/// An immutable request to generate items from one source self-report item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    profile: TraitProfile,
    source_item: String,
    item_count: usize,
}

impl GenerationRequest {
    /// Validates and builds a request. `item_count` is the number of cues
    /// (and therefore items) requested for the source item.
    pub fn new(
        profile: TraitProfile,
        source_item: impl Into<String>,
        item_count: usize,
    ) -> Result<Self> {
        profile.validate()?;
        let source_item = source_item.into();
        if source_item.trim().is_empty() {
            return Err(GenerationError::configuration(format!(
                "source item text for trait {} is blank",
                profile.id
            )));
        }
        if item_count == 0 {
            return Err(GenerationError::configuration(
                "requested item count must be at least 1",
            ));
        }
        Ok(Self {
            profile,
            source_item,
            item_count,
        })
    }

    pub fn profile(&self) -> &TraitProfile {
        &self.profile
    }

    pub fn trait_id(&self) -> &str {
        &self.profile.id
    }

    pub fn source_item(&self) -> &str {
        &self.source_item
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> TraitProfile {
        TraitProfile::new(
            "N1",
            "Neuroticism-Anxiety",
            "calm and relaxed",
            "worried and tense",
        )
    }

    #[test]
    fn test_scheme_counts_match_labels() {
        assert_eq!(OptionScheme::FiveOption.option_count(), 5);
        assert_eq!(OptionScheme::FourLevel.option_count(), 4);
        assert_eq!(OptionScheme::default(), OptionScheme::FiveOption);
    }

    #[test]
    fn test_scheme_serializes_snake_case() {
        let json = serde_json::to_string(&OptionScheme::FourLevel).unwrap();
        assert_eq!(json, "\"four_level\"");
    }

    #[test]
    fn test_stage_display_is_template_id() {
        assert_eq!(Stage::SituationConstruction.to_string(), "situation_construction");
        assert_eq!(
            serde_json::to_string(&Stage::BehaviorAdaptation).unwrap(),
            "\"behavior_adaptation\""
        );
    }

    #[test]
    fn test_request_rejects_blank_source_item() {
        let err = GenerationRequest::new(profile(), "   ", 3).unwrap_err();
        assert!(matches!(err, GenerationError::Configuration(_)));
    }

    #[test]
    fn test_request_rejects_zero_item_count() {
        assert!(GenerationRequest::new(profile(), "I worry a lot", 0).is_err());
    }

    #[test]
    fn test_request_rejects_missing_anchor() {
        let mut p = profile();
        p.high_anchor.clear();
        let err = GenerationRequest::new(p, "I worry a lot", 1).unwrap_err();
        assert!(err.to_string().contains("anchor"));
    }

    #[test]
    fn test_request_accessors() {
        let req = GenerationRequest::new(profile(), "I worry a lot", 2).unwrap();
        assert_eq!(req.trait_id(), "N1");
        assert_eq!(req.source_item(), "I worry a lot");
        assert_eq!(req.item_count(), 2);
    }
}
