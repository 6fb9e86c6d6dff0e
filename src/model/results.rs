//! Scheduler outputs and the final indexed item collection.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::{AnchorPair, BehaviorOption, RefinedItem, SituationOutline, TraitAnalysis};
use crate::quality::QualityMetrics;

/// A successfully generated item for one cue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CueItem {
    pub situation: String,
    pub options: Vec<BehaviorOption>,
    pub cue: String,
    pub situation_outline: SituationOutline,
    pub quality: QualityMetrics,
    pub iteration_count: u32,
}

/// Outcome of one cue pipeline: a generated item or the error that stopped it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CueTaskResult {
    Generated(CueItem),
    Failed { error: String, cue: String },
}

impl CueTaskResult {
    pub fn failed(error: impl Into<String>, cue: impl Into<String>) -> Self {
        CueTaskResult::Failed {
            error: error.into(),
            cue: cue.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CueTaskResult::Generated(_))
    }

    /// The cue this result originated from.
    pub fn cue(&self) -> &str {
        match self {
            CueTaskResult::Generated(item) => &item.cue,
            CueTaskResult::Failed { cue, .. } => cue,
        }
    }

    pub fn to_final_entry(&self) -> FinalEntry {
        match self {
            CueTaskResult::Generated(item) => FinalEntry::Item {
                situation: item.situation.clone(),
                options: item.options.clone(),
            },
            CueTaskResult::Failed { error, cue } => FinalEntry::Failed {
                error: error.clone(),
                cue: cue.clone(),
            },
        }
    }
}

/// Everything one source item expanded into under cue fan-out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CueFanoutResult {
    pub source_item: String,
    pub trait_analysis: TraitAnalysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polished_anchors: Option<AnchorPair>,
    pub cues: Vec<String>,
    /// One entry per cue, in cue order.
    pub items: Vec<CueTaskResult>,
}

impl CueFanoutResult {
    pub fn success_count(&self) -> usize {
        self.items.iter().filter(|r| r.is_success()).count()
    }
}

/// Result of one (trait, source item) task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ItemResult {
    CueFanout(CueFanoutResult),
    Refined(RefinedItem),
}

impl ItemResult {
    /// The flat entries this result contributes to the final collection.
    pub fn final_entries(&self) -> Vec<FinalEntry> {
        match self {
            ItemResult::CueFanout(fanout) => {
                fanout.items.iter().map(CueTaskResult::to_final_entry).collect()
            }
            ItemResult::Refined(item) => vec![FinalEntry::Item {
                situation: item.scenario_text.clone(),
                options: item.options.clone(),
            }],
        }
    }
}

/// Per-trait results, ordered by source item index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraitResults {
    pub trait_id: String,
    pub items: Vec<ItemResult>,
}

/// Output of a batch run: trait to ordered per-item results, in the order the
/// traits were requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResults {
    pub traits: Vec<TraitResults>,
}

impl BatchResults {
    pub fn get(&self, trait_id: &str) -> Option<&[ItemResult]> {
        self.traits
            .iter()
            .find(|t| t.trait_id == trait_id)
            .map(|t| t.items.as_slice())
    }

    /// Total number of (trait, item) results held.
    pub fn item_count(&self) -> usize {
        self.traits.iter().map(|t| t.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }
}

impl Serialize for BatchResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.traits.len()))?;
        for t in &self.traits {
            map.serialize_entry(&t.trait_id, &t.items)?;
        }
        map.end()
    }
}

/// Progress counters for a batch. Only the scheduler mutates this.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub completed_count: usize,
    pub total_count: usize,
    pub last_detail_message: String,
}

impl BatchProgress {
    pub fn new(total_count: usize) -> Self {
        Self {
            completed_count: 0,
            total_count,
            last_detail_message: String::new(),
        }
    }

    pub(crate) fn record_completion(&mut self, message: impl Into<String>) {
        self.completed_count += 1;
        self.last_detail_message = message.into();
    }

    pub fn is_complete(&self) -> bool {
        self.completed_count >= self.total_count
    }
}

/// One flat entry of the final collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FinalEntry {
    Item {
        situation: String,
        options: Vec<BehaviorOption>,
    },
    Failed {
        error: String,
        cue: String,
    },
}

/// Trait to `{1..N -> entry}`, in trait request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalItemCollection {
    pub traits: Vec<(String, BTreeMap<usize, FinalEntry>)>,
}

impl FinalItemCollection {
    pub fn get(&self, trait_id: &str) -> Option<&BTreeMap<usize, FinalEntry>> {
        self.traits
            .iter()
            .find(|(id, _)| id == trait_id)
            .map(|(_, entries)| entries)
    }

    pub fn trait_count(&self) -> usize {
        self.traits.len()
    }

    /// Entries across every trait.
    pub fn entry_count(&self) -> usize {
        self.traits.iter().map(|(_, entries)| entries.len()).sum()
    }
}

impl Serialize for FinalItemCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.traits.len()))?;
        for (trait_id, entries) in &self.traits {
            map.serialize_entry(trait_id, entries)?;
        }
        map.end()
    }
}
