//! Reshaping batch output for consumers.
//!
//! The flat collection numbers every generated entry of a trait from 1, in
//! source item order and then cue order. The detailed report keeps the nested
//! structure together with run metadata for auditing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{GenerationMode, GeneratorConfig};
use crate::model::{
    BatchResults, CueTaskResult, FinalItemCollection, ItemResult, OptionScheme,
};

/// Generates a run id from the current time and process id.
pub fn generate_run_id() -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("run-{}-{}", millis, std::process::id())
}

/// Counts over a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub traits: usize,
    pub source_items: usize,
    pub generated_items: usize,
    pub failed_cues: usize,
    /// Generated items whose final quality check passed.
    pub passing_items: usize,
    /// Mean revision count over generated items, 0 when there are none.
    pub mean_iterations: f64,
}

impl RunSummary {
    pub fn from_results(results: &BatchResults) -> Self {
        let mut summary = RunSummary {
            traits: results.traits.len(),
            source_items: results.item_count(),
            ..RunSummary::default()
        };
        let mut iterations = 0u64;

        let mut tally = |pass: bool, iteration_count: u32| {
            summary.generated_items += 1;
            if pass {
                summary.passing_items += 1;
            }
            iterations += u64::from(iteration_count);
        };
        let mut failed = 0;
        for item in results.traits.iter().flat_map(|t| t.items.iter()) {
            match item {
                ItemResult::CueFanout(fanout) => {
                    for cue in &fanout.items {
                        match cue {
                            CueTaskResult::Generated(generated) => {
                                tally(generated.quality.pass, generated.iteration_count)
                            }
                            CueTaskResult::Failed { .. } => failed += 1,
                        }
                    }
                }
                ItemResult::Refined(refined) => tally(refined.quality.pass, refined.iteration_count),
            }
        }

        summary.failed_cues = failed;
        if summary.generated_items > 0 {
            summary.mean_iterations = iterations as f64 / summary.generated_items as f64;
        }
        summary
    }

    /// Share of generated items that passed, 0 when nothing was generated.
    pub fn pass_rate(&self) -> f64 {
        if self.generated_items == 0 {
            0.0
        } else {
            self.passing_items as f64 / self.generated_items as f64
        }
    }
}

/// The nested artifact, with run metadata.
#[derive(Debug, Clone, Serialize)]
pub struct DetailedReport<'a> {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub model: String,
    pub option_scheme: OptionScheme,
    pub mode: GenerationMode,
    pub summary: RunSummary,
    pub results: &'a BatchResults,
}

/// Builds the flat and detailed views of a batch.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    run_id: String,
    model: String,
    option_scheme: OptionScheme,
    mode: GenerationMode,
}

impl ResultAggregator {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            run_id: generate_run_id(),
            model: config.model.clone(),
            option_scheme: config.option_scheme,
            mode: config.mode,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn flatten(&self, results: &BatchResults) -> FinalItemCollection {
        flatten(results)
    }

    pub fn detailed<'a>(&self, results: &'a BatchResults) -> DetailedReport<'a> {
        DetailedReport {
            run_id: self.run_id.clone(),
            generated_at: Utc::now(),
            model: self.model.clone(),
            option_scheme: self.option_scheme,
            mode: self.mode,
            summary: RunSummary::from_results(results),
            results,
        }
    }
}

/// Flattens `results` into per-trait `{1..N -> entry}` maps.
///
/// Failed cues keep their slot, so numbering depends only on input positions.
pub fn flatten(results: &BatchResults) -> FinalItemCollection {
    let traits = results
        .traits
        .iter()
        .map(|t| {
            let entries: BTreeMap<_, _> = t
                .items
                .iter()
                .flat_map(ItemResult::final_entries)
                .enumerate()
                .map(|(i, entry)| (i + 1, entry))
                .collect();
            (t.trait_id.clone(), entries)
        })
        .collect();
    FinalItemCollection { traits }
}
