//! Quality gate checking for generated behavioral options.
//!
//! The gate scores an option list on three objective metrics: how distinct
//! the options are, how many trait levels they cover, and how tightly they
//! reference the situation's cues. Evaluation is a pure function of its
//! inputs, so re-running it on the same options always gives the same result.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{BehaviorOption, OptionScheme};

/// Minimum share of options with a distinct (action, rationale) pair.
pub const MIN_DISTINCT_RATIO: f64 = 0.9;
/// Minimum share of the scheme's trait levels the options must cover.
pub const MIN_LEVEL_COVERAGE: f64 = 0.67;
/// Minimum mean number of required cues mentioned per option.
pub const MIN_AVERAGE_CUE_HITS: f64 = 1.0;

/// A quality shortfall, worded for the revision stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deficiency {
    InsufficientDistinctness,
    MissingLevelCoverage,
    InsufficientCueCoupling,
}

impl Deficiency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Deficiency::InsufficientDistinctness => "insufficient distinctness",
            Deficiency::MissingLevelCoverage => "missing level coverage",
            Deficiency::InsufficientCueCoupling => "insufficient cue coupling",
        }
    }
}

impl fmt::Display for Deficiency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics computed by the gate, plus the overall verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub distinct_ratio: f64,
    pub level_coverage: f64,
    pub average_cue_hits: f64,
    pub pass: bool,
}

impl QualityMetrics {
    /// Builds metrics from raw values, deriving `pass` from the fixed thresholds.
    pub fn from_values(distinct_ratio: f64, level_coverage: f64, average_cue_hits: f64) -> Self {
        let pass = distinct_ratio >= MIN_DISTINCT_RATIO
            && level_coverage >= MIN_LEVEL_COVERAGE
            && average_cue_hits >= MIN_AVERAGE_CUE_HITS;
        Self {
            distinct_ratio,
            level_coverage,
            average_cue_hits,
            pass,
        }
    }

    /// One result per metric, in a fixed order.
    pub fn gate_results(&self) -> [GateResult; 3] {
        [
            GateResult::new(
                "distinctness",
                self.distinct_ratio,
                MIN_DISTINCT_RATIO,
                Deficiency::InsufficientDistinctness,
            ),
            GateResult::new(
                "level_coverage",
                self.level_coverage,
                MIN_LEVEL_COVERAGE,
                Deficiency::MissingLevelCoverage,
            ),
            GateResult::new(
                "cue_coupling",
                self.average_cue_hits,
                MIN_AVERAGE_CUE_HITS,
                Deficiency::InsufficientCueCoupling,
            ),
        ]
    }

    /// Ordered, deduplicated deficiency tags. Empty when the gate passes.
    pub fn deficiencies(&self) -> Vec<Deficiency> {
        self.gate_results()
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.deficiency)
            .collect()
    }

    /// Get a summary of the per-metric results.
    pub fn summary(&self) -> String {
        let results = self.gate_results();
        let passed = results.iter().filter(|r| r.passed).count();
        let total = results.len();
        let failed: Vec<&str> = results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.gate_name)
            .collect();

        if failed.is_empty() {
            format!("All {total} checks passed")
        } else {
            format!(
                "{passed}/{total} checks passed. Failed: {}",
                failed.join(", ")
            )
        }
    }
}

/// The outcome of one metric against its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GateResult {
    /// Name of the metric check
    pub gate_name: &'static str,
    /// Whether the metric met its threshold
    pub passed: bool,
    /// Measured value
    pub value: f64,
    /// Threshold the value was compared against
    pub threshold: f64,
    /// Tag reported when the check fails
    pub deficiency: Deficiency,
}

impl GateResult {
    fn new(gate_name: &'static str, value: f64, threshold: f64, deficiency: Deficiency) -> Self {
        Self {
            gate_name,
            passed: value >= threshold,
            value,
            threshold,
            deficiency,
        }
    }
}

/// Scores option lists against the levels of one option scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QualityGate {
    scheme: OptionScheme,
}

impl QualityGate {
    pub fn new(scheme: OptionScheme) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> OptionScheme {
        self.scheme
    }

    /// Evaluate `options` against the cues the situation requires.
    ///
    /// # Arguments
    ///
    /// * `options` - The behavioral options to score
    /// * `required_cues` - Cues from the situation outline; blanks are ignored
    pub fn evaluate(&self, options: &[BehaviorOption], required_cues: &[String]) -> QualityMetrics {
        QualityMetrics::from_values(
            distinct_ratio(options),
            level_coverage(options, self.scheme.levels()),
            average_cue_hits(options, required_cues),
        )
    }
}

/// Evaluates options with the five-option (high/mid/low) level target.
pub fn evaluate(options: &[BehaviorOption], required_cues: &[String]) -> QualityMetrics {
    QualityGate::default().evaluate(options, required_cues)
}

fn distinct_ratio(options: &[BehaviorOption]) -> f64 {
    if options.is_empty() {
        return 0.0;
    }
    let unique: HashSet<(&str, &str)> = options
        .iter()
        .map(|o| (o.action.as_str(), o.rationale.as_str()))
        .collect();
    unique.len() as f64 / options.len() as f64
}

fn level_coverage(options: &[BehaviorOption], target: &[&str]) -> f64 {
    if target.is_empty() {
        return 0.0;
    }
    let levels: HashSet<String> = options
        .iter()
        .map(|o| o.trait_level.trim().to_lowercase())
        .collect();
    let covered = target.iter().filter(|t| levels.contains(**t)).count();
    covered as f64 / target.len() as f64
}

fn average_cue_hits(options: &[BehaviorOption], required_cues: &[String]) -> f64 {
    if options.is_empty() {
        return 0.0;
    }
    let cues: HashSet<&str> = required_cues
        .iter()
        .map(String::as_str)
        .filter(|c| !c.is_empty())
        .collect();
    let hits: usize = options
        .iter()
        .map(|o| {
            let serialized = serde_json::to_string(o).unwrap_or_default();
            cues.iter().filter(|c| serialized.contains(**c)).count()
        })
        .sum();
    hits as f64 / options.len() as f64
}
