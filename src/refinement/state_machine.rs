//! Quality-gated refinement state machine.
//!
//! ```text
//! Init -> Analyzed -> Constructed -> Adapted -> Checked -+-> Terminal
//!                                       ^                |
//!                                       +--- Revised <---+
//! ```
//!
//! The machine leaves `Checked` for `Revised` only while the gate fails and
//! fewer than [`MAX_REVISIONS`] revisions have run, so it always terminates.
//! A terminal record that still fails the gate is a normal outcome.

use std::fmt;

use tracing::{debug, info};

use super::stages::StageRunner;
use crate::error::Result;
use crate::model::{GenerationRecord, RefinedItem};
use crate::quality::QualityMetrics;

/// Upper bound on revision rounds per run.
pub const MAX_REVISIONS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefinementState {
    Init,
    Analyzed,
    Constructed,
    Adapted,
    Checked,
    Revised,
    Terminal,
}

impl fmt::Display for RefinementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefinementState::Init => "init",
            RefinementState::Analyzed => "analyzed",
            RefinementState::Constructed => "constructed",
            RefinementState::Adapted => "adapted",
            RefinementState::Checked => "checked",
            RefinementState::Revised => "revised",
            RefinementState::Terminal => "terminal",
        };
        f.write_str(name)
    }
}

/// What to do after a quality check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckDecision {
    Revise,
    Stop,
}

/// Stop once the revision bound is reached, otherwise revise until the gate passes.
pub fn decide_after_check(iteration_count: u32, quality: &QualityMetrics) -> CheckDecision {
    if iteration_count >= MAX_REVISIONS {
        CheckDecision::Stop
    } else if !quality.pass {
        CheckDecision::Revise
    } else {
        CheckDecision::Stop
    }
}

/// The state that follows `state`, given the record after `state`'s work ran.
pub fn next_state(state: RefinementState, record: &GenerationRecord) -> RefinementState {
    match state {
        RefinementState::Init => RefinementState::Analyzed,
        RefinementState::Analyzed => RefinementState::Constructed,
        RefinementState::Constructed => RefinementState::Adapted,
        RefinementState::Adapted => RefinementState::Checked,
        RefinementState::Checked => match record.quality() {
            Some(quality) => match decide_after_check(record.iteration_count(), quality) {
                CheckDecision::Revise => RefinementState::Revised,
                CheckDecision::Stop => RefinementState::Terminal,
            },
            None => RefinementState::Terminal,
        },
        RefinementState::Revised => RefinementState::Adapted,
        RefinementState::Terminal => RefinementState::Terminal,
    }
}

/// Drives one generation record through the stages.
pub struct RefinementMachine<'a> {
    stages: &'a StageRunner,
}

impl<'a> RefinementMachine<'a> {
    pub fn new(stages: &'a StageRunner) -> Self {
        Self { stages }
    }

    /// Runs a fresh record from `Init`.
    pub async fn run(&self, record: GenerationRecord) -> Result<RefinedItem> {
        self.run_from(RefinementState::Init, record).await
    }

    /// Runs a record that already carries its trait analysis from `Analyzed`.
    pub async fn run_seeded(&self, record: GenerationRecord) -> Result<RefinedItem> {
        self.run_from(RefinementState::Analyzed, record).await
    }

    async fn run_from(
        &self,
        mut state: RefinementState,
        mut record: GenerationRecord,
    ) -> Result<RefinedItem> {
        while state != RefinementState::Terminal {
            record = self.leave(state, record).await?;
            let next = next_state(state, &record);
            debug!(
                trait_id = record.request().trait_id(),
                from = %state,
                to = %next,
                "Refinement transition"
            );
            state = next;
        }

        if let Some(quality) = record.quality() {
            info!(
                trait_id = record.request().trait_id(),
                iterations = record.iteration_count(),
                pass = quality.pass,
                "Refinement finished"
            );
        }
        record.into_refined()
    }

    /// Performs the work attached to leaving `state`.
    async fn leave(
        &self,
        state: RefinementState,
        record: GenerationRecord,
    ) -> Result<GenerationRecord> {
        match state {
            RefinementState::Init => self.stages.analyze_trait(record).await,
            RefinementState::Analyzed => self.stages.construct_situation(record).await,
            RefinementState::Constructed => self.stages.adapt_behavior(record).await,
            RefinementState::Adapted => self.stages.check_quality(record),
            RefinementState::Revised => self.stages.revise(record).await,
            RefinementState::Checked | RefinementState::Terminal => Ok(record),
        }
    }
}
