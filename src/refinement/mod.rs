//! Stage functions and the refinement state machine that sequences them.

pub mod stages;
pub mod state_machine;

pub use stages::{StageRunner, StageSettings};
pub use state_machine::{
    decide_after_check, next_state, CheckDecision, RefinementMachine, RefinementState,
    MAX_REVISIONS,
};
