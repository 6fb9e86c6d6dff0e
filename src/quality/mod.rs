//! Quality gating for generated options.

pub mod gates;

pub use gates::{
    evaluate, Deficiency, GateResult, QualityGate, QualityMetrics, MIN_AVERAGE_CUE_HITS,
    MIN_DISTINCT_RATIO, MIN_LEVEL_COVERAGE,
};
