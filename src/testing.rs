//! Deterministic collaborator doubles.
//!
//! [`ScriptedGenerator`] answers each stage from a per-stage responder, can
//! delay calls per stage or per cue, records every call, and tracks how many
//! item-level calls were in flight at once. Used by the unit and integration
//! tests and handy for offline demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::collaborator::{GenerationCall, TextGenerator};
use crate::error::CollaboratorError;
use crate::model::Stage;

type Responder = Arc<dyn Fn(&GenerationCall) -> Result<String, CollaboratorError> + Send + Sync>;

/// Stages that run inside a cue pipeline, and so count towards in-flight.
fn is_item_stage(stage: Stage) -> bool {
    matches!(
        stage,
        Stage::SituationConstruction | Stage::BehaviorAdaptation | Stage::Revision
    )
}

#[derive(Default)]
struct Counters {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    completed: AtomicUsize,
}

/// Decrements the in-flight count even when the call future is dropped.
struct InFlightGuard<'a> {
    counters: &'a Counters,
    tracked: bool,
}

impl<'a> InFlightGuard<'a> {
    fn enter(counters: &'a Counters, tracked: bool) -> Self {
        if tracked {
            let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
        }
        Self { counters, tracked }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.tracked {
            self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// A collaborator that answers from scripted responders.
#[derive(Default)]
pub struct ScriptedGenerator {
    responders: HashMap<Stage, Responder>,
    stage_delays: HashMap<Stage, Duration>,
    cue_delays: HashMap<String, Duration>,
    calls: Mutex<Vec<GenerationCall>>,
    counters: Counters,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the responder for `stage`, replacing any previous one.
    pub fn respond<F>(mut self, stage: Stage, responder: F) -> Self
    where
        F: Fn(&GenerationCall) -> Result<String, CollaboratorError> + Send + Sync + 'static,
    {
        self.responders.insert(stage, Arc::new(responder));
        self
    }

    /// Delays every call for `stage`.
    pub fn delay(mut self, stage: Stage, delay: Duration) -> Self {
        self.stage_delays.insert(stage, delay);
        self
    }

    /// Delays calls whose `cue` parameter equals `cue`.
    pub fn delay_cue(mut self, cue: impl Into<String>, delay: Duration) -> Self {
        self.cue_delays.insert(cue.into(), delay);
        self
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<GenerationCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, stage: Stage) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.template_id == stage)
            .count()
    }

    /// Highest number of concurrent item-level calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    /// Calls that ran to completion, as opposed to being dropped mid-flight.
    pub fn completed_calls(&self) -> usize {
        self.counters.completed.load(Ordering::SeqCst)
    }

    fn delay_for(&self, call: &GenerationCall) -> Duration {
        let stage = self
            .stage_delays
            .get(&call.template_id)
            .copied()
            .unwrap_or_default();
        let cue = call
            .param_str("cue")
            .and_then(|cue| self.cue_delays.get(cue))
            .copied()
            .unwrap_or_default();
        stage + cue
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn invoke(&self, call: &GenerationCall) -> Result<String, CollaboratorError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call.clone());
        }
        let _guard = InFlightGuard::enter(&self.counters, is_item_stage(call.template_id));

        let delay = self.delay_for(call);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let responder = self.responders.get(&call.template_id).ok_or_else(|| {
            CollaboratorError::Backend(format!("no scripted response for {}", call.template_id))
        })?;
        let reply = responder(call);
        self.counters.completed.fetch_add(1, Ordering::SeqCst);
        reply
    }
}

/// Canned responses forming a complete, quality-passing pipeline.
pub mod fixtures {
    use serde_json::{json, Value};

    use super::ScriptedGenerator;
    use crate::collaborator::GenerationCall;
    use crate::model::{OptionScheme, Stage, TraitAnalysis};

    pub fn analysis_json() -> Value {
        json!({
            "components": {
                "cognitive": ["expects things to go wrong"],
                "affective": ["tension before deadlines"],
                "behavioral": ["double-checks work"]
            },
            "mapping": {
                "observable_cues": ["an unexpected change", "ambiguous feedback"],
                "action_bases": ["seeking reassurance"],
                "outcome_feedback": ["relief or lingering worry"]
            },
            "evidence_glossary": {"high": ["frets"], "low": ["shrugs off"]}
        })
    }

    pub fn analysis() -> TraitAnalysis {
        serde_json::from_value(analysis_json()).unwrap_or_else(|e| panic!("bad fixture: {e}"))
    }

    fn levels(scheme: OptionScheme) -> &'static [&'static str] {
        match scheme {
            OptionScheme::FiveOption => &["high", "high", "mid", "low", "low"],
            OptionScheme::FourLevel => &["highest", "high", "low", "lowest"],
        }
    }

    /// Distinct options whose actions all start with `lead`.
    pub fn options_json(lead: &str, scheme: OptionScheme) -> Value {
        let options: Vec<Value> = scheme
            .labels()
            .iter()
            .zip(levels(scheme))
            .map(|(label, level)| {
                json!({
                    "label": label,
                    "action": format!("{lead} approach {label}"),
                    "rationale": format!("reasoning {label}"),
                    "trait_level": level,
                })
            })
            .collect();
        Value::Array(options)
    }

    fn scheme_of(call: &GenerationCall) -> OptionScheme {
        match call.params.get("option_count").and_then(Value::as_u64) {
            Some(4) => OptionScheme::FourLevel,
            _ => OptionScheme::FiveOption,
        }
    }

    fn first_outline_cue(call: &GenerationCall) -> String {
        call.params
            .get("outline")
            .and_then(|o| o.get("cues"))
            .and_then(|c| c.get(0))
            .and_then(Value::as_str)
            .unwrap_or("the situation")
            .to_string()
    }

    /// A generator whose every stage succeeds and whose options pass the gate.
    pub fn happy_path() -> ScriptedGenerator {
        ScriptedGenerator::new()
            .respond(Stage::TraitAnalysis, |_| Ok(analysis_json().to_string()))
            .respond(Stage::AnchorPolish, |_| {
                Ok(json!({
                    "high_score": {"cognitive": "anticipates risks", "emotional": "feels tense", "behavioral": "prepares extensively"},
                    "low_score": {"cognitive": "expects things to work out", "emotional": "feels settled", "behavioral": "prepares lightly"}
                })
                .to_string())
            })
            .respond(Stage::CueGeneration, |call| {
                let count = call
                    .params
                    .get("cue_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(1);
                let cues: Vec<String> = (1..=count).map(|i| format!("cue {i}")).collect();
                Ok(json!({ "cues": cues }).to_string())
            })
            .respond(Stage::SituationConstruction, |call| {
                let cue = call.param_str("cue").unwrap_or("a deadline moves up");
                // Wrapped in prose to exercise the decode fallback.
                Ok(format!(
                    "Here is the situation:\n{}",
                    json!({
                        "outline": {
                            "prototype": "time pressure",
                            "setting": "open-plan office",
                            "trigger": cue,
                            "cues": [cue],
                            "constraints": "the client call is in an hour"
                        },
                        "scenario_text": format!("At work, {cue}. Your manager is away.")
                    })
                ))
            })
            .respond(Stage::BehaviorAdaptation, |call| {
                let lead = format!("Given {},", first_outline_cue(call));
                Ok(json!({ "options": options_json(&lead, scheme_of(call)) }).to_string())
            })
            .respond(Stage::Revision, |call| {
                let lead = format!("Revised for {},", first_outline_cue(call));
                Ok(json!({ "options": options_json(&lead, scheme_of(call)) }).to_string())
            })
    }

    /// Like [`happy_path`], but options never mention a cue, so the gate
    /// always fails on cue coupling.
    pub fn never_passing() -> ScriptedGenerator {
        happy_path()
            .respond(Stage::BehaviorAdaptation, |call| {
                Ok(json!({ "options": options_json("Carry on", scheme_of(call)) }).to_string())
            })
            .respond(Stage::Revision, |call| {
                Ok(json!({ "options": options_json("Still carry on", scheme_of(call)) }).to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::ResponseFormat;

    #[tokio::test]
    async fn test_records_calls_and_completions() {
        let generator = fixtures::happy_path();
        let call = GenerationCall::new(Stage::CueGeneration, "m", ResponseFormat::Text)
            .param("cue_count", 2);
        let reply = generator.invoke(&call).await.unwrap();
        assert!(reply.contains("cue 2"));
        assert_eq!(generator.call_count(Stage::CueGeneration), 1);
        assert_eq!(generator.completed_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_responder_is_backend_error() {
        let generator = ScriptedGenerator::new();
        let call = GenerationCall::new(Stage::Revision, "m", ResponseFormat::Text);
        assert!(matches!(
            generator.invoke(&call).await,
            Err(CollaboratorError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_dropped_call_releases_in_flight() {
        let generator = ScriptedGenerator::new()
            .respond(Stage::Revision, |_| Ok("{}".to_string()))
            .delay(Stage::Revision, Duration::from_secs(10));
        let call = GenerationCall::new(Stage::Revision, "m", ResponseFormat::Text);
        let result = tokio::time::timeout(Duration::from_millis(10), generator.invoke(&call)).await;
        assert!(result.is_err());
        assert_eq!(generator.max_in_flight(), 1);
        assert_eq!(generator.counters.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(generator.completed_calls(), 0);
    }
}
