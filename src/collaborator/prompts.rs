//! Chat rendering for the fixed stage templates.

use serde::Serialize;

use super::{GenerationCall, ResponseFormat};
use crate::model::Stage;

/// A chat message in the OpenAI wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

fn system_prompt(stage: Stage) -> &'static str {
    match stage {
        Stage::TraitAnalysis => {
            "You are a trait analysis expert. Decompose the target personality trait into \
             cognitive, affective, and behavioral components (3-6 points each), map them onto \
             observable cues, action bases, and outcome feedback, and list typical high and low \
             expressions of the trait."
        }
        Stage::AnchorPolish => {
            "You rewrite high and low trait anchors as neutral cognitive, emotional, and \
             behavioral descriptions. Remove value judgements so neither pole reads as the \
             desirable one."
        }
        Stage::CueGeneration => {
            "You are a situation designer. Propose distinct triggering circumstances (cues) in \
             which the trait becomes visible for the target population and theme. Return exactly \
             cue_count cues."
        }
        Stage::SituationConstruction => {
            "You are a situation construction expert. Build a situation outline (prototype, \
             setting, trigger, cues, constraints) that carries the required cue, then narrate it \
             as a concise scenario the respondent can picture themselves in."
        }
        Stage::BehaviorAdaptation => {
            "You are a behavior adaptation expert. Write exactly option_count response options \
             using the given labels and trait levels, spanning the full trait continuum. Tie each \
             option to the outline cues, keep each within max_option_chars characters, and never \
             signal a socially desirable answer."
        }
        Stage::Revision => {
            "You revise situational judgment items. Keep the outline's prototype and constraints, \
             fix every listed deficiency, rewrite the options and, only if needed, the scenario."
        }
    }
}

/// Renders a call into system and user messages.
pub fn render(call: &GenerationCall) -> Vec<ChatMessage> {
    let params = serde_json::to_string_pretty(&call.params).unwrap_or_default();
    let mut user = format!("Parameters:\n{params}");
    if let ResponseFormat::Json { schema } = &call.response_format {
        let schema = serde_json::to_string(schema).unwrap_or_default();
        user.push_str("\n\nRespond with a single JSON object matching this schema:\n");
        user.push_str(&schema);
    }

    vec![
        ChatMessage {
            role: "system",
            content: system_prompt(call.template_id).to_string(),
        },
        ChatMessage {
            role: "user",
            content: user,
        },
    ]
}
