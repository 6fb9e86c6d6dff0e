//! End-to-end generation against the scripted collaborator.

use std::sync::Arc;
use std::time::Duration;

use tokio_test::assert_ok;

use sjtagent::aggregate::{flatten, RunSummary};
use sjtagent::config::{GenerationMode, GeneratorConfig};
use sjtagent::model::{CueTaskResult, FinalEntry, ItemResult, OptionScheme, Stage};
use sjtagent::parallel::{BatchRequest, TraitBatch};
use sjtagent::progress::NoopProgress;
use sjtagent::refinement::MAX_REVISIONS;
use sjtagent::testing::{fixtures, ScriptedGenerator};
use sjtagent::{SjtGenerator, TraitProfile};

fn batch() -> BatchRequest {
    BatchRequest::new(vec![
        TraitBatch::new(
            TraitProfile::new("N1", "Neuroticism-Anxiety", "calm", "worried"),
            vec!["I worry about things".into(), "I get stressed easily".into()],
        ),
        TraitBatch::new(
            TraitProfile::new("C5", "Conscientiousness-Self-Discipline", "distractible", "driven"),
            vec!["I get chores done right away".into()],
        ),
    ])
}

fn generator(scripted: ScriptedGenerator, config: &GeneratorConfig) -> Arc<SjtGenerator> {
    Arc::new(SjtGenerator::new(Arc::new(scripted), config))
}

#[tokio::test]
async fn test_cue_fanout_batch_flattens_without_gaps() {
    let config = GeneratorConfig::default()
        .with_items_per_source(2)
        .with_batch_concurrency(Some(2))
        .with_cue_concurrency(3);
    let generator = generator(fixtures::happy_path(), &config);
    let results = assert_ok!(
        generator
            .batch_scheduler(&config, Arc::new(NoopProgress))
            .run(&batch())
            .await
    );

    let flat = flatten(&results);
    assert_eq!(flat.trait_count(), 2);
    let n1 = flat.get("N1").unwrap();
    assert_eq!(n1.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert_eq!(flat.get("C5").unwrap().len(), 2);
    assert!(n1
        .values()
        .all(|entry| matches!(entry, FinalEntry::Item { options, .. } if options.len() == 5)));

    let summary = RunSummary::from_results(&results);
    assert_eq!(summary.generated_items, 6);
    assert_eq!(summary.passing_items, 6);
    assert_eq!(summary.failed_cues, 0);
}

#[tokio::test]
async fn test_cue_limit_holds_across_outer_tasks() {
    let config = GeneratorConfig::default()
        .with_items_per_source(3)
        .with_cue_concurrency(2);
    let scripted = fixtures::happy_path().delay(Stage::BehaviorAdaptation, Duration::from_millis(20));
    let scripted = Arc::new(scripted);
    let generator = Arc::new(SjtGenerator::new(scripted.clone(), &config));

    assert_ok!(
        generator
            .batch_scheduler(&config, Arc::new(NoopProgress))
            .run(&batch())
            .await
    );
    assert!(scripted.max_in_flight() <= 2);
    assert_eq!(scripted.call_count(Stage::BehaviorAdaptation), 9);
}

#[tokio::test]
async fn test_failed_cue_keeps_its_slot() {
    let config = GeneratorConfig::default().with_items_per_source(3);
    let scripted = fixtures::happy_path().respond(Stage::SituationConstruction, |call| {
        match call.param_str("cue") {
            Some("cue 3") => Ok("no JSON here".to_string()),
            cue => {
                let cue = cue.unwrap_or_default();
                Ok(serde_json::json!({
                    "outline": {"cues": [cue]},
                    "scenario_text": format!("During the week, {cue}.")
                })
                .to_string())
            }
        }
    });
    let generator = generator(scripted, &config);
    let results = assert_ok!(
        generator
            .batch_scheduler(&config, Arc::new(NoopProgress))
            .run(&batch())
            .await
    );

    let first = match &results.get("N1").unwrap()[0] {
        ItemResult::CueFanout(fanout) => fanout,
        other => panic!("unexpected result {other:?}"),
    };
    assert!(first.items[0].is_success());
    assert!(matches!(&first.items[2], CueTaskResult::Failed { cue, .. } if cue == "cue 3"));

    let n1 = flatten(&results).get("N1").unwrap().clone();
    assert_eq!(n1.len(), 6);
    assert!(matches!(&n1[&3], FinalEntry::Failed { .. }));
    assert!(matches!(&n1[&6], FinalEntry::Failed { .. }));
}

#[tokio::test]
async fn test_single_item_mode_refines_each_source_once() {
    let config = GeneratorConfig::default()
        .with_mode(GenerationMode::SingleItem)
        .with_option_scheme(OptionScheme::FourLevel);
    let scripted = Arc::new(fixtures::happy_path());
    let generator = Arc::new(SjtGenerator::new(scripted.clone(), &config));
    let results = assert_ok!(
        generator
            .batch_scheduler(&config, Arc::new(NoopProgress))
            .run(&batch())
            .await
    );

    assert_eq!(results.item_count(), 3);
    assert_eq!(scripted.call_count(Stage::CueGeneration), 0);
    assert_eq!(scripted.call_count(Stage::TraitAnalysis), 3);
    for item in results.get("N1").unwrap() {
        match item {
            ItemResult::Refined(refined) => {
                assert_eq!(refined.options.len(), 4);
                assert!(refined.quality.pass);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_never_passing_items_are_returned_after_bounded_revisions() {
    let config = GeneratorConfig::default().with_items_per_source(1);
    let scripted = Arc::new(fixtures::never_passing());
    let generator = Arc::new(SjtGenerator::new(scripted.clone(), &config));
    let results = assert_ok!(
        generator
            .batch_scheduler(&config, Arc::new(NoopProgress))
            .run(&batch())
            .await
    );

    let summary = RunSummary::from_results(&results);
    assert_eq!(summary.generated_items, 3);
    assert_eq!(summary.passing_items, 0);
    assert_eq!(summary.mean_iterations, f64::from(MAX_REVISIONS));
    assert_eq!(scripted.call_count(Stage::Revision), 3 * MAX_REVISIONS as usize);
}
