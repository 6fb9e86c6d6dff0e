//! Batch scheduler behaviour with in-process pipelines.
//!
//! These tests drive `BatchScheduler` with small hand-written pipelines so
//! completion order, failures and concurrency can be controlled exactly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};

use sjtagent::model::{ItemResult, RefinedItem};
use sjtagent::parallel::{BatchConfig, BatchRequest, BatchScheduler, ItemPipeline, TraitBatch};
use sjtagent::progress::ProgressReporter;
use sjtagent::quality::QualityMetrics;
use sjtagent::testing::fixtures;
use sjtagent::{GenerationError, GenerationRequest, Result, TraitProfile};

fn profile(id: &str) -> TraitProfile {
    TraitProfile::new(id, format!("Domain-{id}"), "low end", "high end")
}

fn request(traits: &[(&str, usize)]) -> BatchRequest {
    BatchRequest::new(
        traits
            .iter()
            .map(|(id, count)| {
                TraitBatch::new(
                    profile(id),
                    (1..=*count).map(|i| format!("{id} item {i}")).collect(),
                )
            })
            .collect(),
    )
}

fn refined(request: &GenerationRequest) -> ItemResult {
    ItemResult::Refined(RefinedItem {
        trait_id: request.trait_id().to_string(),
        trait_name: request.profile().name.clone(),
        source_item: request.source_item().to_string(),
        cue: None,
        scenario_text: format!("Scenario from {}", request.source_item()),
        options: Vec::new(),
        quality: QualityMetrics::from_values(1.0, 1.0, 1.0),
        trait_analysis: fixtures::analysis(),
        situation_outline: Default::default(),
        iteration_count: 0,
    })
}

fn item_number(request: &GenerationRequest) -> usize {
    request
        .source_item()
        .rsplit(' ')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

/// Echoes the request back, finishing later items first.
struct ReverseDelayPipeline {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ReverseDelayPipeline {
    fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ItemPipeline for ReverseDelayPipeline {
    async fn generate(&self, request: GenerationRequest) -> Result<ItemResult> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = 60u64.saturating_sub(item_number(&request) as u64 * 10);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(refined(&request))
    }
}

/// Fails the third pair immediately; every other pair sleeps, then counts
/// itself as completed.
struct FailThirdPipeline {
    completed: Arc<AtomicUsize>,
}

#[async_trait]
impl ItemPipeline for FailThirdPipeline {
    async fn generate(&self, request: GenerationRequest) -> Result<ItemResult> {
        if item_number(&request) == 3 {
            return Err(GenerationError::configuration("induced failure"));
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(refined(&request))
    }
}

#[derive(Default)]
struct RecordingProgress {
    updates: Mutex<Vec<(usize, usize, String)>>,
    finished: AtomicUsize,
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, completed: usize, total: usize, message: &str) {
        self.updates
            .lock()
            .unwrap()
            .push((completed, total, message.to_string()));
    }

    fn finish(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

fn source_items(results: &[ItemResult]) -> Vec<String> {
    results
        .iter()
        .map(|r| match r {
            ItemResult::Refined(item) => item.source_item.clone(),
            ItemResult::CueFanout(fanout) => fanout.source_item.clone(),
        })
        .collect()
}

#[tokio::test]
async fn test_every_pair_is_present_in_input_order() {
    let scheduler = BatchScheduler::new(Arc::new(ReverseDelayPipeline::new()), BatchConfig::default());
    let results = assert_ok!(scheduler.run(&request(&[("N1", 4), ("E2", 2)])).await);

    assert_eq!(results.item_count(), 6);
    assert_eq!(
        source_items(results.get("N1").unwrap()),
        vec!["N1 item 1", "N1 item 2", "N1 item 3", "N1 item 4"]
    );
    assert_eq!(
        source_items(results.get("E2").unwrap()),
        vec!["E2 item 1", "E2 item 2"]
    );
}

#[tokio::test]
async fn test_outer_concurrency_is_bounded() {
    let pipeline = Arc::new(ReverseDelayPipeline::new());
    let config = BatchConfig {
        max_concurrency: Some(2),
        ..BatchConfig::default()
    };
    let scheduler = BatchScheduler::new(pipeline.clone(), config);
    assert_ok!(scheduler.run(&request(&[("A1", 5)])).await);

    assert_eq!(pipeline.max_in_flight.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unbounded_batch_admits_every_pair() {
    let pipeline = Arc::new(ReverseDelayPipeline::new());
    let scheduler = BatchScheduler::new(pipeline.clone(), BatchConfig::default());
    assert_ok!(scheduler.run(&request(&[("A1", 3), ("A2", 2)])).await);

    assert_eq!(pipeline.max_in_flight.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_first_failure_aborts_and_cancels_the_rest() {
    let completed = Arc::new(AtomicUsize::new(0));
    let pipeline = Arc::new(FailThirdPipeline {
        completed: completed.clone(),
    });
    let progress = Arc::new(RecordingProgress::default());
    let scheduler =
        BatchScheduler::new(pipeline, BatchConfig::default()).with_progress(progress.clone());

    let started = Instant::now();
    let err = assert_err!(scheduler.run(&request(&[("C1", 5)])).await);
    assert!(started.elapsed() < Duration::from_millis(300));

    assert_eq!(err.batch_context(), Some(("C1", 2)));
    assert!(err
        .to_string()
        .starts_with("failed to generate items for trait C1 at index 2"));
    assert!(matches!(err.root_cause(), GenerationError::Configuration(_)));

    // Give cancelled tasks time to have finished had they kept running.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(completed.load(Ordering::SeqCst), 0);
    assert_eq!(progress.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_progress_is_reported_once_per_pair() {
    let progress = Arc::new(RecordingProgress::default());
    let scheduler = BatchScheduler::new(Arc::new(ReverseDelayPipeline::new()), BatchConfig::default())
        .with_progress(progress.clone());
    assert_ok!(scheduler.run(&request(&[("O1", 2), ("O2", 1)])).await);

    let updates = progress.updates.lock().unwrap().clone();
    let counts: Vec<(usize, usize)> = updates.iter().map(|(c, t, _)| (*c, *t)).collect();
    assert_eq!(counts, vec![(1, 3), (2, 3), (3, 3)]);
    assert!(updates.iter().all(|(_, _, message)| message.contains("done")));
    assert_eq!(progress.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_configuration_errors_stop_before_scheduling() {
    let completed = Arc::new(AtomicUsize::new(0));
    let scheduler = BatchScheduler::new(
        Arc::new(FailThirdPipeline {
            completed: completed.clone(),
        }),
        BatchConfig::default(),
    );

    let empty = BatchRequest::new(vec![
        TraitBatch::new(profile("N1"), vec!["fine".into()]),
        TraitBatch::new(profile("N2"), Vec::new()),
    ]);
    let err = assert_err!(scheduler.run(&empty).await);
    assert!(matches!(err, GenerationError::Configuration(_)));
    assert!(err.batch_context().is_none());

    let mut missing_anchor = profile("N3");
    missing_anchor.high_anchor = "  ".into();
    let bad_meta = BatchRequest::new(vec![TraitBatch::new(missing_anchor, vec!["x".into()])]);
    assert!(matches!(
        scheduler.run(&bad_meta).await,
        Err(GenerationError::Configuration(_))
    ));
    assert_eq!(completed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_blank_item_fails_its_pair_with_context() {
    let scheduler = BatchScheduler::new(Arc::new(ReverseDelayPipeline::new()), BatchConfig::default());
    let batch = BatchRequest::new(vec![TraitBatch::new(
        profile("E4"),
        vec!["E4 item 1".into(), "   ".into()],
    )]);
    let err = assert_err!(scheduler.run(&batch).await);
    assert_eq!(err.batch_context(), Some(("E4", 1)));
    assert!(matches!(err.root_cause(), GenerationError::Configuration(_)));
}
