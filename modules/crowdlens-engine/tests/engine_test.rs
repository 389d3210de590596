//! End-to-end engine tests: submit a job, observe its stream, assert the
//! terminal state. Evaluators are scripted doubles, no network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};

use crowdlens_common::{
    AnalysisDepth, Article, Evaluation, JobSnapshot, JobStatus, Persona, Sentiment,
    SimulationConfig, StatusEvent, StatusEventKind,
};
use crowdlens_engine::{JobRegistry, PersonaEvaluator};

// ---------------------------------------------------------------------------
// Scripted evaluators
// ---------------------------------------------------------------------------

fn scripted_evaluation(persona: &Persona, relevance: f64, quality: f64, engagement: f64) -> Evaluation {
    Evaluation {
        persona_id: persona.id,
        segment: persona.segment.clone(),
        relevance,
        quality,
        engagement,
        sentiment: Sentiment::Neutral,
        reasoning: "scripted".to_string(),
        would_share: false,
        would_act: false,
        evaluated_at: Utc::now(),
    }
}

/// Returns the same scores for every persona.
struct FixedEvaluator {
    relevance: f64,
    quality: f64,
    engagement: f64,
}

#[async_trait]
impl PersonaEvaluator for FixedEvaluator {
    async fn evaluate(
        &self,
        _article: &Article,
        persona: &Persona,
        _depth: AnalysisDepth,
    ) -> anyhow::Result<Evaluation> {
        Ok(scripted_evaluation(
            persona,
            self.relevance,
            self.quality,
            self.engagement,
        ))
    }
}

/// Every call fails.
struct FailingEvaluator;

#[async_trait]
impl PersonaEvaluator for FailingEvaluator {
    async fn evaluate(
        &self,
        _article: &Article,
        _persona: &Persona,
        _depth: AnalysisDepth,
    ) -> anyhow::Result<Evaluation> {
        Err(anyhow!("scripted outage"))
    }
}

/// Each call consumes one gate permit before returning, letting the test
/// control exactly how many evaluations complete and when.
struct GatedEvaluator {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl PersonaEvaluator for GatedEvaluator {
    async fn evaluate(
        &self,
        _article: &Article,
        persona: &Persona,
        _depth: AnalysisDepth,
    ) -> anyhow::Result<Evaluation> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| anyhow!("gate closed"))?;
        permit.forget();
        Ok(scripted_evaluation(persona, 0.5, 0.5, 0.5))
    }
}

/// Records how many evaluations run concurrently.
struct ConcurrencyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyProbe {
    fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PersonaEvaluator for ConcurrencyProbe {
    async fn evaluate(
        &self,
        _article: &Article,
        persona: &Persona,
        _depth: AnalysisDepth,
    ) -> anyhow::Result<Evaluation> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(scripted_evaluation(persona, 0.5, 0.5, 0.5))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn article() -> Article {
    Article {
        content: "An article about community broadband co-ops.".to_string(),
        metadata: Default::default(),
    }
}

fn config(num_personas: usize) -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.num_personas = num_personas;
    config
}

async fn await_terminal(registry: &JobRegistry, id: uuid::Uuid) -> JobSnapshot {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let snapshot = registry.get(id).expect("job should exist");
            if snapshot.status.is_terminal() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job should reach a terminal state in bounded time")
}

/// Collect events until the stream closes (the job went terminal).
async fn drain(mut rx: mpsc::Receiver<StatusEvent>) -> Vec<StatusEvent> {
    tokio::time::timeout(Duration::from_secs(10), async {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    })
    .await
    .expect("event stream should close")
}

fn assert_progress_monotonic(events: &[StatusEvent]) {
    let mut last = 0.0f64;
    for event in events {
        assert!(
            event.progress >= last,
            "progress decreased: {} -> {}",
            last,
            event.progress
        );
        last = event.progress;
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completed_job_walks_the_full_lifecycle() {
    let registry = JobRegistry::new(
        Arc::new(FixedEvaluator {
            relevance: 0.8,
            quality: 0.7,
            engagement: 0.6,
        }),
        8,
    );

    let id = registry.submit(article(), config(10)).unwrap();
    // The runner has not been polled yet: the job is still PENDING.
    assert_eq!(registry.get(id).unwrap().status, JobStatus::Pending);

    let rx = registry.subscribe(id).unwrap();
    let events = drain(rx).await;

    let statuses: Vec<JobStatus> = events
        .iter()
        .filter(|e| e.kind == StatusEventKind::StatusUpdate)
        .map(|e| e.status)
        .collect();
    assert_eq!(statuses.first(), Some(&JobStatus::Initializing));
    assert!(statuses.contains(&JobStatus::Running));
    assert_eq!(statuses.last(), Some(&JobStatus::Completed));
    assert_progress_monotonic(&events);
    assert_eq!(events.last().unwrap().progress, 1.0);

    let snapshot = await_terminal(&registry, id).await;
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.progress, 1.0);
    assert!(snapshot.updated_at >= snapshot.created_at);
    assert!(snapshot.error.is_none());

    let result = snapshot.result.expect("completed job carries a result");
    assert_eq!(result.total_personas, 10);
    assert_eq!(result.evaluations.len(), 10);
    assert!(!result.partial);
    assert!((result.overall_relevance - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn progress_is_monotonic_under_parallel_evaluation() {
    let registry = JobRegistry::new(
        Arc::new(FixedEvaluator {
            relevance: 0.5,
            quality: 0.5,
            engagement: 0.5,
        }),
        16,
    );

    let id = registry.submit(article(), config(20)).unwrap();
    let rx = registry.subscribe(id).unwrap();
    let events = drain(rx).await;

    assert_progress_monotonic(&events);
    let progress_updates = events
        .iter()
        .filter(|e| e.kind == StatusEventKind::StatusUpdate && e.status == JobStatus::Running)
        .count();
    // One per settled unit (plus the Running transition itself).
    assert!(progress_updates >= 20);
}

#[tokio::test]
async fn all_failures_fail_the_job_with_taxonomy_reason() {
    let registry = JobRegistry::new(Arc::new(FailingEvaluator), 8);

    let id = registry.submit(article(), config(10)).unwrap();
    let rx = registry.subscribe(id).unwrap();

    let snapshot = await_terminal(&registry, id).await;
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert!(snapshot.result.is_none());
    let error = snapshot.error.expect("failed job carries an error");
    assert!(error.contains("All 10 persona evaluations failed"));

    let events = drain(rx).await;
    let last = events.last().expect("failure publishes an error event");
    assert_eq!(last.kind, StatusEventKind::Error);
    assert_eq!(last.status, JobStatus::Failed);
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_mid_run_yields_partial_result_and_stops_dispatch() {
    let gate = Arc::new(Semaphore::new(0));
    let registry = JobRegistry::new(
        Arc::new(GatedEvaluator {
            gate: Arc::clone(&gate),
        }),
        8,
    );

    let mut config = config(10);
    config.parallel_processing = false;

    let id = registry.submit(article(), config).unwrap();
    let rx = registry.subscribe(id).unwrap();

    // Let exactly three evaluations through, then cancel at progress 0.3.
    gate.add_permits(3);
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if registry.get(id).unwrap().progress >= 0.29 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("three evaluations should complete");

    registry.cancel(id).unwrap();
    registry.cancel(id).unwrap(); // idempotent

    // Release the rest so any in-flight unit can finish; units not yet
    // dispatched must be skipped at the checkpoint.
    gate.add_permits(10);

    let snapshot = await_terminal(&registry, id).await;
    assert_eq!(snapshot.status, JobStatus::Cancelled);
    assert!(snapshot.cancel_requested);
    assert_eq!(snapshot.progress, 1.0);

    let result = snapshot.result.expect("cancelled mid-run keeps a partial result");
    assert!(result.partial);
    // Three done before the cancel; at most one more was already in flight.
    assert!(result.evaluations.len() >= 3);
    assert!(result.evaluations.len() <= 4);

    let events = drain(rx).await;
    assert_progress_monotonic(&events);
    assert!(events.iter().any(|e| e.progress >= 0.29 && e.progress < 1.0));
}

#[tokio::test]
async fn cancel_before_start_produces_no_result() {
    let gate = Arc::new(Semaphore::new(0));
    let registry = JobRegistry::new(
        Arc::new(GatedEvaluator {
            gate: Arc::clone(&gate),
        }),
        8,
    );

    let id = registry.submit(article(), config(10)).unwrap();
    // Cancel while still PENDING, before the runner is ever polled.
    registry.cancel(id).unwrap();

    let snapshot = await_terminal(&registry, id).await;
    assert_eq!(snapshot.status, JobStatus::Cancelled);
    assert!(snapshot.result.is_none());
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.progress, 1.0);
}

// ---------------------------------------------------------------------------
// Concurrency policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sequential_mode_never_overlaps_evaluations() {
    let probe = Arc::new(ConcurrencyProbe::new());
    let registry = JobRegistry::new(Arc::clone(&probe) as Arc<dyn PersonaEvaluator>, 16);

    let mut config = config(10);
    config.parallel_processing = false;

    let id = registry.submit(article(), config).unwrap();
    await_terminal(&registry, id).await;

    assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn parallel_mode_overlaps_evaluations() {
    let probe = Arc::new(ConcurrencyProbe::new());
    let registry = JobRegistry::new(Arc::clone(&probe) as Arc<dyn PersonaEvaluator>, 16);

    let id = registry.submit(article(), config(10)).unwrap();
    await_terminal(&registry, id).await;

    assert!(probe.peak.load(Ordering::SeqCst) >= 2);
}

// ---------------------------------------------------------------------------
// Late subscribers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn late_subscriber_sees_no_history_but_snapshot_is_final() {
    let registry = JobRegistry::new(
        Arc::new(FixedEvaluator {
            relevance: 0.6,
            quality: 0.6,
            engagement: 0.6,
        }),
        8,
    );

    let id = registry.submit(article(), config(10)).unwrap();
    await_terminal(&registry, id).await;

    let mut rx = registry.subscribe(id).unwrap();
    assert!(rx.recv().await.is_none(), "no historical events are replayed");

    let snapshot = registry.get(id).unwrap();
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert!(snapshot.result.is_some());
}
