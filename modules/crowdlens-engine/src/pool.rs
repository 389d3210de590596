//! Bounded-concurrency evaluation pool.
//!
//! Runs N persona evaluations with at most C in flight. One unit failing is
//! recorded and never aborts its siblings. Cancellation is cooperative: each
//! unit checks the flag before invoking the evaluator, so once the flag is
//! up no new work starts, while already-started evaluations run to
//! completion.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::warn;

use crowdlens_common::{AnalysisDepth, Article, Evaluation, Persona, PersonaFailure};

use crate::evaluator::PersonaEvaluator;

/// Everything one batch produced.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub evaluations: Vec<Evaluation>,
    pub failures: Vec<PersonaFailure>,
    /// Units never dispatched because cancellation was observed first.
    pub skipped: usize,
}

enum UnitOutcome {
    Success(Evaluation),
    Failure(PersonaFailure),
    Skipped,
}

/// Evaluate a single persona. Extracted into a named `async fn` so its
/// returned future carries a higher-ranked lifetime over the `article`/
/// `persona` borrows, which an inline `async move` block inside `.map()`
/// does not satisfy for the compiler.
async fn evaluate_unit(
    evaluator: Arc<dyn PersonaEvaluator>,
    article: &Article,
    persona: &Persona,
    depth: AnalysisDepth,
    cancel: Arc<AtomicBool>,
) -> UnitOutcome {
    // Dispatch checkpoint.
    if cancel.load(Ordering::SeqCst) {
        return UnitOutcome::Skipped;
    }
    match evaluator.evaluate(article, persona, depth).await {
        Ok(evaluation) => UnitOutcome::Success(evaluation),
        Err(e) => {
            warn!(persona_id = %persona.id, error = %e, "Persona evaluation failed");
            UnitOutcome::Failure(PersonaFailure {
                persona_id: persona.id,
                reason: e.to_string(),
            })
        }
    }
}

/// Run every persona through the evaluator with bounded parallelism,
/// reporting progress after each unit settles (success or failure; skipped
/// units do not advance progress).
pub async fn run_batch<F>(
    evaluator: Arc<dyn PersonaEvaluator>,
    article: &Article,
    personas: &[Persona],
    depth: AnalysisDepth,
    concurrency: usize,
    cancel: Arc<AtomicBool>,
    on_progress: F,
) -> BatchOutcome
where
    F: Fn(usize, usize),
{
    let total = personas.len();
    let settled = AtomicUsize::new(0);

    let mut units = Vec::with_capacity(personas.len());
    for persona in personas {
        let evaluator = Arc::clone(&evaluator);
        let cancel = Arc::clone(&cancel);
        units.push(evaluate_unit(evaluator, article, persona, depth, cancel));
    }

    let results: Vec<UnitOutcome> = stream::iter(units)
    .buffer_unordered(concurrency.max(1))
    .map(|outcome| {
        if !matches!(outcome, UnitOutcome::Skipped) {
            let completed = settled.fetch_add(1, Ordering::SeqCst) + 1;
            on_progress(completed, total);
        }
        outcome
    })
    .collect()
    .await;

    let mut batch = BatchOutcome::default();
    for outcome in results {
        match outcome {
            UnitOutcome::Success(evaluation) => batch.evaluations.push(evaluation),
            UnitOutcome::Failure(failure) => batch.failures.push(failure),
            UnitOutcome::Skipped => batch.skipped += 1,
        }
    }
    batch
}
