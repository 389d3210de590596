//! Drives one job from PENDING to a terminal state.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info};

use crowdlens_common::{CrowdLensError, JobStatus};

use crate::aggregate::aggregate;
use crate::evaluator::PersonaEvaluator;
use crate::job::JobHandle;
use crate::pool;
use crate::roster::build_roster;

pub(crate) async fn run_job(
    job: Arc<JobHandle>,
    evaluator: Arc<dyn PersonaEvaluator>,
    max_concurrency: usize,
) {
    if let Err(e) = run_job_inner(&job, evaluator, max_concurrency).await {
        // Transition errors are expected when cancellation lands between
        // checkpoints; anything else marks the job failed.
        if job.snapshot().status.is_terminal() {
            info!(job_id = %job.id(), "Run stopped on terminal job: {e}");
        } else {
            error!(job_id = %job.id(), error = %e, "Simulation run failed");
            if let Err(fail_err) = job.fail(e.to_string()) {
                error!(job_id = %job.id(), error = %fail_err, "Could not record job failure");
            }
        }
    }
}

async fn run_job_inner(
    job: &Arc<JobHandle>,
    evaluator: Arc<dyn PersonaEvaluator>,
    max_concurrency: usize,
) -> Result<(), CrowdLensError> {
    let started_at = job.snapshot().created_at;

    // Cancellation may already have landed while the job sat PENDING; if so
    // it is terminal and there is nothing to run.
    if job.cancel_requested() {
        return Ok(());
    }

    job.transition(JobStatus::Initializing, Some("Building persona roster"))?;
    let roster = build_roster(job.config(), roster_seed(job));
    let segments: HashSet<&str> = roster.iter().map(|p| p.segment.as_str()).collect();
    job.phase_message(&format!(
        "Generated {} personas across {} segments",
        roster.len(),
        segments.len()
    ));

    if job.cancel_requested() {
        return Ok(());
    }

    job.transition(
        JobStatus::Running,
        Some("Evaluating article across personas"),
    )?;

    let config = job.config();
    let concurrency = if config.parallel_processing {
        config.num_personas.min(max_concurrency)
    } else {
        // Strictly sequential, no matter how large the roster.
        1
    };

    let progress_job = Arc::clone(job);
    let batch = pool::run_batch(
        evaluator,
        job.article(),
        &roster,
        config.analysis_depth,
        concurrency,
        job.cancel_flag(),
        move |completed, total| progress_job.record_progress(completed, total),
    )
    .await;

    if batch.evaluations.is_empty() && batch.skipped == 0 {
        let failures = batch.failures.len();
        return job.fail(CrowdLensError::AllEvaluationsFailed { failures }.to_string());
    }

    let cancelled = job.cancel_requested();
    if !cancelled {
        job.phase_message("Aggregating evaluation results");
    }
    let result = aggregate(&batch.evaluations, roster.len(), started_at, cancelled);

    if cancelled {
        let partial = (!batch.evaluations.is_empty()).then_some(result);
        job.cancel_with_partial(partial)
    } else {
        info!(
            job_id = %job.id(),
            personas = roster.len(),
            failures = batch.failures.len(),
            "Simulation complete"
        );
        job.complete(result)
    }
}

/// Roster composition is seeded from the job id, so a job's persona set is
/// reproducible from its id alone.
fn roster_seed(job: &JobHandle) -> u64 {
    let bytes = job.id().into_bytes();
    u64::from_le_bytes(bytes[..8].try_into().expect("uuid has 16 bytes"))
}
