//! Per-job state machine.
//!
//! A job's mutable fields live behind one mutex; every mutation goes through
//! the methods here, so transitions and progress updates never interleave
//! inconsistently. Critical sections never await: events are published with
//! a non-blocking fan-out while the lock is held, which is what gives any
//! one subscriber events in transition order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crowdlens_common::{
    Article, CrowdLensError, JobSnapshot, JobStatus, SimulationConfig, SimulationResult,
    StatusEvent, StatusEventKind,
};

use crate::broadcast::EventBroadcaster;

/// The legal edges: Pending → Initializing → Running → Completed | Failed,
/// plus any non-terminal state → Cancelled.
fn edge_allowed(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    matches!(
        (from, to),
        (Pending, Initializing) | (Initializing, Running) | (Running, Completed) | (Running, Failed)
    ) || (!from.is_terminal() && to == Cancelled)
}

struct JobInner {
    status: JobStatus,
    progress: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    result: Option<SimulationResult>,
    error: Option<String>,
}

pub struct JobHandle {
    id: Uuid,
    article: Article,
    config: SimulationConfig,
    cancel: Arc<AtomicBool>,
    inner: Mutex<JobInner>,
    events: Arc<EventBroadcaster>,
}

impl JobHandle {
    pub(crate) fn new(
        article: Article,
        config: SimulationConfig,
        events: Arc<EventBroadcaster>,
    ) -> Arc<Self> {
        let now = Utc::now();
        Arc::new(Self {
            id: Uuid::new_v4(),
            article,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            inner: Mutex::new(JobInner {
                status: JobStatus::Pending,
                progress: 0.0,
                created_at: now,
                updated_at: now,
                result: None,
                error: None,
            }),
            events,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn article(&self) -> &Article {
        &self.article
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The cooperative cancellation flag, shared with the evaluation pool.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Move to a new (non-result-carrying) state. The only legal edges are
    /// the transition table's; anything else is `InvalidTransition`.
    pub fn transition(
        &self,
        to: JobStatus,
        message: Option<&str>,
    ) -> Result<(), CrowdLensError> {
        let mut inner = self.inner.lock().expect("job state lock poisoned");
        if !edge_allowed(inner.status, to) {
            return Err(CrowdLensError::InvalidTransition {
                from: inner.status,
                to,
            });
        }
        inner.status = to;
        inner.updated_at = Utc::now();
        if to.is_terminal() {
            inner.progress = 1.0;
        }
        info!(job_id = %self.id, status = %to, "Job transition");
        self.publish_locked(&inner, StatusEventKind::StatusUpdate, message);
        if to.is_terminal() {
            self.events.close(self.id);
        }
        Ok(())
    }

    /// Report evaluation progress as `completed / total`. Only meaningful
    /// while RUNNING. Updates that would not increase progress are ignored;
    /// concurrent workers complete out of order, and that is not an error.
    pub fn record_progress(&self, completed: usize, total: usize) {
        if total == 0 {
            return;
        }
        let mut inner = self.inner.lock().expect("job state lock poisoned");
        if inner.status != JobStatus::Running {
            return;
        }
        let progress = (completed as f64 / total as f64).clamp(0.0, 1.0);
        if progress <= inner.progress {
            return;
        }
        inner.progress = progress;
        inner.updated_at = Utc::now();
        self.publish_locked(&inner, StatusEventKind::StatusUpdate, None);
    }

    /// Publish a human-readable phase message without changing status or
    /// progress. No-op once terminal.
    pub fn phase_message(&self, message: &str) {
        let inner = self.inner.lock().expect("job state lock poisoned");
        if inner.status.is_terminal() {
            return;
        }
        self.publish_locked(&inner, StatusEventKind::PhaseUpdate, Some(message));
    }

    /// Request cancellation. Idempotent. Jobs that have not started running
    /// cancel immediately; a RUNNING job's pool observes the flag at its
    /// next dispatch checkpoint.
    pub fn request_cancellation(&self) {
        if self.cancel.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut inner = self.inner.lock().expect("job state lock poisoned");
        match inner.status {
            JobStatus::Pending | JobStatus::Initializing => {
                self.terminalize_locked(
                    &mut inner,
                    JobStatus::Cancelled,
                    None,
                    None,
                    StatusEventKind::StatusUpdate,
                    Some("Simulation cancelled"),
                );
            }
            _ => {}
        }
    }

    /// Terminal transition to COMPLETED with the aggregated result.
    pub fn complete(&self, result: SimulationResult) -> Result<(), CrowdLensError> {
        let mut inner = self.inner.lock().expect("job state lock poisoned");
        if inner.status.is_terminal() {
            return Err(CrowdLensError::AlreadyTerminal);
        }
        self.terminalize_locked(
            &mut inner,
            JobStatus::Completed,
            Some(result),
            None,
            StatusEventKind::StatusUpdate,
            Some("Simulation complete"),
        );
        Ok(())
    }

    /// Terminal transition to FAILED with a human-readable error.
    pub fn fail(&self, error: String) -> Result<(), CrowdLensError> {
        let mut inner = self.inner.lock().expect("job state lock poisoned");
        if inner.status.is_terminal() {
            return Err(CrowdLensError::AlreadyTerminal);
        }
        let message = error.clone();
        self.terminalize_locked(
            &mut inner,
            JobStatus::Failed,
            None,
            Some(error),
            StatusEventKind::Error,
            Some(&message),
        );
        Ok(())
    }

    /// Terminal transition to CANCELLED, attaching whatever subset of the
    /// batch completed before the checkpoint (flagged partial), if any.
    pub fn cancel_with_partial(
        &self,
        result: Option<SimulationResult>,
    ) -> Result<(), CrowdLensError> {
        let mut inner = self.inner.lock().expect("job state lock poisoned");
        if inner.status.is_terminal() {
            return Err(CrowdLensError::AlreadyTerminal);
        }
        self.terminalize_locked(
            &mut inner,
            JobStatus::Cancelled,
            result,
            None,
            StatusEventKind::StatusUpdate,
            Some("Simulation cancelled"),
        );
        Ok(())
    }

    /// Consistent point-in-time view for concurrent readers.
    pub fn snapshot(&self) -> JobSnapshot {
        let inner = self.inner.lock().expect("job state lock poisoned");
        JobSnapshot {
            id: self.id,
            status: inner.status,
            progress: inner.progress,
            created_at: inner.created_at,
            updated_at: inner.updated_at,
            cancel_requested: self.cancel.load(Ordering::SeqCst),
            result: inner.result.clone(),
            error: inner.error.clone(),
        }
    }

    fn terminalize_locked(
        &self,
        inner: &mut JobInner,
        status: JobStatus,
        result: Option<SimulationResult>,
        error: Option<String>,
        kind: StatusEventKind,
        message: Option<&str>,
    ) {
        inner.status = status;
        inner.progress = 1.0;
        inner.updated_at = Utc::now();
        inner.result = result;
        inner.error = error;
        info!(job_id = %self.id, status = %status, "Job transition");
        self.publish_locked(inner, kind, message);
        self.events.close(self.id);
    }

    fn publish_locked(&self, inner: &JobInner, kind: StatusEventKind, message: Option<&str>) {
        self.events.publish(&StatusEvent {
            job_id: self.id,
            kind,
            status: inner.status,
            progress: inner.progress,
            message: message.map(str::to_string),
            timestamp: inner.updated_at,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Arc<JobHandle> {
        JobHandle::new(
            Article {
                content: "test article".to_string(),
                metadata: Default::default(),
            },
            SimulationConfig::default(),
            Arc::new(EventBroadcaster::new()),
        )
    }

    #[test]
    fn happy_path_edges() {
        let job = job();
        assert!(job.transition(JobStatus::Initializing, None).is_ok());
        assert!(job.transition(JobStatus::Running, None).is_ok());
        assert!(job.transition(JobStatus::Completed, None).is_ok());
        assert_eq!(job.snapshot().progress, 1.0);
    }

    #[test]
    fn illegal_edges_rejected() {
        let job = job();
        // Pending cannot jump straight to Running or Completed.
        assert!(matches!(
            job.transition(JobStatus::Running, None),
            Err(CrowdLensError::InvalidTransition { .. })
        ));
        assert!(matches!(
            job.transition(JobStatus::Completed, None),
            Err(CrowdLensError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn no_transition_out_of_terminal() {
        let job = job();
        job.transition(JobStatus::Initializing, None).unwrap();
        job.transition(JobStatus::Running, None).unwrap();
        job.transition(JobStatus::Failed, None).unwrap();
        assert!(job.transition(JobStatus::Cancelled, None).is_err());
        assert!(matches!(
            job.fail("again".to_string()),
            Err(CrowdLensError::AlreadyTerminal)
        ));
    }

    #[test]
    fn progress_is_monotonic() {
        let job = job();
        job.transition(JobStatus::Initializing, None).unwrap();
        job.transition(JobStatus::Running, None).unwrap();
        job.record_progress(5, 10);
        assert_eq!(job.snapshot().progress, 0.5);
        // Out-of-order completion report: ignored, not an error.
        job.record_progress(3, 10);
        assert_eq!(job.snapshot().progress, 0.5);
        job.record_progress(7, 10);
        assert_eq!(job.snapshot().progress, 0.7);
    }

    #[test]
    fn progress_ignored_outside_running() {
        let job = job();
        job.record_progress(5, 10);
        assert_eq!(job.snapshot().progress, 0.0);
    }

    #[test]
    fn cancel_before_running_is_immediate() {
        let job = job();
        job.request_cancellation();
        let snapshot = job.snapshot();
        assert_eq!(snapshot.status, JobStatus::Cancelled);
        assert_eq!(snapshot.progress, 1.0);
        assert!(snapshot.cancel_requested);
    }

    #[test]
    fn cancel_is_idempotent() {
        let job = job();
        job.request_cancellation();
        let first = job.snapshot();
        job.request_cancellation();
        let second = job.snapshot();
        assert_eq!(first.status, second.status);
        assert_eq!(first.updated_at, second.updated_at);
    }

    #[test]
    fn cancel_while_running_sets_flag_only() {
        let job = job();
        job.transition(JobStatus::Initializing, None).unwrap();
        job.transition(JobStatus::Running, None).unwrap();
        job.record_progress(3, 10);
        job.request_cancellation();
        let snapshot = job.snapshot();
        // The runner finishes the cancellation at its next checkpoint.
        assert_eq!(snapshot.status, JobStatus::Running);
        assert!(snapshot.cancel_requested);
        assert_eq!(snapshot.progress, 0.3);
    }

    #[test]
    fn result_and_error_are_mutually_exclusive() {
        let completed = job();
        completed.transition(JobStatus::Initializing, None).unwrap();
        completed.transition(JobStatus::Running, None).unwrap();
        completed
            .complete(crate::aggregate::aggregate(&[], 0, Utc::now(), false))
            .unwrap();
        let snapshot = completed.snapshot();
        assert!(snapshot.result.is_some());
        assert!(snapshot.error.is_none());

        let failed = job();
        failed.transition(JobStatus::Initializing, None).unwrap();
        failed.transition(JobStatus::Running, None).unwrap();
        failed.fail("boom".to_string()).unwrap();
        let snapshot = failed.snapshot();
        assert!(snapshot.result.is_none());
        assert_eq!(snapshot.error.as_deref(), Some("boom"));
    }

    #[test]
    fn updated_at_advances() {
        let job = job();
        let created = job.snapshot().created_at;
        job.transition(JobStatus::Initializing, None).unwrap();
        assert!(job.snapshot().updated_at >= created);
    }
}
