//! Job registry: the id → state-machine map.
//!
//! The map is the one shared mutable structure outside individual jobs.
//! Readers clone the `Arc<JobHandle>` out under the read lock and snapshot
//! after releasing it, so eviction never races a mid-snapshot reader. Jobs
//! are independent; there is no cross-job locking.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crowdlens_common::{Article, CrowdLensError, JobSnapshot, SimulationConfig, StatusEvent};

use crate::broadcast::EventBroadcaster;
use crate::evaluator::PersonaEvaluator;
use crate::job::JobHandle;
use crate::runner;

pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, Arc<JobHandle>>>,
    events: Arc<EventBroadcaster>,
    evaluator: Arc<dyn PersonaEvaluator>,
    max_concurrency: usize,
}

impl JobRegistry {
    pub fn new(evaluator: Arc<dyn PersonaEvaluator>, max_concurrency: usize) -> Arc<Self> {
        Arc::new(Self {
            jobs: RwLock::new(HashMap::new()),
            events: Arc::new(EventBroadcaster::new()),
            evaluator,
            max_concurrency,
        })
    }

    /// Validate the submission, create the job (PENDING), and spawn its
    /// runner. Must be called from within a tokio runtime.
    pub fn submit(
        &self,
        article: Article,
        config: SimulationConfig,
    ) -> Result<Uuid, CrowdLensError> {
        if article.content.trim().is_empty() {
            return Err(CrowdLensError::InvalidConfig(
                "article_content must not be empty".to_string(),
            ));
        }
        config.validate()?;

        let job = JobHandle::new(article, config, Arc::clone(&self.events));
        let id = job.id();
        self.jobs
            .write()
            .expect("job map lock poisoned")
            .insert(id, Arc::clone(&job));

        info!(job_id = %id, "Simulation submitted");
        tokio::spawn(runner::run_job(
            job,
            Arc::clone(&self.evaluator),
            self.max_concurrency,
        ));
        Ok(id)
    }

    pub fn get(&self, id: Uuid) -> Result<JobSnapshot, CrowdLensError> {
        Ok(self.job(id)?.snapshot())
    }

    /// Request cancellation. Acknowledgement only: termination is
    /// asynchronous and cooperative.
    pub fn cancel(&self, id: Uuid) -> Result<(), CrowdLensError> {
        self.job(id)?.request_cancellation();
        Ok(())
    }

    /// Subscribe to a job's live status stream. A job that is already
    /// terminal yields an immediately-ended stream: there is no history,
    /// callers read the snapshot instead.
    pub fn subscribe(&self, id: Uuid) -> Result<mpsc::Receiver<StatusEvent>, CrowdLensError> {
        let job = self.job(id)?;
        let rx = self.events.subscribe(id);
        if job.snapshot().status.is_terminal() {
            // Terminal transition already closed the stream; drop this late
            // subscription the same way.
            self.events.close(id);
        }
        Ok(rx)
    }

    /// Evict terminal jobs that last changed before the retention window.
    /// Returns how many were evicted.
    pub fn sweep(&self, retention: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::hours(1));
        let mut jobs = self.jobs.write().expect("job map lock poisoned");
        let before = jobs.len();
        jobs.retain(|id, job| {
            let snapshot = job.snapshot();
            let evict = snapshot.status.is_terminal() && snapshot.updated_at < cutoff;
            if evict {
                self.events.close(*id);
            }
            !evict
        });
        before - jobs.len()
    }

    /// Background eviction loop.
    pub fn spawn_retention_sweep(self: &Arc<Self>, interval: Duration, retention: Duration) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = registry.sweep(retention);
                if evicted > 0 {
                    info!(evicted, "Retention sweep evicted finished jobs");
                }
            }
        });
    }

    pub fn job_count(&self) -> usize {
        self.jobs.read().expect("job map lock poisoned").len()
    }

    fn job(&self, id: Uuid) -> Result<Arc<JobHandle>, CrowdLensError> {
        self.jobs
            .read()
            .expect("job map lock poisoned")
            .get(&id)
            .cloned()
            .ok_or(CrowdLensError::NotFound(id))
    }
}
