//! Status event fan-out.
//!
//! Each job has a list of subscribers, each behind its own bounded channel.
//! Delivery is best-effort and at-most-once: a subscriber whose buffer is
//! full is dropped on the spot rather than allowed to stall the publisher.
//! There is no history; late subscribers must read the job snapshot.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crowdlens_common::StatusEvent;

/// Per-subscriber buffer. A subscriber this far behind is dropped.
pub const SUBSCRIBER_BUFFER: usize = 64;

#[derive(Default)]
pub struct EventBroadcaster {
    subscribers: Mutex<HashMap<Uuid, Vec<mpsc::Sender<StatusEvent>>>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a job's transition stream. The stream ends (`recv`
    /// returns `None`) when the job reaches a terminal state or this
    /// subscriber is dropped for falling behind.
    pub fn subscribe(&self, job_id: Uuid) -> mpsc::Receiver<StatusEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers
            .lock()
            .expect("subscriber map lock poisoned")
            .entry(job_id)
            .or_default()
            .push(tx);
        rx
    }

    /// Fan one event out to every current subscriber of its job. Never
    /// blocks the caller.
    pub fn publish(&self, event: &StatusEvent) {
        let mut map = self
            .subscribers
            .lock()
            .expect("subscriber map lock poisoned");
        let Some(senders) = map.get_mut(&event.job_id) else {
            return;
        };
        senders.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(job_id = %event.job_id, "Dropping status subscriber with full buffer");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if senders.is_empty() {
            map.remove(&event.job_id);
        }
    }

    /// Drop every subscriber of a job, ending their streams. Called when the
    /// job goes terminal and again (harmlessly) on registry eviction.
    pub fn close(&self, job_id: Uuid) {
        self.subscribers
            .lock()
            .expect("subscriber map lock poisoned")
            .remove(&job_id);
    }
}
