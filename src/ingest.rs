use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::sync::broadcast;
use tracing::{error, info};

use crate::{
    aggregate::{self, BatchSummary},
    event::AuditEvent,
    store::AuditStore,
};

const COMPLETION_CHANNEL_CAPACITY: usize = 64;

/// Completion signal for one submitted batch. The HTTP contract stays
/// fire-and-forget; this channel exists so tests and operators can
/// observe what happened to a batch after the ack went out.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub batch: u64,
    pub result: std::result::Result<BatchSummary, String>,
}

/// Schedules aggregation of inbound batches on the runtime's worker
/// pool, one task per batch, without blocking the submitter.
pub struct Ingestor {
    store: Arc<AuditStore>,
    completions: broadcast::Sender<BatchOutcome>,
    next_batch: AtomicU64,
}

impl Ingestor {
    pub fn new(store: Arc<AuditStore>) -> Self {
        let (completions, _) = broadcast::channel(COMPLETION_CHANNEL_CAPACITY);
        Self {
            store,
            completions,
            next_batch: AtomicU64::new(1),
        }
    }

    /// Assigns the batch a sequence number, schedules its aggregation,
    /// and returns immediately. Store I/O runs on the blocking pool.
    pub fn submit(&self, events: Vec<AuditEvent>) -> u64 {
        let batch = self.next_batch.fetch_add(1, Ordering::Relaxed);
        let store = Arc::clone(&self.store);
        let completions = self.completions.clone();

        tokio::spawn(async move {
            let outcome =
                tokio::task::spawn_blocking(move || aggregate::aggregate(&store, events)).await;

            let result = match outcome {
                Ok(Ok(summary)) => {
                    info!(
                        "batch {batch}: merged {} of {} event(s) into {} commit group(s)",
                        summary.matched,
                        summary.total,
                        summary.commits.len()
                    );
                    Ok(summary)
                }
                Ok(Err(err)) => {
                    error!("batch {batch}: aggregation failed: {err}");
                    Err(err.to_string())
                }
                Err(err) => {
                    error!("batch {batch}: aggregation task panicked: {err}");
                    Err(err.to_string())
                }
            };

            // Nobody listening is fine.
            let _ = completions.send(BatchOutcome { batch, result });
        });

        batch
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchOutcome> {
        self.completions.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_event(audit_id: &str, hash: &str) -> AuditEvent {
        serde_json::from_value(json!({
            "kind": "Event",
            "auditID": audit_id,
            "verb": "create",
            "responseObject": {
                "metadata": { "annotations": { "git-commit-hash": hash } }
            }
        }))
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn submitted_batch_completes_and_persists() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(AuditStore::open(temp.path().join("store")).unwrap());
        let ingestor = Ingestor::new(Arc::clone(&store));
        let mut completions = ingestor.subscribe();

        let batch = ingestor.submit(vec![sample_event("e1", "abc123")]);

        let outcome = completions.recv().await.unwrap();
        assert_eq!(outcome.batch, batch);
        let summary = outcome.result.expect("aggregation should succeed");
        assert_eq!(summary.total, 1);
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.commits, ["abc123"]);

        let group = store.load_group("abc123").unwrap().unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(group[0].audit_id, "e1");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn batches_get_increasing_sequence_numbers() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(AuditStore::open(temp.path().join("store")).unwrap());
        let ingestor = Ingestor::new(store);
        let mut completions = ingestor.subscribe();

        let first = ingestor.submit(vec![sample_event("e1", "abc123")]);
        let second = ingestor.submit(vec![sample_event("e2", "abc123")]);
        assert!(second > first);

        completions.recv().await.unwrap();
        completions.recv().await.unwrap();
    }
}
