use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::{
    error::{AuditError, Result},
    event::{self, AuditEvent},
    store::AuditStore,
};

/// What happened to one ingested batch.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    /// Events received in the batch.
    pub total: usize,
    /// Events carrying a commit annotation.
    pub matched: usize,
    /// Commit hashes whose groups were persisted.
    pub commits: Vec<String>,
}

/// Merges a batch of audit events into the store, grouped by commit
/// hash. Events without a commit annotation are skipped. A failure on
/// one commit's group does not stop the remaining groups; any failures
/// are folded into a single error after every group has been attempted.
pub fn aggregate(store: &AuditStore, batch: Vec<AuditEvent>) -> Result<BatchSummary> {
    let total = batch.len();

    let mut groups: BTreeMap<String, Vec<AuditEvent>> = BTreeMap::new();
    for audit_event in batch {
        match event::commit_hash(&audit_event) {
            Some(hash) => groups.entry(hash).or_default().push(audit_event),
            None => debug!(
                audit_id = %audit_event.audit_id,
                "skipping event without commit annotation"
            ),
        }
    }

    let matched = groups.values().map(Vec::len).sum();
    let mut commits = Vec::with_capacity(groups.len());
    let mut failures = Vec::new();

    for (hash, events) in groups {
        let added = events.len();
        match store.merge_events(&hash, events) {
            Ok(size) => {
                debug!("merged {added} event(s) into commit {hash}, group size now {size}");
                commits.push(hash);
            }
            Err(err) => {
                warn!("failed to merge events for commit {hash}: {err}");
                failures.push(format!("{hash}: {err}"));
            }
        }
    }

    if failures.is_empty() {
        Ok(BatchSummary {
            total,
            matched,
            commits,
        })
    } else {
        Err(AuditError::Storage(format!(
            "failed to persist {} commit group(s): {}",
            failures.len(),
            failures.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_event(audit_id: &str, hash: Option<&str>) -> AuditEvent {
        let mut value = json!({
            "kind": "Event",
            "auditID": audit_id,
            "verb": "create",
        });
        if let Some(hash) = hash {
            value["responseObject"] = json!({
                "metadata": { "annotations": { "git-commit-hash": hash } }
            });
        }
        serde_json::from_value(value).unwrap()
    }

    fn open_store(temp: &TempDir) -> AuditStore {
        AuditStore::open(temp.path().join("store")).unwrap()
    }

    #[test]
    fn groups_batch_by_commit_and_skips_unannotated_events() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let summary = aggregate(
            &store,
            vec![
                sample_event("e1", Some("abc123")),
                sample_event("e2", None),
                sample_event("e3", Some("fe0d")),
                sample_event("e4", Some("abc123")),
            ],
        )
        .unwrap();

        assert_eq!(summary.total, 4);
        assert_eq!(summary.matched, 3);
        assert_eq!(summary.commits, ["abc123", "fe0d"]);

        let group = store.load_group("abc123").unwrap().unwrap();
        let ids: Vec<&str> = group.iter().map(|event| event.audit_id.as_str()).collect();
        assert_eq!(ids, ["e1", "e4"]);
        assert_eq!(store.load_group("fe0d").unwrap().unwrap().len(), 1);
    }

    #[test]
    fn unannotated_batch_leaves_the_store_untouched() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        store
            .merge_events("abc123", vec![sample_event("seed", Some("abc123"))])
            .unwrap();

        let summary = aggregate(
            &store,
            vec![sample_event("e1", None), sample_event("e2", None)],
        )
        .unwrap();

        assert_eq!(summary.matched, 0);
        assert!(summary.commits.is_empty());
        assert_eq!(store.snapshot().unwrap().len(), 1);
        assert_eq!(store.load_group("abc123").unwrap().unwrap().len(), 1);
    }

    #[test]
    fn second_batch_appends_after_stored_events() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        aggregate(
            &store,
            vec![
                sample_event("e1", Some("abc123")),
                sample_event("e2", Some("abc123")),
            ],
        )
        .unwrap();
        aggregate(&store, vec![sample_event("e3", Some("abc123"))]).unwrap();

        let group = store.load_group("abc123").unwrap().unwrap();
        let ids: Vec<&str> = group.iter().map(|event| event.audit_id.as_str()).collect();
        assert_eq!(ids, ["e1", "e2", "e3"]);
    }

    #[test]
    fn corrupt_stored_group_fails_that_key_but_not_the_batch() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        // A value that is not a serialized event group.
        store.put("bad0", b"not json").unwrap();

        let err = aggregate(
            &store,
            vec![
                sample_event("e1", Some("bad0")),
                sample_event("e2", Some("good")),
            ],
        )
        .unwrap_err();

        assert!(matches!(err, AuditError::Storage(_)));
        // The healthy key was still persisted.
        let group = store.load_group("good").unwrap().unwrap();
        assert_eq!(group.len(), 1);
    }
}
