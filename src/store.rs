use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    sync::Arc,
};

use parking_lot::Mutex;
use rocksdb::{DBWithThreadMode, IteratorMode, MultiThreaded, Options};

use crate::{
    error::{AuditError, Result},
    event::AuditEvent,
};

/// Durable commit-keyed store of audit event groups.
///
/// Keys are raw commit-hash strings; values are JSON-serialized
/// `Vec<AuditEvent>`. The handle is owned by the process for its
/// lifetime and the underlying database is released on drop.
pub struct AuditStore {
    db: DBWithThreadMode<MultiThreaded>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AuditStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DBWithThreadMode::<MultiThreaded>::open(&options, path)
            .map_err(|err| AuditError::Storage(err.to_string()))?;

        Ok(Self {
            db,
            key_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.db
            .get(key.as_bytes())
            .map_err(|err| AuditError::Storage(err.to_string()))
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    pub fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db
            .put(key.as_bytes(), value)
            .map_err(|err| AuditError::Storage(err.to_string()))
    }

    /// Appends `events` to the group stored under `hash` and returns the
    /// new group size. The key's lock is held across the whole
    /// read-merge-write, so concurrent batches touching the same commit
    /// serialize here and neither can drop the other's events. Distinct
    /// commits merge concurrently.
    pub fn merge_events(&self, hash: &str, events: Vec<AuditEvent>) -> Result<usize> {
        let lock = self.key_lock(hash);
        let _guard = lock.lock();

        let mut group: Vec<AuditEvent> = match self.get(hash)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => Vec::new(),
        };
        group.extend(events);

        let payload = serde_json::to_vec(&group)?;
        self.put(hash, &payload)?;
        Ok(group.len())
    }

    /// Decodes the stored group for `hash`, or `None` when the commit
    /// has never been seen.
    pub fn load_group(&self, hash: &str) -> Result<Option<Vec<AuditEvent>>> {
        match self.get(hash)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Full ordered scan of the store. Each call constructs a fresh
    /// iterator, so the scan is restartable.
    pub fn scan(&self) -> impl Iterator<Item = Result<(String, Vec<u8>)>> + '_ {
        self.db.iterator(IteratorMode::Start).map(|item| {
            item.map(|(key, value)| {
                (
                    String::from_utf8_lossy(&key).into_owned(),
                    value.into_vec(),
                )
            })
            .map_err(|err| AuditError::Storage(err.to_string()))
        })
    }

    /// Materializes the whole store as commit hash to raw serialized
    /// group. Record counts are expected to stay small; callers holding
    /// large stores pay the full cost per call.
    pub fn snapshot(&self) -> Result<BTreeMap<String, String>> {
        let mut records = BTreeMap::new();
        for item in self.scan() {
            let (key, value) = item?;
            records.insert(key, String::from_utf8_lossy(&value).into_owned());
        }
        Ok(records)
    }

    // The registry grows with distinct commit hashes, bounded by the
    // number of keys in the store.
    fn key_lock(&self, hash: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock();
        Arc::clone(locks.entry(hash.to_string()).or_default())
    }
}
