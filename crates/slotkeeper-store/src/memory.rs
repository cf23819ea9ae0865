use crate::persistence::{
    check_preconditions, Collection, Mutation, MutationKind, Persistence, StoredRecord,
};
use crate::StoreError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use tracing::debug;

type Key = (Collection, String);

/// In-process store. Batches are applied under a single write lock after
/// all preconditions pass, so they are atomic by construction.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<Key, (u64, serde_json::Value)>>,
    injected_failures: AtomicUsize,
    commits: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` batches fail before anything is applied.
    pub fn fail_next_commits(&self, n: usize) {
        self.injected_failures.store(n, Ordering::SeqCst);
    }

    /// Number of batches successfully applied so far.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn poisoned() -> StoreError {
        StoreError::LockFailed("memory store lock poisoned".to_owned())
    }
}

impl Persistence for MemoryStore {
    fn load(&self, collection: Collection, id: &str) -> Result<Option<StoredRecord>, StoreError> {
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        Ok(records
            .get(&(collection, id.to_owned()))
            .map(|(revision, body)| StoredRecord {
                id: id.to_owned(),
                revision: *revision,
                body: body.clone(),
            }))
    }

    fn scan(&self, collection: Collection) -> Result<Vec<StoredRecord>, StoreError> {
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        Ok(records
            .range((collection, String::new())..)
            .take_while(|((c, _), _)| *c == collection)
            .map(|((_, id), (revision, body))| StoredRecord {
                id: id.clone(),
                revision: *revision,
                body: body.clone(),
            })
            .collect())
    }

    fn apply(&self, label: &str, batch: &[Mutation]) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| Self::poisoned())?;

        let pending = self.injected_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.injected_failures.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Injected(format!("commit '{label}'")));
        }

        check_preconditions(batch, |collection, id| {
            Ok(records.get(&(collection, id.to_owned())).map(|(rev, _)| *rev))
        })?;

        for m in batch {
            let key = (m.collection, m.id.clone());
            match &m.kind {
                MutationKind::Put(body) => {
                    let revision = records.get(&key).map_or(1, |(rev, _)| rev + 1);
                    records.insert(key, (revision, body.clone()));
                }
                MutationKind::Remove => {
                    records.remove(&key);
                }
            }
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        debug!("committed '{label}': {} records", batch.len());
        Ok(())
    }
}
