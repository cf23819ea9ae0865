use crate::layout::StoreLayout;
use crate::lock::{StoreLock, StripeLocks};
use crate::persistence::{
    check_preconditions, Collection, Mutation, MutationKind, Persistence, StoredRecord,
};
use crate::record::{validate_record_id, RecordFile};
use crate::wal::{write_atomic, RollbackStep, WriteAheadLog};
use crate::StoreError;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// JSON-record store on the local filesystem.
///
/// Each record lives in its own checksummed file. A batch is applied under a
/// shared store lock plus exclusive locks on the record stripes it touches;
/// the pre-image of every touched file goes to the write-ahead log first, so
/// a failure or crash part-way through is rolled back. Reads hold the same
/// stripes shared and never observe a batch that is still in flight.
pub struct FileStore {
    layout: StoreLayout,
    wal: WriteAheadLog,
    /// Remaining record writes before an injected failure; zero disables it.
    fail_after_writes: AtomicUsize,
}

struct PlannedWrite {
    path: PathBuf,
    content: Option<String>,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    ///
    /// Incomplete commits from previous runs are rolled back, unless another
    /// handle currently holds the store lock.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let layout = StoreLayout::new(root);
        layout.initialize()?;
        let wal = WriteAheadLog::new(&layout);
        wal.initialize()?;

        match StoreLock::try_acquire(&layout.lock_file())? {
            Some(_lock) => {
                wal.recover()?;
            }
            None => debug!("store lock held; skipping WAL recovery"),
        }

        Ok(Self {
            layout,
            wal,
            fail_after_writes: AtomicUsize::new(0),
        })
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Make the `n`-th record write of the next batch fail.
    ///
    /// Used by crash-consistency tests to interrupt a commit part-way.
    pub fn fail_after_writes(&self, n: usize) {
        self.fail_after_writes.store(n, Ordering::SeqCst);
    }

    fn read_record(&self, collection: Collection, id: &str) -> Result<Option<RecordFile>, StoreError> {
        let path = self.layout.record_path(collection, id);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        RecordFile::parse(&format!("{collection}/{id}"), &content).map(Some)
    }

    fn plan(&self, batch: &[Mutation]) -> Result<(Vec<PlannedWrite>, Vec<RollbackStep>), StoreError> {
        let mut writes = Vec::with_capacity(batch.len());
        let mut rollback = Vec::with_capacity(batch.len());
        for m in batch {
            let path = self.layout.record_path(m.collection, &m.id);
            let previous = match fs::read_to_string(&path) {
                Ok(c) => Some(c),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            };
            let content = match &m.kind {
                MutationKind::Put(body) => {
                    let revision = match &previous {
                        Some(c) => {
                            RecordFile::parse(&format!("{}/{}", m.collection, m.id), c)?.revision
                                + 1
                        }
                        None => 1,
                    };
                    let file = RecordFile::new(revision, body.clone())?;
                    Some(serde_json::to_string_pretty(&file)?)
                }
                MutationKind::Remove => None,
            };
            rollback.push(match previous {
                Some(content) => RollbackStep::RestoreFile {
                    path: path.clone(),
                    content,
                },
                None => RollbackStep::RemoveFile(path.clone()),
            });
            writes.push(PlannedWrite { path, content });
        }
        Ok((writes, rollback))
    }

    fn write_all(&self, writes: &[PlannedWrite]) -> Result<(), StoreError> {
        for write in writes {
            let remaining = self.fail_after_writes.load(Ordering::SeqCst);
            if remaining == 1 {
                self.fail_after_writes.store(0, Ordering::SeqCst);
                return Err(StoreError::Injected(format!(
                    "write to {}",
                    write.path.display()
                )));
            } else if remaining > 1 {
                self.fail_after_writes.store(remaining - 1, Ordering::SeqCst);
            }

            match &write.content {
                Some(content) => write_atomic(&write.path, content)?,
                None => {
                    if write.path.exists() {
                        fs::remove_file(&write.path)?;
                        if let Some(dir) = write.path.parent() {
                            crate::fsync_dir(dir)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl Persistence for FileStore {
    fn load(&self, collection: Collection, id: &str) -> Result<Option<StoredRecord>, StoreError> {
        validate_record_id(id)?;
        let _store = StoreLock::acquire_shared(&self.layout.lock_file())?;
        let _stripe = StripeLocks::acquire_shared(&self.layout.locks_dir(), [(collection, id)])?;
        Ok(self
            .read_record(collection, id)?
            .map(|file| file.into_stored(id)))
    }

    fn scan(&self, collection: Collection) -> Result<Vec<StoredRecord>, StoreError> {
        let dir = self.layout.collection_dir(collection);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let _store = StoreLock::acquire_shared(&self.layout.lock_file())?;
        let _stripes = StripeLocks::acquire_all_shared(&self.layout.locks_dir())?;

        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_owned());
                }
            }
        }
        ids.sort();

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            match self.read_record(collection, &id) {
                Ok(Some(file)) => records.push(file.into_stored(&id)),
                // Removed between read_dir and read.
                Ok(None) => {}
                Err(e) => warn!("skipping corrupted record '{collection}/{id}': {e}"),
            }
        }
        Ok(records)
    }

    fn apply(&self, label: &str, batch: &[Mutation]) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        for m in batch {
            validate_record_id(&m.id)?;
        }

        let _store = StoreLock::acquire_shared(&self.layout.lock_file())?;
        let _stripes = StripeLocks::acquire(
            &self.layout.locks_dir(),
            batch.iter().map(|m| (m.collection, m.id.as_str())),
        )?;

        check_preconditions(batch, |collection, id| {
            Ok(self.read_record(collection, id)?.map(|f| f.revision))
        })?;

        let (writes, rollback) = self.plan(batch)?;
        let op_id = self.wal.begin(label, rollback)?;

        if let Err(e) = self.write_all(&writes) {
            warn!("commit '{label}' failed part-way, rolling back: {e}");
            if let Err(abort_err) = self.wal.abort(&op_id) {
                warn!("WAL abort of {op_id} failed, left for recovery: {abort_err}");
            }
            return Err(e);
        }

        self.wal.commit(&op_id)?;
        debug!("committed '{label}': {} records", batch.len());
        Ok(())
    }
}
