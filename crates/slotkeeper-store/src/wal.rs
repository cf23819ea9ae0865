use crate::layout::StoreLayout;
use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

static WAL_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A single rollback step that restores one record file to its pre-commit content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RollbackStep {
    /// The record did not exist before the commit.
    RemoveFile(PathBuf),
    /// The record existed with this exact file content.
    RestoreFile { path: PathBuf, content: String },
}

/// A WAL entry representing an in-flight commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub op_id: String,
    pub label: String,
    pub timestamp: String,
    pub rollback_steps: Vec<RollbackStep>,
}

/// Write-ahead log of pre-images for atomic multi-record commits.
///
/// Before a batch touches any record file, an entry holding the previous
/// content of every affected file is made durable. The entry is removed once
/// all files are written. Entries still present at startup belong to commits
/// that never finished and are rolled back, so a batch is either fully
/// applied or not at all.
pub struct WriteAheadLog {
    wal_dir: PathBuf,
}

impl WriteAheadLog {
    pub fn new(layout: &StoreLayout) -> Self {
        Self {
            wal_dir: layout.wal_dir(),
        }
    }

    /// Ensure the WAL directory exists.
    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.wal_dir)?;
        Ok(())
    }

    /// Durably record the pre-images of a commit. Returns the op_id.
    pub fn begin(&self, label: &str, rollback_steps: Vec<RollbackStep>) -> Result<String, StoreError> {
        let now = chrono::Utc::now();
        let seq = WAL_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let seed = format!(
            "{label}:{}:{seq}:{}",
            now.timestamp_nanos_opt().unwrap_or_default(),
            std::process::id()
        );
        let op_id = format!(
            "{}-{}",
            now.format("%Y%m%d%H%M%S%6f"),
            &blake3::hash(seed.as_bytes()).to_hex()[..8]
        );
        let entry = WalEntry {
            op_id: op_id.clone(),
            label: label.to_owned(),
            timestamp: now.to_rfc3339(),
            rollback_steps,
        };
        self.write_entry(&entry)?;
        debug!(
            "WAL begin: {label} ({} steps, op_id={op_id})",
            entry.rollback_steps.len()
        );
        Ok(op_id)
    }

    /// Commit (remove) a WAL entry after successful completion.
    pub fn commit(&self, op_id: &str) -> Result<(), StoreError> {
        let path = self.entry_path(op_id);
        if path.exists() {
            fs::remove_file(&path)?;
            crate::fsync_dir(&self.wal_dir)?;
            debug!("WAL commit: {op_id}");
        }
        Ok(())
    }

    /// Roll back one in-flight entry immediately and drop it.
    pub fn abort(&self, op_id: &str) -> Result<(), StoreError> {
        let entry = self.read_entry(op_id)?;
        if self.rollback_entry(&entry) {
            fs::remove_file(self.entry_path(op_id))?;
            debug!("WAL abort: {op_id} rolled back");
        } else {
            warn!("WAL abort: {op_id} only partially rolled back; leaving entry for recovery");
        }
        Ok(())
    }

    /// List all incomplete WAL entries, oldest first.
    pub fn list_incomplete(&self) -> Result<Vec<WalEntry>, StoreError> {
        if !self.wal_dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(&self.wal_dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                match fs::read_to_string(&path) {
                    Ok(content) => match serde_json::from_str::<WalEntry>(&content) {
                        Ok(entry) => entries.push(entry),
                        Err(e) => {
                            // A torn entry means begin() never completed, so no
                            // record file was touched yet.
                            warn!("corrupt WAL entry {}: {e}", path.display());
                            let _ = fs::remove_file(&path);
                        }
                    },
                    Err(e) => {
                        warn!("unreadable WAL entry {}: {e}", path.display());
                        let _ = fs::remove_file(&path);
                    }
                }
            }
        }
        entries.sort_by(|a, b| a.op_id.cmp(&b.op_id));
        Ok(entries)
    }

    /// Roll back all incomplete WAL entries, newest first.
    /// Returns the number of entries rolled back.
    pub fn recover(&self) -> Result<usize, StoreError> {
        let entries = self.list_incomplete()?;
        let count = entries.len();
        for entry in entries.iter().rev() {
            info!(
                "WAL recovery: rolling back {} (op_id={})",
                entry.label, entry.op_id
            );
            if self.rollback_entry(entry) {
                let _ = fs::remove_file(self.entry_path(&entry.op_id));
            }
        }
        if count > 0 {
            info!("WAL recovery complete: {count} entries rolled back");
        }
        Ok(count)
    }

    /// Returns false if any step failed.
    fn rollback_entry(&self, entry: &WalEntry) -> bool {
        let mut clean = true;
        for step in entry.rollback_steps.iter().rev() {
            match step {
                RollbackStep::RemoveFile(path) => {
                    if path.exists() {
                        if let Err(e) = fs::remove_file(path) {
                            warn!(
                                "WAL rollback: failed to remove file {}: {e}",
                                path.display()
                            );
                            clean = false;
                        } else {
                            debug!("WAL rollback: removed file {}", path.display());
                        }
                    }
                }
                RollbackStep::RestoreFile { path, content } => {
                    if let Err(e) = write_atomic(path, content) {
                        warn!(
                            "WAL rollback: failed to restore file {}: {e}",
                            path.display()
                        );
                        clean = false;
                    } else {
                        debug!("WAL rollback: restored file {}", path.display());
                    }
                }
            }
        }
        clean
    }

    fn entry_path(&self, op_id: &str) -> PathBuf {
        self.wal_dir.join(format!("{op_id}.json"))
    }

    fn write_entry(&self, entry: &WalEntry) -> Result<(), StoreError> {
        fs::create_dir_all(&self.wal_dir)?;
        let content = serde_json::to_string_pretty(entry)?;
        write_atomic(&self.entry_path(&entry.op_id), &content)
    }

    fn read_entry(&self, op_id: &str) -> Result<WalEntry, StoreError> {
        let content = fs::read_to_string(self.entry_path(op_id))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Write `content` to `dest` via a synced temp file, rename, and dir fsync.
pub(crate) fn write_atomic(dest: &Path, content: &str) -> Result<(), StoreError> {
    let dir = dest
        .parent()
        .ok_or_else(|| StoreError::InvalidId(format!("no parent for {}", dest.display())))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| StoreError::Io(e.error))?;
    crate::fsync_dir(dir)?;
    Ok(())
}
