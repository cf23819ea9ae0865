//! Persistence boundary, repositories, and unit of work for Slotkeeper.
//!
//! This crate provides the storage layer: the `Persistence` trait the engine
//! is injected with, two implementations of it (`FileStore`, JSON records with
//! embedded checksums and a write-ahead log for atomic multi-record commits,
//! and `MemoryStore` for tests and embedding), the typed `Repository<T>` that
//! evaluates specifications, and the `UnitOfWork` that buffers staged
//! mutations and commits them as one batch.

pub mod file;
pub mod integrity;
pub mod layout;
pub mod lock;
pub mod memory;
pub mod persistence;
pub mod record;
pub mod repository;
pub mod unit_of_work;
pub mod wal;

pub use file::FileStore;
pub use integrity::{verify_store_integrity, IntegrityFailure, IntegrityReport};
pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use lock::StoreLock;
pub use memory::MemoryStore;
pub use persistence::{Collection, Expected, Mutation, MutationKind, Persistence, StoredRecord};
pub use record::validate_record_id;
pub use repository::{Entity, Repository, Versioned};
pub use unit_of_work::UnitOfWork;
pub use wal::{RollbackStep, WriteAheadLog};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// POSIX does not guarantee a rename survives a crash until the parent
/// directory itself has been synced.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("record not found: {collection}/{id}")]
    NotFound { collection: Collection, id: String },
    #[error("conflicting write to {collection}/{id}: expected {expected}, found {found}")]
    Conflict {
        collection: Collection,
        id: String,
        expected: Expected,
        found: Expected,
    },
    #[error("integrity check failed for record '{record}': expected {expected}, got {actual}")]
    IntegrityFailure {
        record: String,
        expected: String,
        actual: String,
    },
    #[error("invalid record id: {0}")]
    InvalidId(String),
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("injected failure: {0}")]
    Injected(String),
}
