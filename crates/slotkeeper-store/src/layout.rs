use crate::persistence::Collection;
use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current store format version. Incremented on incompatible layout changes.
pub const STORE_FORMAT_VERSION: u32 = 1;
const VERSION_FILE: &str = "version";

/// Directory layout for the Slotkeeper record store.
///
/// ```text
/// <root>/store/version
/// <root>/store/.lock
/// <root>/store/records/<collection>/<id>.json
/// <root>/store/wal/<op_id>.json
/// <root>/store/locks/<stripe>.lock
/// ```
///
/// All subdirectories are created lazily on [`initialize`](Self::initialize).
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreVersion {
    format_version: u32,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn store_dir(&self) -> PathBuf {
        self.root.join("store")
    }

    #[inline]
    pub fn records_dir(&self) -> PathBuf {
        self.store_dir().join("records")
    }

    #[inline]
    pub fn collection_dir(&self, collection: Collection) -> PathBuf {
        self.records_dir().join(collection.as_str())
    }

    #[inline]
    pub fn record_path(&self, collection: Collection, id: &str) -> PathBuf {
        self.collection_dir(collection).join(format!("{id}.json"))
    }

    #[inline]
    pub fn wal_dir(&self) -> PathBuf {
        self.store_dir().join("wal")
    }

    /// Striped per-record lock files.
    #[inline]
    pub fn locks_dir(&self) -> PathBuf {
        self.store_dir().join("locks")
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.store_dir().join(".lock")
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        for collection in Collection::ALL {
            fs::create_dir_all(self.collection_dir(collection))?;
        }
        fs::create_dir_all(self.wal_dir())?;
        fs::create_dir_all(self.locks_dir())?;

        let version_path = self.store_dir().join(VERSION_FILE);
        if version_path.exists() {
            self.verify_version()?;
        } else {
            let ver = StoreVersion {
                format_version: STORE_FORMAT_VERSION,
            };
            let content = serde_json::to_string_pretty(&ver)?;
            let store_dir = self.store_dir();
            let mut tmp = NamedTempFile::new_in(&store_dir)?;
            tmp.write_all(content.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&version_path)
                .map_err(|e| StoreError::Io(e.error))?;
            crate::fsync_dir(&store_dir)?;
        }

        Ok(())
    }

    pub fn verify_version(&self) -> Result<(), StoreError> {
        let version_path = self.store_dir().join(VERSION_FILE);
        let content = fs::read_to_string(&version_path)?;
        let ver: StoreVersion = serde_json::from_str(&content)?;

        if ver.format_version != STORE_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: STORE_FORMAT_VERSION,
                found: ver.format_version,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_are_correct() {
        let layout = StoreLayout::new("/tmp/slotkeeper-test");
        assert_eq!(
            layout.collection_dir(Collection::Reservations),
            PathBuf::from("/tmp/slotkeeper-test/store/records/reservations")
        );
        assert_eq!(
            layout.record_path(Collection::Ledger, "occ1"),
            PathBuf::from("/tmp/slotkeeper-test/store/records/ledger/occ1.json")
        );
        assert_eq!(
            layout.wal_dir(),
            PathBuf::from("/tmp/slotkeeper-test/store/wal")
        );
        assert_eq!(
            layout.lock_file(),
            PathBuf::from("/tmp/slotkeeper-test/store/.lock")
        );
    }

    #[test]
    fn initialize_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();

        for collection in Collection::ALL {
            assert!(layout.collection_dir(collection).is_dir());
        }
        assert!(layout.wal_dir().is_dir());
        assert!(layout.locks_dir().is_dir());
    }

    #[test]
    fn initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        layout.initialize().unwrap();
        layout.verify_version().unwrap();
    }

    #[test]
    fn foreign_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        fs::write(
            layout.store_dir().join(VERSION_FILE),
            r#"{"format_version": 99}"#,
        )
        .unwrap();
        assert!(matches!(
            layout.initialize(),
            Err(StoreError::VersionMismatch { found: 99, .. })
        ));
    }
}
