use crate::persistence::Collection;
use crate::StoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Number of lock stripes records are hashed onto.
pub const LOCK_STRIPES: u8 = 64;

/// Advisory file lock, released on drop.
pub struct StoreLock {
    lock_file: File,
}

fn open_lock_file(lock_path: &Path) -> Result<File, StoreError> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?)
}

impl StoreLock {
    /// Block until an exclusive lock is held.
    pub fn acquire(lock_path: &Path) -> Result<Self, StoreError> {
        let file = open_lock_file(lock_path)?;
        file.lock_exclusive()
            .map_err(|e| StoreError::LockFailed(format!("{}: {e}", lock_path.display())))?;
        Ok(Self { lock_file: file })
    }

    /// Block until a shared lock is held.
    pub fn acquire_shared(lock_path: &Path) -> Result<Self, StoreError> {
        let file = open_lock_file(lock_path)?;
        file.lock_shared()
            .map_err(|e| StoreError::LockFailed(format!("{}: {e}", lock_path.display())))?;
        Ok(Self { lock_file: file })
    }

    /// Take an exclusive lock if nobody else holds one.
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, StoreError> {
        let file = open_lock_file(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

/// Stripe a record hashes onto.
pub fn stripe_for(collection: Collection, id: &str) -> u8 {
    let key = format!("{collection}/{id}");
    blake3::hash(key.as_bytes()).as_bytes()[0] % LOCK_STRIPES
}

/// Locks on a set of record stripes, taken in ascending order.
///
/// Writers hold their stripes exclusively; readers hold them shared, so a
/// read waits until any batch touching the same stripe has committed or
/// rolled back.
pub struct StripeLocks {
    _held: Vec<StoreLock>,
}

impl StripeLocks {
    /// Exclusive locks on every stripe a batch touches.
    pub fn acquire<'a>(
        locks_dir: &Path,
        records: impl IntoIterator<Item = (Collection, &'a str)>,
    ) -> Result<Self, StoreError> {
        Self::lock_stripes(locks_dir, stripes_of(records), false)
    }

    /// Shared locks on the stripes of the given records.
    pub fn acquire_shared<'a>(
        locks_dir: &Path,
        records: impl IntoIterator<Item = (Collection, &'a str)>,
    ) -> Result<Self, StoreError> {
        Self::lock_stripes(locks_dir, stripes_of(records), true)
    }

    /// Shared locks on every stripe, for reads spanning a whole collection.
    pub fn acquire_all_shared(locks_dir: &Path) -> Result<Self, StoreError> {
        Self::lock_stripes(locks_dir, (0..LOCK_STRIPES).collect(), true)
    }

    fn lock_stripes(locks_dir: &Path, stripes: Vec<u8>, shared: bool) -> Result<Self, StoreError> {
        let mut held = Vec::with_capacity(stripes.len());
        for stripe in stripes {
            let path: PathBuf = locks_dir.join(format!("{stripe:02}.lock"));
            held.push(if shared {
                StoreLock::acquire_shared(&path)?
            } else {
                StoreLock::acquire(&path)?
            });
        }
        Ok(Self { _held: held })
    }
}

fn stripes_of<'a>(records: impl IntoIterator<Item = (Collection, &'a str)>) -> Vec<u8> {
    let mut stripes: Vec<u8> = records
        .into_iter()
        .map(|(c, id)| stripe_for(c, id))
        .collect();
    stripes.sort_unstable();
    stripes.dedup();
    stripes
}
