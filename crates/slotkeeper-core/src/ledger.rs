use crate::concurrency::{KeyGuard, KeyedLocks};
use crate::CoreError;
use chrono::Utc;
use serde::Serialize;
use slotkeeper_schema::{CapacityEntry, Occurrence, OccurrenceId};
use slotkeeper_store::{Collection, Expected, Persistence, Repository, UnitOfWork, Versioned};
use std::sync::Arc;
use tracing::{debug, warn};

/// Capacity figures of one occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub used: u32,
    pub maximum: u32,
}

impl Usage {
    pub fn remaining(self) -> u32 {
        self.maximum.saturating_sub(self.used)
    }

    pub fn is_full(self) -> bool {
        self.used >= self.maximum
    }
}

/// The only writer of used capacity.
///
/// Admission for one occurrence is serialized by a key lock held across the
/// whole read, decide and commit window. The ledger record is written back
/// with a revision precondition, so a second process sharing the store loses
/// the race with a conflict instead of overwriting.
pub struct CapacityLedger {
    backend: Arc<dyn Persistence>,
    entries: Repository<CapacityEntry>,
    occurrences: Repository<Occurrence>,
    locks: KeyedLocks,
}

impl CapacityLedger {
    pub fn new(backend: Arc<dyn Persistence>) -> Self {
        Self {
            entries: Repository::new(Arc::clone(&backend)),
            occurrences: Repository::new(Arc::clone(&backend)),
            backend,
            locks: KeyedLocks::new(),
        }
    }

    fn load_occurrence(&self, id: &OccurrenceId) -> Result<Versioned<Occurrence>, CoreError> {
        self.occurrences
            .find(id.as_str())?
            .ok_or_else(|| CoreError::NotFound {
                collection: Collection::Occurrences,
                id: id.to_string(),
            })
    }

    fn load_entry(&self, id: &OccurrenceId) -> Result<(CapacityEntry, Expected), CoreError> {
        Ok(match self.entries.find(id.as_str())? {
            Some(v) => {
                let expected = v.expected();
                (v.entity, expected)
            }
            None => (CapacityEntry::empty(id.clone()), Expected::Absent),
        })
    }

    /// Current usage, read without taking the key lock.
    pub fn usage(&self, id: &OccurrenceId) -> Result<Usage, CoreError> {
        let occurrence = self.load_occurrence(id)?;
        let (entry, _) = self.load_entry(id)?;
        Ok(Usage {
            used: entry.used_capacity,
            maximum: occurrence.entity.maximum_capacity,
        })
    }

    /// Take the occurrence's key lock and read its ledger entry.
    ///
    /// Everything staged through the guard must be committed before it is
    /// dropped.
    pub fn guard(&self, id: &OccurrenceId) -> Result<LedgerGuard<'_>, CoreError> {
        let key = self.locks.lock(id.as_str());
        let occurrence = self.load_occurrence(id)?.entity;
        let (entry, expected) = self.load_entry(id)?;
        Ok(LedgerGuard {
            _key: key,
            entries: &self.entries,
            occurrence,
            entry,
            expected,
        })
    }

    /// Admit `amount` in a commit of its own. Returns false if it does not fit.
    pub fn try_admit(&self, id: &OccurrenceId, amount: u32) -> Result<bool, CoreError> {
        let mut guard = self.guard(id)?;
        let mut uow = UnitOfWork::new(Arc::clone(&self.backend), "admit");
        if !guard.try_admit(&mut uow, amount)? {
            return Ok(false);
        }
        uow.commit()?;
        Ok(true)
    }

    /// Release `amount` in a commit of its own.
    pub fn release(&self, id: &OccurrenceId, amount: u32) -> Result<(), CoreError> {
        let mut guard = self.guard(id)?;
        let mut uow = UnitOfWork::new(Arc::clone(&self.backend), "release");
        guard.release(&mut uow, amount)?;
        uow.commit()?;
        Ok(())
    }
}

/// Exclusive access to one occurrence's capacity until dropped.
pub struct LedgerGuard<'a> {
    _key: KeyGuard<'a>,
    entries: &'a Repository<CapacityEntry>,
    occurrence: Occurrence,
    entry: CapacityEntry,
    expected: Expected,
}

impl LedgerGuard<'_> {
    pub fn occurrence(&self) -> &Occurrence {
        &self.occurrence
    }

    pub fn usage(&self) -> Usage {
        Usage {
            used: self.entry.used_capacity,
            maximum: self.occurrence.maximum_capacity,
        }
    }

    fn stage(&mut self, uow: &mut UnitOfWork) -> Result<(), CoreError> {
        self.entry.updated_at = Utc::now();
        self.entries.save(uow, &self.entry, self.expected)?;
        Ok(())
    }

    /// Stage `used += amount` if it stays within the maximum.
    ///
    /// Returns `Ok(false)` and stages nothing when it would not fit.
    pub fn try_admit(&mut self, uow: &mut UnitOfWork, amount: u32) -> Result<bool, CoreError> {
        if self.occurrence.deleted_at.is_some() {
            return Err(CoreError::NotFound {
                collection: Collection::Occurrences,
                id: self.occurrence.id.to_string(),
            });
        }
        if self.occurrence.pending {
            return Err(CoreError::OccurrenceNotApproved(self.occurrence.id.clone()));
        }
        let usage = self.usage();
        if amount > usage.remaining() {
            debug!(
                "admission refused on {}: requested {amount}, remaining {}",
                self.occurrence.id,
                usage.remaining()
            );
            return Ok(false);
        }
        self.entry.used_capacity = usage.used + amount;
        self.stage(uow)?;
        Ok(true)
    }

    /// Stage `used -= amount`, floored at zero.
    pub fn release(&mut self, uow: &mut UnitOfWork, amount: u32) -> Result<(), CoreError> {
        let used = self.entry.used_capacity;
        if amount > used {
            warn!(
                "ledger underflow on {}: releasing {amount} with only {used} used",
                self.occurrence.id
            );
        }
        self.entry.used_capacity = used.saturating_sub(amount);
        self.stage(uow)
    }
}
