use crate::layout::StoreLayout;
use crate::lock::{StoreLock, StripeLocks};
use crate::persistence::Collection;
use crate::record::RecordFile;
use crate::wal::WriteAheadLog;
use crate::StoreError;
use slotkeeper_schema::{CapacityEntry, Occurrence, Reservation};
use std::collections::BTreeMap;
use std::fs;

#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub checked: usize,
    pub passed: usize,
    pub failed: Vec<IntegrityFailure>,
    /// Per-collection `(checked, passed)`.
    pub collections: BTreeMap<Collection, (usize, usize)>,
    /// Ledger entries checked against reservations and occurrence maximums.
    pub ledger_checked: usize,
    pub ledger_passed: usize,
    pub incomplete_commits: usize,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.incomplete_commits == 0
    }
}

#[derive(Debug)]
pub struct IntegrityFailure {
    pub record: String,
    pub reason: String,
}

fn read_collection(
    layout: &StoreLayout,
    collection: Collection,
    report: &mut IntegrityReport,
) -> Result<Vec<(String, serde_json::Value)>, StoreError> {
    let dir = layout.collection_dir(collection);
    let mut bodies = Vec::new();
    if !dir.exists() {
        return Ok(bodies);
    }
    let mut paths: Vec<_> = fs::read_dir(&dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|e| e == "json"))
        .collect();
    paths.sort();

    let (mut checked, mut passed) = (0, 0);
    for path in paths {
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_owned();
        let name = format!("{collection}/{id}");
        checked += 1;
        let parsed = fs::read_to_string(&path)
            .map_err(StoreError::from)
            .and_then(|content| RecordFile::parse(&name, &content));
        match parsed {
            Ok(file) => {
                passed += 1;
                bodies.push((id, file.body));
            }
            Err(StoreError::IntegrityFailure { actual, .. }) => {
                report.failed.push(IntegrityFailure {
                    record: name,
                    reason: format!("checksum mismatch: got {actual}"),
                });
            }
            Err(e) => {
                report.failed.push(IntegrityFailure {
                    record: name,
                    reason: format!("read error: {e}"),
                });
            }
        }
    }
    report.checked += checked;
    report.passed += passed;
    report.collections.insert(collection, (checked, passed));
    Ok(bodies)
}

/// Verify every record checksum, and that each ledger entry covers the
/// confirmed and completed reservations on its occurrence without exceeding
/// the occurrence's maximum.
///
/// Used capacity may be larger than what live reservations hold: deleting a
/// Completed reservation leaves its places consumed.
pub fn verify_store_integrity(layout: &StoreLayout) -> Result<IntegrityReport, StoreError> {
    let mut report = IntegrityReport::default();
    if !layout.store_dir().exists() {
        return Ok(report);
    }
    // One consistent view across all collections.
    let _store = StoreLock::acquire_shared(&layout.lock_file())?;
    let _stripes = StripeLocks::acquire_all_shared(&layout.locks_dir())?;

    read_collection(layout, Collection::Users, &mut report)?;
    read_collection(layout, Collection::EmailClaims, &mut report)?;
    let mut maximums: BTreeMap<String, u32> = BTreeMap::new();
    for (id, body) in read_collection(layout, Collection::Occurrences, &mut report)? {
        if let Ok(occ) = serde_json::from_value::<Occurrence>(body) {
            maximums.insert(id, occ.maximum_capacity);
        }
    }

    let mut held: BTreeMap<String, u64> = BTreeMap::new();
    for (id, body) in read_collection(layout, Collection::Reservations, &mut report)? {
        match serde_json::from_value::<Reservation>(body) {
            Ok(r) if r.state.holds_capacity() => {
                *held.entry(r.occurrence_id.into_inner()).or_default() += u64::from(r.amount);
            }
            Ok(_) => {}
            Err(e) => report.failed.push(IntegrityFailure {
                record: format!("reservations/{id}"),
                reason: format!("undecodable reservation: {e}"),
            }),
        }
    }

    for (id, body) in read_collection(layout, Collection::Ledger, &mut report)? {
        report.ledger_checked += 1;
        let entry = match serde_json::from_value::<CapacityEntry>(body) {
            Ok(entry) => entry,
            Err(e) => {
                report.failed.push(IntegrityFailure {
                    record: format!("ledger/{id}"),
                    reason: format!("undecodable ledger entry: {e}"),
                });
                continue;
            }
        };
        let holding = held.remove(&id).unwrap_or(0);
        let used = u64::from(entry.used_capacity);
        let reason = if used < holding {
            Some(format!(
                "used capacity {used} but reservations hold {holding}"
            ))
        } else {
            maximums
                .get(&id)
                .filter(|&&max| entry.used_capacity > max)
                .map(|max| format!("used capacity {used} exceeds maximum {max}"))
        };
        match reason {
            None => report.ledger_passed += 1,
            Some(reason) => report.failed.push(IntegrityFailure {
                record: format!("ledger/{id}"),
                reason,
            }),
        }
    }
    for (occurrence, amount) in held {
        report.failed.push(IntegrityFailure {
            record: format!("ledger/{occurrence}"),
            reason: format!("missing ledger entry; reservations hold {amount}"),
        });
    }

    report.incomplete_commits = WriteAheadLog::new(layout).list_incomplete()?.len();
    Ok(report)
}
