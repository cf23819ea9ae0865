use crate::persistence::{Collection, Expected, Mutation, Persistence, StoredRecord};
use crate::unit_of_work::UnitOfWork;
use crate::StoreError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use slotkeeper_schema::{
    CapacityEntry, EmailClaim, Occurrence, Queryable, Reservation, SoftDeletable, Specification,
    User,
};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// A record type stored in one collection under a string key.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn key(&self) -> &str;
}

impl Entity for User {
    const COLLECTION: Collection = Collection::Users;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl Entity for EmailClaim {
    const COLLECTION: Collection = Collection::EmailClaims;

    fn key(&self) -> &str {
        &self.key
    }
}

impl Entity for Occurrence {
    const COLLECTION: Collection = Collection::Occurrences;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl Entity for Reservation {
    const COLLECTION: Collection = Collection::Reservations;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl Entity for CapacityEntry {
    const COLLECTION: Collection = Collection::Ledger;

    fn key(&self) -> &str {
        self.occurrence_id.as_str()
    }
}

/// An entity together with the store revision it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub revision: u64,
    pub entity: T,
}

impl<T> Versioned<T> {
    /// Precondition for writing back a modified copy of this entity.
    pub fn expected(&self) -> Expected {
        Expected::Revision(self.revision)
    }
}

/// Typed access to one collection.
///
/// Reads go straight to the backend. Writes are only staged into a
/// [`UnitOfWork`]; nothing is persisted until it commits.
pub struct Repository<T: Entity> {
    backend: Arc<dyn Persistence>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Repository<T> {
    pub fn new(backend: Arc<dyn Persistence>) -> Self {
        Self {
            backend,
            _entity: PhantomData,
        }
    }

    fn decode(record: StoredRecord) -> Result<Versioned<T>, StoreError> {
        Ok(Versioned {
            revision: record.revision,
            entity: serde_json::from_value(record.body)?,
        })
    }

    pub fn find(&self, id: &str) -> Result<Option<Versioned<T>>, StoreError> {
        self.backend
            .load(T::COLLECTION, id)?
            .map(Self::decode)
            .transpose()
    }

    pub fn get(&self, id: &str) -> Result<Versioned<T>, StoreError> {
        self.find(id)?.ok_or_else(|| StoreError::NotFound {
            collection: T::COLLECTION,
            id: id.to_owned(),
        })
    }

    /// Every decodable entity in id order. Undecodable bodies are skipped.
    pub fn list(&self) -> Result<Vec<Versioned<T>>, StoreError> {
        let records = self.backend.scan(T::COLLECTION)?;
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id.clone();
            match Self::decode(record) {
                Ok(v) => out.push(v),
                Err(e) => warn!("skipping undecodable {}/{id}: {e}", T::COLLECTION),
            }
        }
        Ok(out)
    }

    /// Stage creation of a new entity; the commit fails if the key exists.
    pub fn insert(&self, uow: &mut UnitOfWork, entity: &T) -> Result<(), StoreError> {
        self.save(uow, entity, Expected::Absent)
    }

    /// Stage a write-back of an entity read at `revision`.
    pub fn update(&self, uow: &mut UnitOfWork, entity: &T, revision: u64) -> Result<(), StoreError> {
        self.save(uow, entity, Expected::Revision(revision))
    }

    pub fn save(&self, uow: &mut UnitOfWork, entity: &T, expected: Expected) -> Result<(), StoreError> {
        let body = serde_json::to_value(entity)?;
        uow.stage(Mutation::put(T::COLLECTION, entity.key(), body, expected));
        Ok(())
    }

    /// Stage physical removal of a record.
    pub fn remove(&self, uow: &mut UnitOfWork, id: &str, expected: Expected) {
        uow.stage(Mutation::remove(T::COLLECTION, id, expected));
    }
}

impl<T: Entity + Queryable> Repository<T> {
    /// Entities satisfying `spec`, in id order.
    pub fn query(&self, spec: &Specification<T>) -> Result<Vec<Versioned<T>>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|v| spec.matches(&v.entity))
            .collect())
    }

    pub fn count(&self, spec: &Specification<T>) -> Result<usize, StoreError> {
        Ok(self.query(spec)?.len())
    }
}

impl<T: Entity + SoftDeletable> Repository<T> {
    /// Stage setting the deleted-at marker. Already-deleted entities are left as is.
    pub fn mark_deleted(
        &self,
        uow: &mut UnitOfWork,
        current: &Versioned<T>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if current.entity.is_deleted() {
            return Ok(false);
        }
        let mut entity = current.entity.clone();
        entity.mark_deleted(at);
        self.update(uow, &entity, current.revision)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use slotkeeper_schema::user;

    fn setup() -> (Arc<dyn Persistence>, Repository<User>) {
        let backend: Arc<dyn Persistence> = Arc::new(MemoryStore::new());
        let repo = Repository::new(Arc::clone(&backend));
        (backend, repo)
    }

    #[test]
    fn insert_commit_find() {
        let (backend, repo) = setup();
        let alice = User::new("Alice@Example.org", "Alice", Utc::now());
        let mut uow = UnitOfWork::new(Arc::clone(&backend), "register");
        repo.insert(&mut uow, &alice).unwrap();
        assert!(repo.find(alice.id.as_str()).unwrap().is_none());

        uow.commit().unwrap();
        let found = repo.get(alice.id.as_str()).unwrap();
        assert_eq!(found.revision, 1);
        assert_eq!(found.entity.email, "alice@example.org");
    }

    #[test]
    fn get_missing_is_not_found() {
        let (_backend, repo) = setup();
        assert!(matches!(
            repo.get("nobody"),
            Err(StoreError::NotFound {
                collection: Collection::Users,
                ..
            })
        ));
    }

    #[test]
    fn stale_update_conflicts() {
        let (backend, repo) = setup();
        let u = User::new("a@b.c", "A", Utc::now());
        let mut uow = UnitOfWork::new(Arc::clone(&backend), "seed");
        repo.insert(&mut uow, &u).unwrap();
        uow.commit().unwrap();

        let read = repo.get(u.id.as_str()).unwrap();
        let mut first = UnitOfWork::new(Arc::clone(&backend), "first");
        let mut confirmed = read.entity.clone();
        confirmed.email_confirmed = true;
        repo.update(&mut first, &confirmed, read.revision).unwrap();
        first.commit().unwrap();

        let mut second = UnitOfWork::new(Arc::clone(&backend), "second");
        repo.mark_deleted(&mut second, &read, Utc::now()).unwrap();
        assert!(matches!(second.commit(), Err(StoreError::Conflict { .. })));
        assert!(repo.get(u.id.as_str()).unwrap().entity.email_confirmed);
    }

    #[test]
    fn query_applies_specification() {
        let (backend, repo) = setup();
        let mut uow = UnitOfWork::new(Arc::clone(&backend), "seed");
        let mut verified = User::new("v@x.y", "V", Utc::now());
        verified.email_confirmed = true;
        repo.insert(&mut uow, &verified).unwrap();
        repo.insert(&mut uow, &User::new("u@x.y", "U", Utc::now()))
            .unwrap();
        uow.commit().unwrap();

        let hits = repo.query(&user::unverified()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity.email, "u@x.y");
        assert_eq!(repo.count(&Specification::all()).unwrap(), 2);
    }

    #[test]
    fn mark_deleted_skips_already_deleted() {
        let (backend, repo) = setup();
        let mut u = User::new("d@x.y", "D", Utc::now());
        u.deleted_at = Some(Utc::now());
        let mut uow = UnitOfWork::new(Arc::clone(&backend), "seed");
        repo.insert(&mut uow, &u).unwrap();
        uow.commit().unwrap();

        let read = repo.get(u.id.as_str()).unwrap();
        let mut uow = UnitOfWork::new(Arc::clone(&backend), "delete");
        assert!(!repo.mark_deleted(&mut uow, &read, Utc::now()).unwrap());
        assert!(uow.is_empty());
    }
}
