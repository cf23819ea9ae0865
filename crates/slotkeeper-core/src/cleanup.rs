use crate::config::CleanupConfig;
use crate::CoreError;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use slotkeeper_schema::{user, Specification, User, UserId};
use slotkeeper_store::{Persistence, Repository, UnitOfWork};
use std::sync::Arc;
use tracing::{debug, info};

/// Soft-deletes accounts whose email was never confirmed within the grace period.
pub struct CleanupJob {
    backend: Arc<dyn Persistence>,
    users: Repository<User>,
    grace: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub count: usize,
    pub ids: Vec<UserId>,
    pub dry_run: bool,
}

impl CleanupJob {
    pub fn new(backend: Arc<dyn Persistence>, grace: Duration) -> Self {
        Self {
            users: Repository::new(Arc::clone(&backend)),
            backend,
            grace,
        }
    }

    pub fn from_config(backend: Arc<dyn Persistence>, config: &CleanupConfig) -> Self {
        Self::new(backend, Duration::days(i64::from(config.grace_days)))
    }

    /// Unverified, live accounts created before `now - grace`.
    pub fn candidates(&self, now: DateTime<Utc>) -> Specification<User> {
        (user::unverified() & user::created_before(now - self.grace) & Specification::not_deleted())
            .named("stale unverified accounts")
    }

    /// List what [`run`](Self::run) would delete, without writing.
    pub fn dry_run(&self, now: DateTime<Utc>) -> Result<CleanupReport, CoreError> {
        let ids: Vec<UserId> = self
            .users
            .query(&self.candidates(now))?
            .into_iter()
            .map(|v| v.entity.id)
            .collect();
        Ok(CleanupReport {
            count: ids.len(),
            ids,
            dry_run: true,
        })
    }

    /// Soft-delete every candidate in a single commit.
    pub fn run(&self, now: DateTime<Utc>) -> Result<CleanupReport, CoreError> {
        let spec = self.candidates(now);
        debug!("cleanup selecting: {}", spec.describe());
        let stale = self.users.query(&spec)?;

        let mut uow = UnitOfWork::new(Arc::clone(&self.backend), "cleanup");
        let mut ids = Vec::with_capacity(stale.len());
        for current in &stale {
            if self.users.mark_deleted(&mut uow, current, now)? {
                ids.push(current.entity.id.clone());
            }
        }
        uow.commit()?;
        info!("cleanup soft-deleted {} unverified accounts", ids.len());
        Ok(CleanupReport {
            count: ids.len(),
            ids,
            dry_run: false,
        })
    }
}
