use crate::persistence::{Mutation, Persistence};
use crate::StoreError;
use std::sync::Arc;
use tracing::debug;

/// Buffer of staged mutations that commits as a single atomic batch.
///
/// Staging the same record twice collapses into one mutation: the later
/// content wins, the earlier precondition is kept. A unit dropped without
/// committing discards its mutations.
pub struct UnitOfWork {
    backend: Arc<dyn Persistence>,
    label: String,
    staged: Vec<Mutation>,
}

impl UnitOfWork {
    pub fn new(backend: Arc<dyn Persistence>, label: impl Into<String>) -> Self {
        Self {
            backend,
            label: label.into(),
            staged: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn stage(&mut self, mutation: Mutation) {
        if let Some(existing) = self.staged.iter_mut().find(|m| m.same_record(&mutation)) {
            existing.kind = mutation.kind;
        } else {
            self.staged.push(mutation);
        }
    }

    pub fn staged(&self) -> &[Mutation] {
        &self.staged
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Apply every staged mutation atomically. Returns the number applied.
    pub fn commit(mut self) -> Result<usize, StoreError> {
        let batch = std::mem::take(&mut self.staged);
        if batch.is_empty() {
            return Ok(0);
        }
        self.backend.apply(&self.label, &batch)?;
        Ok(batch.len())
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !self.staged.is_empty() {
            debug!(
                "unit of work '{}' dropped with {} uncommitted mutations",
                self.label,
                self.staged.len()
            );
        }
    }
}
