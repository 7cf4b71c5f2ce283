//! Logic lookup.
//!
//! Every allocation reads its logic through here; there is no process-wide cache, so
//! administrative updates are seen by the next allocation.

use std::sync::Arc;

use crate::domain::IdentifierLogic;
use crate::error::{AppError, Result};
use crate::storage::{DynStorage, UnitOfWork};

/// Read path for active logic definitions.
#[derive(Clone)]
pub struct LogicRepository {
    storage: Arc<DynStorage>,
}

impl LogicRepository {
    /// Create a repository over `storage`.
    #[must_use]
    pub fn new(storage: Arc<DynStorage>) -> Self {
        Self { storage }
    }

    /// Find an active logic without locking it.
    ///
    /// # Errors
    ///
    /// Returns `LogicNotFound` if no active logic has this slug.
    pub async fn find(&self, slug: &str) -> Result<IdentifierLogic> {
        self.storage
            .get_logic(slug)
            .await?
            .filter(IdentifierLogic::is_allocatable)
            .ok_or_else(|| AppError::LogicNotFound(slug.to_string()))
    }

    /// Find an active logic inside `uow`, taking its exclusive lock.
    ///
    /// A deactivation committed before the lock is granted is observed here.
    ///
    /// # Errors
    ///
    /// Returns `LogicNotFound` if no active logic has this slug, or the storage error
    /// (including lock timeouts) raised while locking.
    pub async fn find_for_update(
        uow: &mut dyn UnitOfWork,
        slug: &str,
    ) -> Result<IdentifierLogic> {
        uow.lock_active_logic(slug)
            .await?
            .ok_or_else(|| AppError::LogicNotFound(slug.to_string()))
    }
}
