//! Logic administration.
//!
//! Definitions are validated before they are stored. Deletion is soft: the record
//! keeps its slug and history but is no longer visible or allocatable.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::domain::{AllocationRecord, IdentifierLogic, LogicRequest};
use crate::error::{AppError, Result};
use crate::storage::DynStorage;

/// Largest page accepted by the allocation history view.
pub const MAX_HISTORY_LIMIT: u32 = 1000;

/// Service for managing identifier logics.
#[derive(Clone)]
pub struct LogicService {
    storage: Arc<DynStorage>,
}

impl LogicService {
    /// Create a new logic service.
    #[must_use]
    pub fn new(storage: Arc<DynStorage>) -> Self {
        Self { storage }
    }

    /// Create a new logic.
    ///
    /// A slug whose previous logic was deleted may be reused.
    ///
    /// # Errors
    ///
    /// Returns `InvalidLogic` if the definition is invalid and `LogicExists` if the
    /// slug is taken.
    pub async fn create(&self, request: LogicRequest) -> Result<IdentifierLogic> {
        let logic = request.into_logic();
        logic.validate().map_err(AppError::InvalidLogic)?;

        if !self.storage.create_logic(&logic).await? {
            return Err(AppError::LogicExists(logic.slug));
        }

        info!(slug = %logic.slug, format = %logic.format, reset_mode = %logic.reset_mode, "Logic created");

        Ok(logic)
    }

    /// Get a logic, active or not.
    ///
    /// # Errors
    ///
    /// Returns `LogicNotFound` if the slug is unknown or deleted.
    pub async fn get(&self, slug: &str) -> Result<IdentifierLogic> {
        self.storage
            .get_logic(slug)
            .await?
            .ok_or_else(|| AppError::LogicNotFound(slug.to_string()))
    }

    /// List all logics.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn list(&self) -> Result<Vec<IdentifierLogic>> {
        Ok(self.storage.list_logics().await?)
    }

    /// Replace a logic's definition.
    ///
    /// The slug comes from `slug`, `created_at` is preserved and an omitted `active`
    /// flag keeps the current value.
    ///
    /// # Errors
    ///
    /// Returns `LogicNotFound` or `InvalidLogic`.
    pub async fn update(&self, slug: &str, request: LogicRequest) -> Result<IdentifierLogic> {
        let existing = self.get(slug).await?;
        let keep_active = request.active.is_none();

        let mut logic = LogicRequest {
            slug: slug.to_string(),
            ..request
        }
        .into_logic();
        if keep_active {
            logic.active = existing.active;
        }
        logic.created_at = existing.created_at;
        logic.updated_at = Utc::now();

        logic.validate().map_err(AppError::InvalidLogic)?;
        self.storage.save_logic(&logic).await?;
        info!(slug, "Logic updated");

        Ok(logic)
    }

    /// Activate or deactivate a logic.
    ///
    /// # Errors
    ///
    /// Returns `LogicNotFound` if the slug is unknown or deleted.
    pub async fn set_active(&self, slug: &str, active: bool) -> Result<IdentifierLogic> {
        let mut logic = self.get(slug).await?;

        if logic.active != active {
            logic.active = active;
            logic.updated_at = Utc::now();
            self.storage.save_logic(&logic).await?;
            info!(slug, active, "Logic activity changed");
        }

        Ok(logic)
    }

    /// Soft-delete a logic.
    ///
    /// # Errors
    ///
    /// Returns `LogicNotFound` if the slug is unknown or already deleted.
    pub async fn delete(&self, slug: &str) -> Result<()> {
        let mut logic = self.get(slug).await?;

        let now = Utc::now();
        logic.active = false;
        logic.deleted_at = Some(now);
        logic.updated_at = now;
        self.storage.save_logic(&logic).await?;
        info!(slug, "Logic deleted");

        Ok(())
    }

    /// Most recent allocations of a logic, newest first.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for a limit outside `1..=MAX_HISTORY_LIMIT` and
    /// `LogicNotFound` if the slug is unknown or deleted.
    pub async fn allocations(&self, slug: &str, limit: u32) -> Result<Vec<AllocationRecord>> {
        if limit == 0 || limit > MAX_HISTORY_LIMIT {
            return Err(AppError::BadRequest(format!(
                "limit must be between 1 and {MAX_HISTORY_LIMIT}"
            )));
        }

        self.get(slug).await?;
        Ok(self.storage.list_allocations(slug, limit).await?)
    }
}
