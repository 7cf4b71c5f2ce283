//! Caller-facing identifier generation.

use std::sync::Arc;

use crate::config::SequenceConfig;
use crate::domain::{ContextData, Generated};
use crate::error::{AppError, Result};
use crate::service::allocator::SequenceAllocator;
use crate::service::batch::BatchCoordinator;
use crate::service::clock::Clock;
use crate::storage::DynStorage;

/// Service generating formatted identifiers.
pub struct IdentifierService {
    batch: BatchCoordinator,
    clock: Clock,
    max_batch_size: u32,
}

impl IdentifierService {
    /// Create a new identifier service.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured UTC offset is invalid.
    pub fn new(storage: Arc<DynStorage>, config: &SequenceConfig) -> Result<Self> {
        let clock = Clock::from_offset_minutes(config.utc_offset_minutes)?;
        let allocator = Arc::new(SequenceAllocator::new(storage));

        Ok(Self {
            batch: BatchCoordinator::new(allocator, clock),
            clock,
            max_batch_size: config.max_batch_size,
        })
    }

    /// Clock used for allocation instants.
    #[must_use]
    pub const fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Generate one or more identifiers.
    ///
    /// # Arguments
    ///
    /// * `slug` - Logic slug
    /// * `data` - Context data for placeholders and the epoch token
    /// * `explicit_date` - Allocation date override; the clock is used when absent
    /// * `count` - Number of identifiers (default 1)
    ///
    /// # Returns
    ///
    /// A single code when `count` is absent or 1, otherwise the codes in order.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for an empty slug, an out-of-range count or an
    /// unparseable date, and allocation errors otherwise.
    pub async fn generate(
        &self,
        slug: &str,
        data: Option<ContextData>,
        explicit_date: Option<&str>,
        count: Option<u32>,
    ) -> Result<Generated> {
        if slug.trim().is_empty() {
            return Err(AppError::BadRequest("slug is required".to_string()));
        }

        let count = count.unwrap_or(1);
        if count == 0 || count > self.max_batch_size {
            return Err(AppError::BadRequest(format!(
                "count must be between 1 and {}",
                self.max_batch_size
            )));
        }

        let explicit_now = explicit_date.map(|d| self.clock.parse(d)).transpose()?;
        let data = data.unwrap_or_default();

        let mut codes: Vec<String> = self
            .batch
            .allocate_many(slug, &data, explicit_now, count)
            .await?
            .into_iter()
            .map(|record| record.rendered_code)
            .collect();

        if count == 1 {
            let code = codes
                .pop()
                .ok_or_else(|| AppError::Internal("allocation returned no code".to_string()))?;
            Ok(Generated::Single { code })
        } else {
            Ok(Generated::Batch { codes })
        }
    }
}
