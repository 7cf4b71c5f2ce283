//! Batch allocation.
//!
//! A batch is a sequence of independent allocations, each with its own unit of work.
//! No lock is held across elements, so a reset boundary crossed mid-batch shows up
//! in the later elements.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use tracing::warn;

use crate::domain::{AllocationRecord, ContextData};
use crate::error::{AppError, Result};
use crate::service::allocator::SequenceAllocator;
use crate::service::clock::Clock;

/// Issues several codes by repeated allocation.
#[derive(Clone)]
pub struct BatchCoordinator {
    allocator: Arc<SequenceAllocator>,
    clock: Clock,
}

impl BatchCoordinator {
    /// Create a coordinator reading the current instant from `clock`.
    #[must_use]
    pub const fn new(allocator: Arc<SequenceAllocator>, clock: Clock) -> Self {
        Self { allocator, clock }
    }

    /// Allocate `count` codes in order.
    ///
    /// With no explicit instant the clock is re-read for every element. A failure at
    /// element k aborts the batch and is returned; elements before k stay committed.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if `count` is zero, otherwise the error of the first
    /// failing element.
    pub async fn allocate_many(
        &self,
        slug: &str,
        data: &ContextData,
        explicit_now: Option<DateTime<FixedOffset>>,
        count: u32,
    ) -> Result<Vec<AllocationRecord>> {
        if count == 0 {
            return Err(AppError::BadRequest("count must be at least 1".to_string()));
        }

        let mut records = Vec::with_capacity(count as usize);

        for index in 0..count {
            let now = explicit_now.unwrap_or_else(|| self.clock.now());

            match self.allocator.allocate(slug, data, now).await {
                Ok(record) => records.push(record),
                Err(err) => {
                    if !records.is_empty() {
                        warn!(
                            slug,
                            committed = records.len(),
                            failed_at = index + 1,
                            error = %err,
                            "Batch aborted after partial success"
                        );
                    }
                    return Err(err);
                }
            }
        }

        Ok(records)
    }
}
