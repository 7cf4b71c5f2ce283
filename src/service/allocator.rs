//! Sequence allocation.
//!
//! One allocation is one unit of work: lock the logic, derive the epoch token, read
//! the previous allocation for that token (for calendar modes, the highest one inside
//! the current calendar window), apply the reset policy, render, insert and commit.
//! Any failure rolls the unit of work back, so no record and no lock survive it, and
//! retrying from scratch is always safe.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, FixedOffset, Utc};
use metrics::{counter, histogram};
use tracing::{debug, warn};

use crate::domain::{AllocationRecord, ContextData, NewAllocation};
use crate::error::{AppError, Result};
use crate::service::render::render;
use crate::service::repository::LogicRepository;
use crate::service::reset::{calendar_window, should_reset};
use crate::service::token::build_token;
use crate::storage::{DynStorage, UnitOfWork};

/// Outcome of a successful allocation.
struct Allocation {
    record: AllocationRecord,
    reset: bool,
}

/// Allocates sequence numbers and records them in the allocation log.
#[derive(Clone)]
pub struct SequenceAllocator {
    storage: Arc<DynStorage>,
}

impl SequenceAllocator {
    /// Create an allocator over `storage`.
    #[must_use]
    pub fn new(storage: Arc<DynStorage>) -> Self {
        Self { storage }
    }

    /// Allocate the next code for `slug` at instant `now`.
    ///
    /// # Errors
    ///
    /// - `LogicNotFound` if no active logic has this slug
    /// - `Transaction` on lock timeout, conflict or failed commit (retryable)
    /// - `Storage` if the store is unreachable or corrupt
    pub async fn allocate(
        &self,
        slug: &str,
        data: &ContextData,
        now: DateTime<FixedOffset>,
    ) -> Result<AllocationRecord> {
        let started = Instant::now();
        let result = self.allocate_once(slug, data, &now).await;
        histogram!("seqmint_allocation_duration_seconds").record(started.elapsed().as_secs_f64());

        match result {
            Ok(allocation) => {
                counter!("seqmint_allocations_total", "slug" => slug.to_string()).increment(1);
                if allocation.reset {
                    counter!("seqmint_epoch_resets_total", "slug" => slug.to_string())
                        .increment(1);
                }
                Ok(allocation.record)
            }
            Err(err) => {
                counter!(
                    "seqmint_allocation_failures_total",
                    "slug" => slug.to_string(),
                    "kind" => err.kind()
                )
                .increment(1);
                Err(err)
            }
        }
    }

    async fn allocate_once(
        &self,
        slug: &str,
        data: &ContextData,
        now: &DateTime<FixedOffset>,
    ) -> Result<Allocation> {
        let mut uow = self.storage.begin().await?;

        match Self::next_allocation(uow.as_mut(), slug, data, now).await {
            Ok(allocation) => {
                uow.commit().await.map_err(AppError::Transaction)?;
                debug!(
                    slug,
                    epoch_token = %allocation.record.epoch_token,
                    sequence_number = allocation.record.sequence_number,
                    reset = allocation.reset,
                    code = %allocation.record.rendered_code,
                    "Allocated"
                );
                Ok(allocation)
            }
            Err(err) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(slug, error = %rollback_err, "Rollback failed");
                }
                if matches!(err, AppError::LogicNotFound(_)) {
                    debug!(slug, "No active logic");
                } else {
                    warn!(slug, error = %err, "Allocation rolled back");
                }
                Err(err)
            }
        }
    }

    /// Steps inside the unit of work, up to but excluding commit.
    async fn next_allocation(
        uow: &mut dyn UnitOfWork,
        slug: &str,
        data: &ContextData,
        now: &DateTime<FixedOffset>,
    ) -> Result<Allocation> {
        let logic = LogicRepository::find_for_update(uow, slug).await?;

        let epoch_token = build_token(&logic.reset_keys, data, now);

        let (sequence_number, reset) = match calendar_window(logic.reset_mode, now) {
            // A calendar sequence continues from the highest number issued in the
            // window of `now`, which also holds for a replayed historical date.
            Some(window) => {
                match uow
                    .max_allocation_in(&logic.slug, &epoch_token, &window)
                    .await?
                {
                    Some(prev) => (next_number(slug, &prev)?, false),
                    None => {
                        let previous = uow.last_allocation(&logic.slug, &epoch_token).await?;
                        (logic.starting_number, previous.is_some())
                    }
                }
            }
            None => match uow.last_allocation(&logic.slug, &epoch_token).await? {
                None => (logic.starting_number, false),
                Some(prev)
                    if should_reset(
                        logic.reset_mode,
                        &prev.created_at,
                        now,
                        &epoch_token,
                        &prev.epoch_token,
                    ) =>
                {
                    (logic.starting_number, true)
                }
                Some(prev) => (next_number(slug, &prev)?, false),
            },
        };

        let rendered_code = render(&logic.format, data, now, sequence_number, logic.pad_width);

        let record = uow
            .insert_allocation(NewAllocation {
                slug: logic.slug,
                epoch_token,
                sequence_number,
                rendered_code,
                created_at: now.with_timezone(&Utc),
            })
            .await?;

        Ok(Allocation { record, reset })
    }
}

fn next_number(slug: &str, previous: &AllocationRecord) -> Result<i64> {
    previous
        .sequence_number
        .checked_add(1)
        .ok_or_else(|| AppError::Internal(format!("sequence for '{slug}' exhausted")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileStorageConfig;
    use crate::domain::{IdentifierLogic, ResetMode, context};
    use crate::storage::file::FileStorage;
    use crate::storage::{AllocationStorage, LogicStorage};
    use chrono::{NaiveDate, TimeZone};
    use tempfile::TempDir;

    async fn setup(logic: IdentifierLogic) -> (SequenceAllocator, Arc<FileStorage>, TempDir) {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(
            FileStorage::new(&FileStorageConfig {
                data_dir: temp.path().to_path_buf(),
                lock_timeout_ms: 5000,
            })
            .unwrap(),
        );
        storage.save_logic(&logic).await.unwrap();
        (SequenceAllocator::new(storage.clone()), storage, temp)
    }

    fn day(y: i32, m: u32, d: u32) -> DateTime<FixedOffset> {
        let naive = NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        FixedOffset::east_opt(0)
            .unwrap()
            .from_local_datetime(&naive)
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_allocation_uses_starting_number() {
        let logic = IdentifierLogic::new("invoice", "INV-{#####}", ResetMode::None)
            .with_starting_number(100)
            .with_pad_width(5);
        let (allocator, _storage, _temp) = setup(logic).await;

        let first = allocator
            .allocate("invoice", &ContextData::new(), day(2025, 1, 1))
            .await
            .unwrap();
        let second = allocator
            .allocate("invoice", &ContextData::new(), day(2025, 1, 1))
            .await
            .unwrap();

        assert_eq!(first.rendered_code, "INV-00100");
        assert_eq!(second.sequence_number, 101);
    }

    #[tokio::test]
    async fn test_monthly_reset() {
        let logic = IdentifierLogic::new("employee", "EMP-{YYYY}-{MM}-{#####}", ResetMode::Monthly)
            .with_pad_width(5);
        let (allocator, _storage, _temp) = setup(logic).await;
        let data = ContextData::new();

        let a = allocator.allocate("employee", &data, day(2025, 11, 30)).await.unwrap();
        let b = allocator.allocate("employee", &data, day(2025, 11, 30)).await.unwrap();
        let c = allocator.allocate("employee", &data, day(2025, 12, 1)).await.unwrap();

        assert_eq!(
            (a.sequence_number, b.sequence_number, c.sequence_number),
            (1, 2, 1)
        );
        assert_eq!(c.rendered_code, "EMP-2025-12-00001");
    }

    #[tokio::test]
    async fn test_replayed_month_continues_its_window() {
        let logic = IdentifierLogic::new("employee", "EMP-{YYYY}-{MM}-{#####}", ResetMode::Monthly)
            .with_pad_width(5);
        let (allocator, _storage, _temp) = setup(logic).await;
        let data = ContextData::new();

        allocator.allocate("employee", &data, day(2025, 11, 10)).await.unwrap();
        allocator.allocate("employee", &data, day(2025, 11, 11)).await.unwrap();
        let december = allocator.allocate("employee", &data, day(2025, 12, 1)).await.unwrap();
        let replay = allocator.allocate("employee", &data, day(2025, 11, 12)).await.unwrap();
        let back = allocator.allocate("employee", &data, day(2025, 12, 2)).await.unwrap();

        assert_eq!(december.rendered_code, "EMP-2025-12-00001");
        assert_eq!(replay.rendered_code, "EMP-2025-11-00003");
        assert_eq!(back.rendered_code, "EMP-2025-12-00002");
    }

    #[tokio::test]
    async fn test_token_based_sequences_are_independent() {
        let logic = IdentifierLogic::new("order", "{CUSTOMER}-{####}", ResetMode::TokenBased)
            .with_reset_keys(["CUSTOMER"]);
        let (allocator, _storage, _temp) = setup(logic).await;
        let acme = context([("CUSTOMER", "ACME")]);
        let other = context([("CUSTOMER", "OTHER")]);

        let a1 = allocator.allocate("order", &acme, day(2025, 1, 1)).await.unwrap();
        let o1 = allocator.allocate("order", &other, day(2025, 1, 1)).await.unwrap();
        let a2 = allocator.allocate("order", &acme, day(2025, 1, 2)).await.unwrap();

        assert_eq!(a1.rendered_code, "ACME-0001");
        assert_eq!(o1.rendered_code, "OTHER-0001");
        assert_eq!(a2.rendered_code, "ACME-0002");
        assert_eq!(a1.epoch_token, "ACME");
    }

    #[tokio::test]
    async fn test_unknown_slug_leaves_no_lock() {
        let logic = IdentifierLogic::new("invoice", "INV-{####}", ResetMode::None);
        let (allocator, storage, _temp) = setup(logic).await;

        let result = allocator
            .allocate("missing", &ContextData::new(), day(2025, 1, 1))
            .await;
        assert!(matches!(result, Err(AppError::LogicNotFound(_))));

        // The slug lock was released with the unit of work.
        let mut uow = storage.begin().await.unwrap();
        assert!(uow.lock_active_logic("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_allocations_are_unique() {
        let logic = IdentifierLogic::new("ticket", "T-{######}", ResetMode::None).with_pad_width(6);
        let (allocator, storage, _temp) = setup(logic).await;

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let allocator = allocator.clone();
                tokio::spawn(async move {
                    allocator
                        .allocate("ticket", &ContextData::new(), day(2025, 1, 1))
                        .await
                })
            })
            .collect();

        let mut numbers = Vec::new();
        for task in tasks {
            numbers.push(task.await.unwrap().unwrap().sequence_number);
        }
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=16).collect::<Vec<i64>>());

        let logged = storage.list_allocations("ticket", 100).await.unwrap();
        assert_eq!(logged.len(), 16);
    }
}
