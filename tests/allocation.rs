//! Allocation engine tests against the file backend.
//!
//! These exercise the properties callers rely on: uniqueness under concurrency,
//! calendar and token resets, and that a failed allocation leaves nothing behind so
//! the retry sees the same state.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use tempfile::TempDir;

use seqmint::config::FileStorageConfig;
use seqmint::domain::{
    AllocationRecord, CalendarWindow, ContextData, IdentifierLogic, NewAllocation, ResetMode,
    context,
};
use seqmint::error::{AppError, StorageError, StorageResult};
use seqmint::service::{BatchCoordinator, Clock, SequenceAllocator};
use seqmint::storage::file::FileStorage;
use seqmint::storage::{AllocationStorage, LogicStorage, Storage, UnitOfWork};

// ============================================================================
// Test Harness
// ============================================================================

fn open_storage(dir: &TempDir) -> Arc<FileStorage> {
    Arc::new(
        FileStorage::new(&FileStorageConfig {
            data_dir: dir.path().to_path_buf(),
            lock_timeout_ms: 10_000,
        })
        .expect("Failed to create storage"),
    )
}

async fn storage_with(logic: IdentifierLogic) -> (Arc<FileStorage>, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let storage = open_storage(&temp_dir);
    storage.save_logic(&logic).await.expect("Failed to save logic");
    (storage, temp_dir)
}

fn at(value: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(value).expect("Invalid test timestamp")
}

/// Failure to inject into one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    None,
    Insert,
    Commit,
}

/// Storage wrapper whose units of work fail on demand.
///
/// Each `begin` takes the next planned fault; once the plan is exhausted units of work
/// behave normally.
struct FaultyStorage {
    inner: Arc<FileStorage>,
    plan: Mutex<VecDeque<Fault>>,
}

impl FaultyStorage {
    fn new(inner: Arc<FileStorage>, plan: impl IntoIterator<Item = Fault>) -> Self {
        Self {
            inner,
            plan: Mutex::new(plan.into_iter().collect()),
        }
    }
}

#[async_trait]
impl LogicStorage for FaultyStorage {
    async fn save_logic(&self, logic: &IdentifierLogic) -> StorageResult<()> {
        self.inner.save_logic(logic).await
    }

    async fn create_logic(&self, logic: &IdentifierLogic) -> StorageResult<bool> {
        self.inner.create_logic(logic).await
    }

    async fn get_logic(&self, slug: &str) -> StorageResult<Option<IdentifierLogic>> {
        self.inner.get_logic(slug).await
    }

    async fn list_logics(&self) -> StorageResult<Vec<IdentifierLogic>> {
        self.inner.list_logics().await
    }
}

#[async_trait]
impl AllocationStorage for FaultyStorage {
    async fn begin(&self) -> StorageResult<Box<dyn UnitOfWork>> {
        let fault = self
            .plan
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Fault::None);
        Ok(Box::new(FaultyUnitOfWork {
            inner: self.inner.begin().await?,
            fault,
        }))
    }

    async fn list_allocations(
        &self,
        slug: &str,
        limit: u32,
    ) -> StorageResult<Vec<AllocationRecord>> {
        self.inner.list_allocations(slug, limit).await
    }
}

#[async_trait]
impl Storage for FaultyStorage {
    async fn health_check(&self) -> StorageResult<()> {
        self.inner.health_check().await
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}

struct FaultyUnitOfWork {
    inner: Box<dyn UnitOfWork>,
    fault: Fault,
}

#[async_trait]
impl UnitOfWork for FaultyUnitOfWork {
    async fn lock_active_logic(&mut self, slug: &str) -> StorageResult<Option<IdentifierLogic>> {
        self.inner.lock_active_logic(slug).await
    }

    async fn last_allocation(
        &mut self,
        slug: &str,
        epoch_token: &str,
    ) -> StorageResult<Option<AllocationRecord>> {
        self.inner.last_allocation(slug, epoch_token).await
    }

    async fn max_allocation_in(
        &mut self,
        slug: &str,
        epoch_token: &str,
        window: &CalendarWindow,
    ) -> StorageResult<Option<AllocationRecord>> {
        self.inner.max_allocation_in(slug, epoch_token, window).await
    }

    async fn insert_allocation(
        &mut self,
        allocation: NewAllocation,
    ) -> StorageResult<AllocationRecord> {
        if self.fault == Fault::Insert {
            return Err(StorageError::Query("injected insert failure".to_string()));
        }
        self.inner.insert_allocation(allocation).await
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        if self.fault == Fault::Commit {
            self.inner.rollback().await?;
            return Err(StorageError::Conflict("injected commit failure".to_string()));
        }
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        self.inner.rollback().await
    }
}

// ============================================================================
// Uniqueness
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_allocations_unique_and_contiguous() {
    let (storage, _temp) = storage_with(
        IdentifierLogic::new("ticket", "TCK-{######}", ResetMode::None).with_pad_width(6),
    )
    .await;
    let allocator = Arc::new(SequenceAllocator::new(storage.clone()));

    let tasks: Vec<_> = (0..40)
        .map(|_| {
            let allocator = Arc::clone(&allocator);
            tokio::spawn(async move {
                allocator
                    .allocate("ticket", &ContextData::new(), at("2025-03-01T09:00:00Z"))
                    .await
            })
        })
        .collect();

    let mut codes = HashSet::new();
    for task in tasks {
        let record = task.await.unwrap().unwrap();
        assert!(codes.insert(record.rendered_code));
    }

    let mut numbers: Vec<i64> = storage
        .list_allocations("ticket", 100)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.sequence_number)
        .collect();
    numbers.sort_unstable();
    assert_eq!(numbers, (1..=40).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_instances_sharing_data_dir_do_not_collide() {
    let (first, temp) = storage_with(IdentifierLogic::new("order", "ORD-{####}", ResetMode::None)).await;
    let second = open_storage(&temp);

    let allocators = [
        Arc::new(SequenceAllocator::new(first.clone())),
        Arc::new(SequenceAllocator::new(second)),
    ];

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let allocator = Arc::clone(&allocators[i % 2]);
            tokio::spawn(async move {
                allocator
                    .allocate("order", &ContextData::new(), at("2025-03-01T09:00:00Z"))
                    .await
            })
        })
        .collect();

    let mut numbers = Vec::new();
    for task in tasks {
        numbers.push(task.await.unwrap().unwrap().sequence_number);
    }
    numbers.sort_unstable();
    assert_eq!(numbers, (1..=20).collect::<Vec<_>>());
}

// ============================================================================
// Resets
// ============================================================================

#[tokio::test]
async fn test_monthly_reset_across_month_boundary() {
    let (storage, _temp) = storage_with(
        IdentifierLogic::new("employee", "EMP-{YYYY}-{MM}-{#####}", ResetMode::Monthly)
            .with_pad_width(5),
    )
    .await;
    let allocator = SequenceAllocator::new(storage);
    let data = ContextData::new();

    let codes = [
        "2025-11-04T08:00:00Z",
        "2025-11-30T23:59:59Z",
        "2025-12-01T00:00:00Z",
        "2025-12-01T00:00:01Z",
    ];
    let mut rendered = Vec::new();
    for now in codes {
        rendered.push(allocator.allocate("employee", &data, at(now)).await.unwrap().rendered_code);
    }

    assert_eq!(
        rendered,
        vec![
            "EMP-2025-11-00001",
            "EMP-2025-11-00002",
            "EMP-2025-12-00001",
            "EMP-2025-12-00002",
        ]
    );
}

#[tokio::test]
async fn test_replayed_earlier_month_does_not_reissue() {
    let (storage, temp) = storage_with(
        IdentifierLogic::new("employee", "EMP-{YYYY}-{MM}-{#####}", ResetMode::Monthly)
            .with_pad_width(5),
    )
    .await;
    let allocator = SequenceAllocator::new(storage.clone());
    let data = ContextData::new();

    let mut codes = HashSet::new();
    for now in [
        "2025-11-10T10:00:00Z",
        "2025-11-11T10:00:00Z",
        "2025-12-01T10:00:00Z",
        "2025-11-12T10:00:00Z",
        "2025-12-02T10:00:00Z",
    ] {
        let record = allocator.allocate("employee", &data, at(now)).await.unwrap();
        assert!(codes.insert(record.rendered_code.clone()), "reissued {}", record.rendered_code);
    }

    // A restarted instance rebuilds its view from disk and agrees.
    let reopened = SequenceAllocator::new(open_storage(&temp));
    let replay = reopened
        .allocate("employee", &data, at("2025-11-13T10:00:00Z"))
        .await
        .unwrap();
    assert_eq!(replay.rendered_code, "EMP-2025-11-00004");
    assert!(codes.contains("EMP-2025-11-00003"));
    assert!(codes.contains("EMP-2025-12-00002"));
}

#[tokio::test]
async fn test_replayed_year_continues_with_token() {
    let (storage, _temp) = storage_with(
        IdentifierLogic::new("invoice", "{BRANCH}-{YYYY}-{####}", ResetMode::Yearly)
            .with_reset_keys(["BRANCH"]),
    )
    .await;
    let allocator = SequenceAllocator::new(storage);
    let north = context([("BRANCH", "N")]);

    let a = allocator.allocate("invoice", &north, at("2024-06-01T10:00:00Z")).await.unwrap();
    let b = allocator.allocate("invoice", &north, at("2025-02-01T10:00:00Z")).await.unwrap();
    let c = allocator.allocate("invoice", &north, at("2024-07-01T10:00:00Z")).await.unwrap();

    assert_eq!(a.rendered_code, "N-2024-0001");
    assert_eq!(b.rendered_code, "N-2025-0001");
    assert_eq!(c.rendered_code, "N-2024-0002");
}

#[tokio::test]
async fn test_yearly_reset_uses_starting_number() {
    let (storage, _temp) = storage_with(
        IdentifierLogic::new("invoice", "INV{YY}{####}", ResetMode::Yearly).with_starting_number(500),
    )
    .await;
    let allocator = SequenceAllocator::new(storage);
    let data = ContextData::new();

    let a = allocator.allocate("invoice", &data, at("2024-12-31T12:00:00Z")).await.unwrap();
    let b = allocator.allocate("invoice", &data, at("2024-12-31T13:00:00Z")).await.unwrap();
    let c = allocator.allocate("invoice", &data, at("2025-01-01T00:00:00Z")).await.unwrap();

    assert_eq!(a.rendered_code, "INV240500");
    assert_eq!(b.rendered_code, "INV240501");
    assert_eq!(c.rendered_code, "INV250500");
}

#[tokio::test]
async fn test_token_reset_keeps_per_customer_sequences() {
    let (storage, _temp) = storage_with(
        IdentifierLogic::new("order", "{CUSTOMER}-{####}", ResetMode::TokenBased)
            .with_reset_keys(["CUSTOMER"]),
    )
    .await;
    let allocator = SequenceAllocator::new(storage);
    let acme = context([("CUSTOMER", "ACME")]);
    let other = context([("CUSTOMER", "OTHER")]);
    let now = at("2025-06-01T10:00:00Z");

    let mut rendered = Vec::new();
    for data in [&acme, &acme, &other, &acme, &other] {
        rendered.push(allocator.allocate("order", data, now).await.unwrap().rendered_code);
    }

    assert_eq!(
        rendered,
        vec!["ACME-0001", "ACME-0002", "OTHER-0001", "ACME-0003", "OTHER-0002"]
    );
}

#[tokio::test]
async fn test_missing_context_value_collapses_separators() {
    let (storage, _temp) = storage_with(IdentifierLogic::new(
        "shipment",
        "{REGION}-{YYYY}-{####}",
        ResetMode::None,
    ))
    .await;
    let allocator = SequenceAllocator::new(storage);

    let record = allocator
        .allocate("shipment", &ContextData::new(), at("2025-02-10T10:00:00Z"))
        .await
        .unwrap();
    assert_eq!(record.rendered_code, "2025-0001");
}

// ============================================================================
// Failure and retry
// ============================================================================

#[tokio::test]
async fn test_failed_insert_leaves_no_record() {
    let (inner, _temp) = storage_with(IdentifierLogic::new("invoice", "INV-{####}", ResetMode::None)).await;
    let storage = Arc::new(FaultyStorage::new(inner.clone(), [Fault::Insert]));
    let allocator = SequenceAllocator::new(storage);
    let now = at("2025-01-10T10:00:00Z");

    let result = allocator.allocate("invoice", &ContextData::new(), now).await;
    assert!(matches!(result, Err(AppError::Storage(_))));
    assert!(inner.list_allocations("invoice", 10).await.unwrap().is_empty());

    let retried = allocator.allocate("invoice", &ContextData::new(), now).await.unwrap();
    assert_eq!(retried.rendered_code, "INV-0001");
}

#[tokio::test]
async fn test_failed_commit_is_retryable() {
    let (inner, _temp) = storage_with(IdentifierLogic::new("invoice", "INV-{####}", ResetMode::None)).await;
    let storage = Arc::new(FaultyStorage::new(inner.clone(), [Fault::None, Fault::Commit]));
    let allocator = SequenceAllocator::new(storage);
    let now = at("2025-01-10T10:00:00Z");

    let first = allocator.allocate("invoice", &ContextData::new(), now).await.unwrap();
    assert_eq!(first.sequence_number, 1);

    let err = allocator
        .allocate("invoice", &ContextData::new(), now)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Transaction(_)));
    assert!(err.is_retryable());
    assert_eq!(inner.list_allocations("invoice", 10).await.unwrap().len(), 1);

    let retried = allocator.allocate("invoice", &ContextData::new(), now).await.unwrap();
    assert_eq!(retried.sequence_number, 2);
}

#[tokio::test]
async fn test_batch_partial_failure_keeps_earlier_elements() {
    let (inner, _temp) = storage_with(IdentifierLogic::new("invoice", "INV-{####}", ResetMode::None)).await;
    let storage = Arc::new(FaultyStorage::new(inner.clone(), [Fault::None, Fault::Insert]));
    let batch = BatchCoordinator::new(Arc::new(SequenceAllocator::new(storage)), Clock::utc());

    let result = batch
        .allocate_many("invoice", &ContextData::new(), Some(at("2025-01-10T10:00:00Z")), 3)
        .await;
    assert!(result.is_err());

    let logged = inner.list_allocations("invoice", 10).await.unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].rendered_code, "INV-0001");

    let resumed = batch
        .allocate_many("invoice", &ContextData::new(), None, 2)
        .await
        .unwrap();
    let codes: Vec<_> = resumed.into_iter().map(|r| r.rendered_code).collect();
    assert_eq!(codes, vec!["INV-0002", "INV-0003"]);
}

#[tokio::test]
async fn test_slug_sharing_a_file_name_is_not_found() {
    let (storage, _temp) = storage_with(IdentifierLogic::new("a_b", "AB-{####}", ResetMode::None)).await;
    let allocator = SequenceAllocator::new(storage.clone());
    let now = at("2025-01-10T10:00:00Z");

    let result = allocator.allocate("a.b", &ContextData::new(), now).await;
    assert!(matches!(result, Err(AppError::LogicNotFound(_))));

    let record = allocator.allocate("a_b", &ContextData::new(), now).await.unwrap();
    assert_eq!(record.rendered_code, "AB-0001");
}

#[tokio::test]
async fn test_inactive_logic_is_not_allocatable() {
    let mut logic = IdentifierLogic::new("invoice", "INV-{####}", ResetMode::None);
    logic.active = false;
    let (storage, _temp) = storage_with(logic).await;
    let allocator = SequenceAllocator::new(storage.clone());

    let result = allocator
        .allocate("invoice", &ContextData::new(), at("2025-01-10T10:00:00Z"))
        .await;
    assert!(matches!(result, Err(AppError::LogicNotFound(_))));
    assert!(storage.list_allocations("invoice", 10).await.unwrap().is_empty());
}
