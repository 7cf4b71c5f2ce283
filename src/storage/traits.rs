//! Storage trait definitions.
//!
//! These traits define the interface for storage backends, enabling swapping
//! between different implementations without changing business logic.

use async_trait::async_trait;

use crate::domain::{AllocationRecord, CalendarWindow, IdentifierLogic, NewAllocation};
use crate::error::StorageResult;

/// Logic definition storage.
///
/// Used by the administrative surface and for plain, unlocked reads.
#[async_trait]
pub trait LogicStorage: Send + Sync {
    /// Insert or replace a logic definition, keyed by slug.
    async fn save_logic(&self, logic: &IdentifierLogic) -> StorageResult<()>;

    /// Insert a logic unless a non-deleted logic already holds its slug.
    ///
    /// The check and the write are atomic. Returns `false` when the slug is taken.
    async fn create_logic(&self, logic: &IdentifierLogic) -> StorageResult<bool>;

    /// Get a logic definition by slug.
    ///
    /// Returns inactive definitions too; soft-deleted definitions are never returned.
    async fn get_logic(&self, slug: &str) -> StorageResult<Option<IdentifierLogic>>;

    /// List all non-deleted logic definitions, ordered by slug.
    async fn list_logics(&self) -> StorageResult<Vec<IdentifierLogic>>;
}

/// Allocation log storage.
#[async_trait]
pub trait AllocationStorage: Send + Sync {
    /// Begin a unit of work.
    async fn begin(&self) -> StorageResult<Box<dyn UnitOfWork>>;

    /// List the most recent allocations for a slug, newest first.
    async fn list_allocations(&self, slug: &str, limit: u32)
    -> StorageResult<Vec<AllocationRecord>>;
}

/// One atomic unit of work holding a per-logic exclusive lock.
///
/// Nothing written through a unit of work is visible before [`UnitOfWork::commit`].
/// Dropping it without committing discards all pending work and releases the lock,
/// which is what happens when the calling future is cancelled.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Fetch the active logic for `slug`, taking its exclusive lock.
    ///
    /// Concurrent units of work locking the same slug wait until this one ends.
    async fn lock_active_logic(&mut self, slug: &str) -> StorageResult<Option<IdentifierLogic>>;

    /// Most recent allocation for `(slug, epoch_token)`, by allocation order.
    async fn last_allocation(
        &mut self,
        slug: &str,
        epoch_token: &str,
    ) -> StorageResult<Option<AllocationRecord>>;

    /// Allocation with the highest sequence number for `(slug, epoch_token)` whose
    /// timestamp falls inside `window`.
    async fn max_allocation_in(
        &mut self,
        slug: &str,
        epoch_token: &str,
        window: &CalendarWindow,
    ) -> StorageResult<Option<AllocationRecord>>;

    /// Record a new allocation.
    async fn insert_allocation(
        &mut self,
        allocation: NewAllocation,
    ) -> StorageResult<AllocationRecord>;

    /// Make all pending work durable and release the lock.
    async fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Discard all pending work and release the lock.
    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}

/// Combined storage trait for all storage operations.
#[async_trait]
pub trait Storage: LogicStorage + AllocationStorage {
    /// Check if the storage backend is healthy and reachable.
    async fn health_check(&self) -> StorageResult<()>;

    /// Get the storage backend name.
    fn backend_name(&self) -> &'static str;
}

/// Trait object alias for Storage.
pub type DynStorage = dyn Storage;
