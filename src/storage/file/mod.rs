//! File-based storage backend.
//!
//! This backend stores logic definitions as JSON files and allocations as an
//! append-only JSON-lines log per slug, with file locking for the per-slug unit of
//! work. Suitable for development and single-node deployments.
//!
//! Directory structure:
//! ```text
//! data/
//! ├── logics/
//! │   └── {slug}.json
//! ├── allocations/
//! │   └── {slug}/
//! │       ├── log.jsonl
//! │       └── tail.json
//! └── locks/
//!     └── {slug}.lock
//! ```

mod allocation;
mod lock;
mod logic;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::FileStorageConfig;
use crate::domain::{AllocationRecord, IdentifierLogic};
use crate::error::{StorageError, StorageResult};
use crate::storage::traits::{AllocationStorage, LogicStorage, Storage, UnitOfWork};

pub use allocation::{FileAllocationLog, FileUnitOfWork, TailIndex};
pub use lock::{SlugLockGuard, SlugLocks};
pub use logic::FileLogicStore;

/// Sanitize a name for use as a file name.
pub(crate) fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// File-based storage implementation.
pub struct FileStorage {
    /// Base data directory.
    base_dir: PathBuf,
    /// Logic definitions.
    logics: Arc<FileLogicStore>,
    /// Allocation logs.
    allocations: Arc<FileAllocationLog>,
    /// Per-slug locks.
    locks: Arc<SlugLocks>,
}

impl FileStorage {
    /// Create a new file storage instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directories cannot be created.
    pub fn new(config: &FileStorageConfig) -> StorageResult<Self> {
        let base_dir = config.data_dir.clone();

        Self::ensure_directories(&base_dir)?;

        Ok(Self {
            logics: Arc::new(FileLogicStore::new(base_dir.join("logics"))),
            allocations: Arc::new(FileAllocationLog::new(base_dir.join("allocations"))),
            locks: Arc::new(SlugLocks::new(
                base_dir.join("locks"),
                config.lock_timeout(),
            )),
            base_dir,
        })
    }

    /// Ensure all required directories exist.
    fn ensure_directories(base_dir: &Path) -> StorageResult<()> {
        let dirs = [
            base_dir.to_path_buf(),
            base_dir.join("logics"),
            base_dir.join("allocations"),
            base_dir.join("locks"),
        ];

        for dir in &dirs {
            std::fs::create_dir_all(dir).map_err(|e| {
                StorageError::FileIO(format!("Failed to create directory {}: {e}", dir.display()))
            })?;
        }

        Ok(())
    }
}

#[async_trait]
impl LogicStorage for FileStorage {
    async fn save_logic(&self, logic: &IdentifierLogic) -> StorageResult<()> {
        // Writers of a logic take the slug lock so updates are ordered against allocations.
        let _guard = self.locks.acquire(&logic.slug).await?;
        self.logics.save(logic)
    }

    async fn create_logic(&self, logic: &IdentifierLogic) -> StorageResult<bool> {
        let _guard = self.locks.acquire(&logic.slug).await?;
        if self.logics.get(&logic.slug)?.is_some() {
            return Ok(false);
        }
        self.logics.save(logic)?;
        Ok(true)
    }

    async fn get_logic(&self, slug: &str) -> StorageResult<Option<IdentifierLogic>> {
        self.logics.get(slug)
    }

    async fn list_logics(&self) -> StorageResult<Vec<IdentifierLogic>> {
        self.logics.list()
    }
}

#[async_trait]
impl AllocationStorage for FileStorage {
    async fn begin(&self) -> StorageResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(FileUnitOfWork::new(
            Arc::clone(&self.logics),
            Arc::clone(&self.allocations),
            Arc::clone(&self.locks),
        )))
    }

    async fn list_allocations(
        &self,
        slug: &str,
        limit: u32,
    ) -> StorageResult<Vec<AllocationRecord>> {
        self.allocations.read_recent(slug, limit as usize)
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn health_check(&self) -> StorageResult<()> {
        if !self.base_dir.exists() {
            return Err(StorageError::Unavailable);
        }

        // Try to create a test file
        let test_file = self.base_dir.join(".health_check");
        tokio::fs::write(&test_file, b"ok")
            .await
            .map_err(|e| StorageError::FileIO(format!("Health check failed: {e}")))?;
        tokio::fs::remove_file(&test_file)
            .await
            .map_err(|e| StorageError::FileIO(format!("Health check cleanup failed: {e}")))?;

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
