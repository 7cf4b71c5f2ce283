//! Per-slug exclusive locks.
//!
//! Two layers: an in-process async mutex per slug, so tasks of one process queue
//! fairly instead of polling, and an `flock` on `locks/{slug}.lock` for coordination
//! between processes sharing the data directory.
//! Note: File locks may not work correctly on all network filesystems.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use fs2::FileExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::sleep;

use super::sanitize_name;
use crate::error::{StorageError, StorageResult};

/// Delay between attempts to take a contended file lock.
const RETRY_DELAY: Duration = Duration::from_millis(10);

/// Lock manager for slugs.
pub struct SlugLocks {
    /// Directory for lock files.
    locks_dir: PathBuf,
    /// In-process lock per slug.
    local: DashMap<String, Arc<Mutex<()>>>,
    /// Maximum time to wait for a lock.
    timeout: Duration,
}

/// Held lock on one slug; released on drop.
pub struct SlugLockGuard {
    slug: String,
    // The flock is released when this handle closes.
    _file: std::fs::File,
    _local: OwnedMutexGuard<()>,
}

impl SlugLockGuard {
    /// Locked slug.
    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }
}

impl SlugLocks {
    /// Create a new lock manager.
    #[must_use]
    pub fn new(locks_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            locks_dir,
            local: DashMap::new(),
            timeout,
        }
    }

    /// Get the lock file path for a slug.
    fn lock_path(&self, slug: &str) -> PathBuf {
        self.locks_dir.join(format!("{}.lock", sanitize_name(slug)))
    }

    /// Acquire the exclusive lock on `slug`, waiting up to the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` if the lock is not obtained in time.
    pub async fn acquire(&self, slug: &str) -> StorageResult<SlugLockGuard> {
        let deadline = Instant::now() + self.timeout;

        let local = Arc::clone(self.local.entry(slug.to_string()).or_default().value());
        let local_guard = tokio::time::timeout(self.timeout, local.lock_owned())
            .await
            .map_err(|_| {
                StorageError::LockTimeout(format!(
                    "slug '{slug}' still locked after {}ms",
                    self.timeout.as_millis()
                ))
            })?;

        std::fs::create_dir_all(&self.locks_dir)?;
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path(slug))?;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(StorageError::LockTimeout(format!(
                            "slug '{slug}' locked by another process after {}ms",
                            self.timeout.as_millis()
                        )));
                    }
                    sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(StorageError::LockFailed(e.to_string())),
            }
        }

        tracing::trace!(slug, "Slug lock acquired");

        Ok(SlugLockGuard {
            slug: slug.to_string(),
            _file: file,
            _local: local_guard,
        })
    }

    /// Check whether any process currently holds the file lock for `slug`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be inspected.
    pub fn is_locked(&self, slug: &str) -> StorageResult<bool> {
        let path = self.lock_path(slug);

        let file = match std::fs::OpenOptions::new().read(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        match file.try_lock_exclusive() {
            Ok(()) => Ok(false),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(true),
            Err(e) => Err(StorageError::LockFailed(e.to_string())),
        }
    }
}
