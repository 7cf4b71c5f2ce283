//! File-based allocation log.
//!
//! Every slug owns `allocations/{slug}/log.jsonl`, one record per line, and a
//! `tail.json` index with the log length, the last id, the latest record and the
//! newest timestamp per epoch token. The index is rewritten after each commit and rebuilt from the log
//! whenever its recorded length disagrees with the log file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lock::{SlugLockGuard, SlugLocks};
use super::logic::FileLogicStore;
use super::sanitize_name;
use crate::domain::{AllocationRecord, CalendarWindow, IdentifierLogic, NewAllocation};
use crate::error::{StorageError, StorageResult};
use crate::storage::traits::UnitOfWork;

/// Summary of one slug's log, enough to serve `last_allocation` without a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailIndex {
    /// Log length in bytes covered by this index.
    pub log_len: u64,
    /// Highest allocation id in the log.
    pub last_id: i64,
    /// Latest record per epoch token, by allocation order.
    pub latest: BTreeMap<String, AllocationRecord>,
    /// Newest `created_at` per epoch token. Differs from the latest record's
    /// timestamp once a historical date has been replayed.
    #[serde(default)]
    pub newest_at: BTreeMap<String, DateTime<Utc>>,
}

impl TailIndex {
    fn record(&mut self, record: &AllocationRecord) {
        self.last_id = self.last_id.max(record.id);
        self.latest
            .insert(record.epoch_token.clone(), record.clone());
        self.newest_at
            .entry(record.epoch_token.clone())
            .and_modify(|at| *at = (*at).max(record.created_at))
            .or_insert(record.created_at);
    }

    /// Answer a window lookup from the index alone, when it can.
    ///
    /// Numbers inside a window only grow, so a latest record inside the window is
    /// also its highest. A token with nothing at or after `window.start` has nothing
    /// inside it. `None` means the log has to be scanned.
    fn in_window(
        &self,
        epoch_token: &str,
        window: &CalendarWindow,
    ) -> Option<Option<AllocationRecord>> {
        let Some(latest) = self.latest.get(epoch_token) else {
            return Some(None);
        };
        if window.contains(&latest.created_at) {
            return Some(Some(latest.clone()));
        }
        match self.newest_at.get(epoch_token) {
            Some(newest) if *newest < window.start => Some(None),
            _ => None,
        }
    }
}

/// Append-only allocation log.
///
/// Writers must hold the slug's lock; readers of [`FileAllocationLog::read_recent`]
/// do not, and skip a partially written final line.
pub struct FileAllocationLog {
    /// Directory holding one subdirectory per slug.
    allocations_dir: PathBuf,
}

impl FileAllocationLog {
    /// Create a new allocation log rooted at `allocations_dir`.
    #[must_use]
    pub const fn new(allocations_dir: PathBuf) -> Self {
        Self { allocations_dir }
    }

    fn slug_dir(&self, slug: &str) -> PathBuf {
        self.allocations_dir.join(sanitize_name(slug))
    }

    fn log_path(&self, slug: &str) -> PathBuf {
        self.slug_dir(slug).join("log.jsonl")
    }

    fn tail_path(&self, slug: &str) -> PathBuf {
        self.slug_dir(slug).join("tail.json")
    }

    /// Load the tail index, rebuilding it from the log when stale.
    pub fn load_tail(&self, slug: &str) -> StorageResult<TailIndex> {
        let log_len = match std::fs::metadata(self.log_path(slug)) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        if let Some(tail) = self.read_tail(slug)? {
            if tail.log_len == log_len {
                return Ok(tail);
            }
            tracing::warn!(
                slug,
                indexed = tail.log_len,
                actual = log_len,
                "Allocation tail index is stale, rebuilding"
            );
        }

        self.rebuild(slug)
    }

    fn read_tail(&self, slug: &str) -> StorageResult<Option<TailIndex>> {
        match std::fs::read(self.tail_path(slug)) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(tail) => Ok(Some(tail)),
                Err(e) => {
                    tracing::warn!(slug, error = %e, "Unreadable allocation tail index");
                    Ok(None)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_tail(&self, slug: &str, tail: &TailIndex) -> StorageResult<()> {
        std::fs::create_dir_all(self.slug_dir(slug))?;

        let path = self.tail_path(slug);
        let tmp_path = path.with_extension("json.tmp");

        let mut file = std::fs::File::create(&tmp_path)?;
        serde_json::to_writer(&file, tail)?;
        file.flush()?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, &path)?;

        Ok(())
    }

    /// Rebuild the tail index from the log, cutting off a torn final line.
    fn rebuild(&self, slug: &str) -> StorageResult<TailIndex> {
        let path = self.log_path(slug);

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(TailIndex::default());
            }
            Err(e) => return Err(e.into()),
        };

        let complete = complete_len(&bytes);
        if complete < bytes.len() {
            tracing::warn!(
                slug,
                discarded = bytes.len() - complete,
                "Truncating torn allocation log line"
            );
            let file = std::fs::OpenOptions::new().write(true).open(&path)?;
            file.set_len(complete as u64)?;
            file.sync_all()?;
        }

        let mut tail = TailIndex {
            log_len: complete as u64,
            ..TailIndex::default()
        };
        for record in parse_lines(&bytes[..complete])? {
            tail.record(&record);
        }

        self.write_tail(slug, &tail)?;
        Ok(tail)
    }

    /// Durably append `records` and advance `tail`.
    ///
    /// On a failed write the log is cut back to its previous length, so either all
    /// records become visible or none do.
    pub fn append(
        &self,
        slug: &str,
        tail: &mut TailIndex,
        records: &[AllocationRecord],
    ) -> StorageResult<()> {
        std::fs::create_dir_all(self.slug_dir(slug))?;

        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(slug))?;

        let written = file
            .write_all(&buf)
            .and_then(|()| file.flush())
            .and_then(|()| file.sync_data());

        if let Err(e) = written {
            if let Err(truncate_err) = file.set_len(tail.log_len) {
                tracing::error!(slug, error = %truncate_err, "Failed to cut back allocation log");
            }
            return Err(e.into());
        }

        let mut next = tail.clone();
        next.log_len = tail.log_len + buf.len() as u64;
        for record in records {
            next.record(record);
        }

        // A failed index write leaves a stale index, which the next reader rebuilds.
        if let Err(e) = self.write_tail(slug, &next) {
            tracing::warn!(slug, error = %e, "Failed to write allocation tail index");
        }

        *tail = next;
        Ok(())
    }

    /// Highest-numbered record for `epoch_token` inside `window`, by a full log scan.
    pub fn scan_window(
        &self,
        slug: &str,
        epoch_token: &str,
        window: &CalendarWindow,
    ) -> StorageResult<Option<AllocationRecord>> {
        let bytes = match std::fs::read(self.log_path(slug)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(parse_lines(&bytes[..complete_len(&bytes)])?
            .into_iter()
            .filter(|record| {
                record.epoch_token == epoch_token && window.contains(&record.created_at)
            })
            .max_by_key(|record| (record.sequence_number, record.id)))
    }

    /// Most recent records for `slug`, newest first.
    pub fn read_recent(&self, slug: &str, limit: usize) -> StorageResult<Vec<AllocationRecord>> {
        let bytes = match std::fs::read(self.log_path(slug)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = parse_lines(&bytes[..complete_len(&bytes)])?;
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }
}

/// Length of the prefix made of newline-terminated lines.
fn complete_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1)
}

fn parse_lines(bytes: &[u8]) -> StorageResult<Vec<AllocationRecord>> {
    bytes
        .split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_slice(line)
                .map_err(|e| StorageError::Serialization(format!("corrupt allocation log: {e}")))
        })
        .collect()
}

/// State held while a unit of work owns a slug.
struct Held {
    guard: SlugLockGuard,
    tail: TailIndex,
    pending: Vec<AllocationRecord>,
}

/// Unit of work over the file backend.
///
/// Records are buffered until commit. Dropping the unit of work releases the lock
/// and discards the buffer.
pub struct FileUnitOfWork {
    logics: Arc<FileLogicStore>,
    log: Arc<FileAllocationLog>,
    locks: Arc<SlugLocks>,
    held: Option<Held>,
}

impl FileUnitOfWork {
    pub(super) const fn new(
        logics: Arc<FileLogicStore>,
        log: Arc<FileAllocationLog>,
        locks: Arc<SlugLocks>,
    ) -> Self {
        Self {
            logics,
            log,
            locks,
            held: None,
        }
    }

    fn held_for(&mut self, slug: &str) -> StorageResult<&mut Held> {
        match self.held.as_mut() {
            Some(held) if held.guard.slug() == slug => Ok(held),
            _ => Err(StorageError::LockFailed(format!(
                "slug '{slug}' is not locked by this unit of work"
            ))),
        }
    }
}

#[async_trait]
impl UnitOfWork for FileUnitOfWork {
    async fn lock_active_logic(&mut self, slug: &str) -> StorageResult<Option<IdentifierLogic>> {
        match &self.held {
            Some(held) if held.guard.slug() != slug => {
                return Err(StorageError::LockFailed(format!(
                    "unit of work already holds slug '{}'",
                    held.guard.slug()
                )));
            }
            Some(_) => {}
            None => {
                let guard = self.locks.acquire(slug).await?;
                let tail = self.log.load_tail(slug)?;
                self.held = Some(Held {
                    guard,
                    tail,
                    pending: Vec::new(),
                });
            }
        }

        Ok(self
            .logics
            .get(slug)?
            .filter(IdentifierLogic::is_allocatable))
    }

    async fn last_allocation(
        &mut self,
        slug: &str,
        epoch_token: &str,
    ) -> StorageResult<Option<AllocationRecord>> {
        let held = self.held_for(slug)?;

        let pending = held
            .pending
            .iter()
            .rev()
            .find(|record| record.epoch_token == epoch_token);

        Ok(pending
            .or_else(|| held.tail.latest.get(epoch_token))
            .cloned())
    }

    async fn max_allocation_in(
        &mut self,
        slug: &str,
        epoch_token: &str,
        window: &CalendarWindow,
    ) -> StorageResult<Option<AllocationRecord>> {
        let log = Arc::clone(&self.log);
        let held = self.held_for(slug)?;

        let pending = held
            .pending
            .iter()
            .filter(|record| {
                record.epoch_token == epoch_token && window.contains(&record.created_at)
            })
            .max_by_key(|record| (record.sequence_number, record.id))
            .cloned();

        let committed = match held.tail.in_window(epoch_token, window) {
            Some(found) => found,
            None => log.scan_window(slug, epoch_token, window)?,
        };

        Ok(pending
            .into_iter()
            .chain(committed)
            .max_by_key(|record| (record.sequence_number, record.id)))
    }

    async fn insert_allocation(
        &mut self,
        allocation: NewAllocation,
    ) -> StorageResult<AllocationRecord> {
        let held = self.held_for(&allocation.slug)?;

        let id = held
            .pending
            .last()
            .map_or(held.tail.last_id, |record| record.id)
            + 1;
        let record = allocation.into_record(id);
        held.pending.push(record.clone());

        Ok(record)
    }

    async fn commit(mut self: Box<Self>) -> StorageResult<()> {
        if let Some(mut held) = self.held.take() {
            if !held.pending.is_empty() {
                let slug = held.guard.slug().to_string();
                self.log.append(&slug, &mut held.tail, &held.pending)?;
                tracing::trace!(slug = %slug, records = held.pending.len(), "Allocation log committed");
            }
        }
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> StorageResult<()> {
        if let Some(held) = self.held.take() {
            tracing::debug!(
                slug = held.guard.slug(),
                discarded = held.pending.len(),
                "Unit of work rolled back"
            );
        }
        Ok(())
    }
}
