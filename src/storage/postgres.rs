//! `PostgreSQL` storage backend.
//!
//! Logic definitions and allocations live in two tables (see `migrations/`). A unit of
//! work is one transaction; `lock_active_logic` takes a row lock with `FOR UPDATE`, so
//! callers on the same slug serialize while other slugs proceed in parallel. Lock waits
//! are bounded by `lock_timeout`, set per transaction.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};

use crate::config::PostgresStorageConfig;
use crate::domain::{AllocationRecord, CalendarWindow, IdentifierLogic, NewAllocation};
use crate::error::{StorageError, StorageResult};
use crate::storage::traits::{AllocationStorage, LogicStorage, Storage, UnitOfWork};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const LOGIC_COLUMNS: &str = "slug, format, reset_mode, reset_keys, next_number_hint, \
     starting_number, pad_width, active, created_at, updated_at, deleted_at";

const ALLOCATION_COLUMNS: &str =
    "id, slug, epoch_token, sequence_number, rendered_code, created_at, deleted_at";

#[derive(Debug, sqlx::FromRow)]
struct LogicRow {
    slug: String,
    format: String,
    reset_mode: String,
    reset_keys: Vec<String>,
    next_number_hint: Option<i64>,
    starting_number: i64,
    pad_width: i32,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<LogicRow> for IdentifierLogic {
    type Error = StorageError;

    fn try_from(row: LogicRow) -> StorageResult<Self> {
        let reset_mode = row.reset_mode.parse().map_err(StorageError::Serialization)?;
        let pad_width = u32::try_from(row.pad_width).map_err(|_| {
            StorageError::Serialization(format!(
                "negative pad_width {} for logic '{}'",
                row.pad_width, row.slug
            ))
        })?;

        Ok(Self {
            slug: row.slug,
            format: row.format,
            reset_mode,
            reset_keys: row.reset_keys,
            next_number_hint: row.next_number_hint,
            starting_number: row.starting_number,
            pad_width,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AllocationRow {
    id: i64,
    slug: String,
    epoch_token: String,
    sequence_number: i64,
    rendered_code: String,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<AllocationRow> for AllocationRecord {
    fn from(row: AllocationRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            epoch_token: row.epoch_token,
            sequence_number: row.sequence_number,
            rendered_code: row.rendered_code,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        }
    }
}

/// `PostgreSQL` storage implementation.
pub struct PostgresStorage {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl PostgresStorage {
    /// Connect the pool and, if configured, apply embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or a migration fails.
    pub async fn connect(config: &PostgresStorageConfig) -> StorageResult<Self> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .connect(&config.url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let storage = Self::from_pool(pool, config.lock_timeout_ms);

        if config.run_migrations {
            storage.migrate().await?;
        }

        Ok(storage)
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool, lock_timeout_ms: u64) -> Self {
        Self {
            pool,
            lock_timeout_ms,
        }
    }

    /// Apply embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> StorageResult<()> {
        tracing::info!("Running database migrations");
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Query(format!("migration failed: {e}")))?;
        Ok(())
    }
}

impl PostgresStorage {
    /// Upsert a logic row. With `only_over_deleted`, an existing row is replaced only
    /// when it is soft-deleted. Returns the number of rows written.
    async fn upsert_logic(
        &self,
        logic: &IdentifierLogic,
        only_over_deleted: bool,
    ) -> StorageResult<u64> {
        let pad_width = i32::try_from(logic.pad_width)
            .map_err(|_| StorageError::Serialization("pad_width out of range".to_string()))?;

        let guard = if only_over_deleted {
            "WHERE identifier_logics.deleted_at IS NOT NULL"
        } else {
            ""
        };
        let sql = format!(
            r"
            INSERT INTO identifier_logics (
                slug, format, reset_mode, reset_keys, next_number_hint,
                starting_number, pad_width, active, created_at, updated_at, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (slug) DO UPDATE SET
                format = EXCLUDED.format,
                reset_mode = EXCLUDED.reset_mode,
                reset_keys = EXCLUDED.reset_keys,
                next_number_hint = EXCLUDED.next_number_hint,
                starting_number = EXCLUDED.starting_number,
                pad_width = EXCLUDED.pad_width,
                active = EXCLUDED.active,
                created_at = EXCLUDED.created_at,
                updated_at = EXCLUDED.updated_at,
                deleted_at = EXCLUDED.deleted_at
            {guard}
            "
        );

        let result = sqlx::query(&sql)
            .bind(&logic.slug)
            .bind(&logic.format)
            .bind(logic.reset_mode.as_str())
            .bind(&logic.reset_keys)
            .bind(logic.next_number_hint)
            .bind(logic.starting_number)
            .bind(pad_width)
            .bind(logic.active)
            .bind(logic.created_at)
            .bind(logic.updated_at)
            .bind(logic.deleted_at)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LogicStorage for PostgresStorage {
    async fn save_logic(&self, logic: &IdentifierLogic) -> StorageResult<()> {
        self.upsert_logic(logic, false).await?;
        Ok(())
    }

    async fn create_logic(&self, logic: &IdentifierLogic) -> StorageResult<bool> {
        Ok(self.upsert_logic(logic, true).await? == 1)
    }

    async fn get_logic(&self, slug: &str) -> StorageResult<Option<IdentifierLogic>> {
        let sql = format!(
            "SELECT {LOGIC_COLUMNS} FROM identifier_logics WHERE slug = $1 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, LogicRow>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .map(IdentifierLogic::try_from)
            .transpose()
    }

    async fn list_logics(&self) -> StorageResult<Vec<IdentifierLogic>> {
        let sql = format!(
            "SELECT {LOGIC_COLUMNS} FROM identifier_logics WHERE deleted_at IS NULL ORDER BY slug"
        );
        sqlx::query_as::<_, LogicRow>(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(IdentifierLogic::try_from)
            .collect()
    }
}

#[async_trait]
impl AllocationStorage for PostgresStorage {
    async fn begin(&self) -> StorageResult<Box<dyn UnitOfWork>> {
        let mut tx = self.pool.begin().await?;

        if self.lock_timeout_ms > 0 {
            sqlx::query("SELECT set_config('lock_timeout', $1, true)")
                .bind(format!("{}ms", self.lock_timeout_ms))
                .execute(&mut *tx)
                .await?;
        }

        Ok(Box::new(PgUnitOfWork { tx, locked: None }))
    }

    async fn list_allocations(
        &self,
        slug: &str,
        limit: u32,
    ) -> StorageResult<Vec<AllocationRecord>> {
        let sql = format!(
            "SELECT {ALLOCATION_COLUMNS} FROM allocation_records \
             WHERE slug = $1 ORDER BY id DESC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, AllocationRow>(&sql)
            .bind(slug)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(AllocationRecord::from).collect())
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgresql"
    }
}

/// Unit of work over one `PostgreSQL` transaction.
///
/// Dropping the transaction without commit rolls it back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
    locked: Option<String>,
}

impl PgUnitOfWork {
    fn ensure_locked(&self, slug: &str) -> StorageResult<()> {
        if self.locked.as_deref() == Some(slug) {
            Ok(())
        } else {
            Err(StorageError::LockFailed(format!(
                "slug '{slug}' is not locked by this unit of work"
            )))
        }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_active_logic(&mut self, slug: &str) -> StorageResult<Option<IdentifierLogic>> {
        if let Some(locked) = self.locked.as_deref().filter(|locked| *locked != slug) {
            return Err(StorageError::LockFailed(format!(
                "unit of work already holds slug '{locked}'"
            )));
        }

        let sql = format!(
            "SELECT {LOGIC_COLUMNS} FROM identifier_logics \
             WHERE slug = $1 AND active AND deleted_at IS NULL FOR UPDATE"
        );
        let logic = sqlx::query_as::<_, LogicRow>(&sql)
            .bind(slug)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(IdentifierLogic::try_from)
            .transpose()?;

        if logic.is_some() {
            self.locked = Some(slug.to_string());
        }
        Ok(logic)
    }

    async fn last_allocation(
        &mut self,
        slug: &str,
        epoch_token: &str,
    ) -> StorageResult<Option<AllocationRecord>> {
        self.ensure_locked(slug)?;

        let sql = format!(
            "SELECT {ALLOCATION_COLUMNS} FROM allocation_records \
             WHERE slug = $1 AND epoch_token = $2 ORDER BY id DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, AllocationRow>(&sql)
            .bind(slug)
            .bind(epoch_token)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(AllocationRecord::from))
    }

    async fn max_allocation_in(
        &mut self,
        slug: &str,
        epoch_token: &str,
        window: &CalendarWindow,
    ) -> StorageResult<Option<AllocationRecord>> {
        self.ensure_locked(slug)?;

        let sql = format!(
            "SELECT {ALLOCATION_COLUMNS} FROM allocation_records \
             WHERE slug = $1 AND epoch_token = $2 AND created_at >= $3 AND created_at < $4 \
             ORDER BY sequence_number DESC, id DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, AllocationRow>(&sql)
            .bind(slug)
            .bind(epoch_token)
            .bind(window.start)
            .bind(window.end)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(AllocationRecord::from))
    }

    async fn insert_allocation(
        &mut self,
        allocation: NewAllocation,
    ) -> StorageResult<AllocationRecord> {
        self.ensure_locked(&allocation.slug)?;

        let sql = format!(
            "INSERT INTO allocation_records \
             (slug, epoch_token, sequence_number, rendered_code, created_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {ALLOCATION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AllocationRow>(&sql)
            .bind(&allocation.slug)
            .bind(&allocation.epoch_token)
            .bind(allocation.sequence_number)
            .bind(&allocation.rendered_code)
            .bind(allocation.created_at)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(row.into())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResetMode;

    fn logic_row(reset_mode: &str, pad_width: i32) -> LogicRow {
        let now = Utc::now();
        LogicRow {
            slug: "invoice".to_string(),
            format: "INV-{YYYY}-{####}".to_string(),
            reset_mode: reset_mode.to_string(),
            reset_keys: vec!["YYYY".to_string()],
            next_number_hint: None,
            starting_number: 1,
            pad_width,
            active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_logic_row_conversion() {
        let logic = IdentifierLogic::try_from(logic_row("yearly", 4)).unwrap();
        assert_eq!(logic.reset_mode, ResetMode::Yearly);
        assert_eq!(logic.pad_width, 4);
        assert_eq!(logic.reset_keys, vec!["YYYY"]);
    }

    #[test]
    fn test_logic_row_rejects_bad_values() {
        assert!(matches!(
            IdentifierLogic::try_from(logic_row("weekly", 4)),
            Err(StorageError::Serialization(_))
        ));
        assert!(matches!(
            IdentifierLogic::try_from(logic_row("none", -1)),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn test_allocation_row_conversion() {
        let created_at = Utc::now();
        let record = AllocationRecord::from(AllocationRow {
            id: 42,
            slug: "invoice".to_string(),
            epoch_token: "2025".to_string(),
            sequence_number: 7,
            rendered_code: "INV-2025-0007".to_string(),
            created_at,
            deleted_at: None,
        });
        assert_eq!(record.id, 42);
        assert_eq!(record.created_at, created_at);
    }
}
