//! Clock source.
//!
//! Supplies the allocation instant in the configured UTC offset and parses explicit
//! date overrides used for deterministic runs and for replaying historical dates.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};

use crate::error::{AppError, Result};

/// Wall clock bound to a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    offset: FixedOffset,
}

impl Clock {
    /// Create a clock for the given offset in minutes east of UTC.
    ///
    /// # Errors
    ///
    /// Returns an error if the offset is outside ±24 hours.
    pub fn from_offset_minutes(minutes: i32) -> Result<Self> {
        let offset = minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| AppError::Internal(format!("invalid UTC offset: {minutes} minutes")))?;
        Ok(Self { offset })
    }

    /// UTC clock.
    #[must_use]
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// Configured offset.
    #[must_use]
    pub const fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Current instant in the configured offset.
    #[must_use]
    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    /// Parse an explicit date override.
    ///
    /// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD` (local midnight). Values
    /// without an offset are interpreted in the configured offset.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if the value matches none of the accepted forms.
    pub fn parse(&self, value: &str) -> Result<DateTime<FixedOffset>> {
        let value = value.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Ok(dt.with_timezone(&self.offset));
        }

        let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .ok_or_else(|| AppError::BadRequest(format!("invalid date: {value}")))?;

        self.offset
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| AppError::BadRequest(format!("ambiguous date: {value}")))
    }

    /// Explicit override if given, otherwise the current instant.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if the override cannot be parsed.
    pub fn resolve(&self, explicit: Option<&str>) -> Result<DateTime<FixedOffset>> {
        explicit.map_or_else(|| Ok(self.now()), |value| self.parse(value))
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::utc()
    }
}
