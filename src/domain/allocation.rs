//! Allocation log types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One committed assignment of a sequence number to an epoch token.
///
/// Records are append-only. `id` grows with allocation order and is what "most recent"
/// means when the allocator looks up the previous allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    /// Allocation identity, increasing with insertion order.
    pub id: i64,

    /// Owning logic.
    pub slug: String,

    /// Reset-epoch identity at allocation time.
    pub epoch_token: String,

    /// Value assigned within the epoch.
    pub sequence_number: i64,

    /// Final formatted code returned to the caller.
    pub rendered_code: String,

    /// Effective allocation instant.
    pub created_at: DateTime<Utc>,

    /// Administrative soft-delete timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// An allocation about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAllocation {
    /// Owning logic.
    pub slug: String,
    /// Reset-epoch identity.
    pub epoch_token: String,
    /// Assigned sequence number.
    pub sequence_number: i64,
    /// Rendered code.
    pub rendered_code: String,
    /// Effective allocation instant.
    pub created_at: DateTime<Utc>,
}

impl NewAllocation {
    /// Turn this pending allocation into a record with the given identity.
    #[must_use]
    pub fn into_record(self, id: i64) -> AllocationRecord {
        AllocationRecord {
            id,
            slug: self.slug,
            epoch_token: self.epoch_token,
            sequence_number: self.sequence_number,
            rendered_code: self.rendered_code,
            created_at: self.created_at,
            deleted_at: None,
        }
    }
}

/// Half-open span `[start, end)` of one calendar period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarWindow {
    /// First instant of the period.
    pub start: DateTime<Utc>,
    /// First instant after the period.
    pub end: DateTime<Utc>,
}

impl CalendarWindow {
    /// Whether `instant` falls inside the window.
    #[must_use]
    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        self.start <= *instant && *instant < self.end
    }
}
