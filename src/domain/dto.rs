//! Data Transfer Objects for API requests and responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AllocationRecord, ContextData, IdentifierLogic, ResetMode};

/// Standard API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Response code (0 = success, non-zero = error).
    pub code: i32,

    /// Human-readable message.
    pub message: String,

    /// Response data (null on error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Create a success response.
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    /// Create an error response.
    pub fn error(code: i32, message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl ApiResponse<()> {
    /// Create a success response with no data.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            code: 0,
            message: "success".to_string(),
            data: None,
        }
    }
}

/// Request to generate identifiers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateRequest {
    /// Logic slug.
    pub slug: String,

    /// Context data for data placeholders and the epoch token.
    #[serde(default)]
    pub data: ContextData,

    /// Explicit allocation date (RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`).
    #[serde(default)]
    pub date: Option<String>,

    /// Number of identifiers to generate (default: 1).
    #[serde(default)]
    pub count: Option<u32>,
}

/// Generated identifiers.
///
/// A single code unless more than one was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Generated {
    /// One code.
    Single {
        /// The code.
        code: String,
    },
    /// Several codes in allocation order.
    Batch {
        /// The codes.
        codes: Vec<String>,
    },
}

impl Generated {
    /// All codes in allocation order.
    #[must_use]
    pub fn codes(&self) -> Vec<&str> {
        match self {
            Self::Single { code } => vec![code.as_str()],
            Self::Batch { codes } => codes.iter().map(String::as_str).collect(),
        }
    }
}

/// Request to create or replace a logic definition.
#[derive(Debug, Clone, Deserialize)]
pub struct LogicRequest {
    /// Slug (ignored on update; the path wins).
    #[serde(default)]
    pub slug: String,

    /// Template string.
    pub format: String,

    /// Reset mode.
    #[serde(default)]
    pub reset_mode: ResetMode,

    /// Epoch token fields.
    #[serde(default)]
    pub reset_keys: Vec<String>,

    /// Informational next-number hint.
    #[serde(default)]
    pub next_number_hint: Option<i64>,

    /// Starting number for every epoch (default: 1).
    #[serde(default)]
    pub starting_number: Option<i64>,

    /// Minimum digit width (default: 4).
    #[serde(default)]
    pub pad_width: Option<u32>,

    /// Whether the logic is active (default: true).
    #[serde(default)]
    pub active: Option<bool>,
}

impl LogicRequest {
    /// Build a logic definition from this request.
    #[must_use]
    pub fn into_logic(self) -> IdentifierLogic {
        let mut logic = IdentifierLogic::new(self.slug, self.format, self.reset_mode)
            .with_reset_keys(self.reset_keys);
        if let Some(starting_number) = self.starting_number {
            logic.starting_number = starting_number;
        }
        if let Some(pad_width) = self.pad_width {
            logic.pad_width = pad_width;
        }
        if let Some(active) = self.active {
            logic.active = active;
        }
        logic.next_number_hint = self.next_number_hint;
        logic
    }
}

/// Logic definition as returned by the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicResponse {
    /// Slug.
    pub slug: String,
    /// Template string.
    pub format: String,
    /// Reset mode.
    pub reset_mode: ResetMode,
    /// Epoch token fields.
    pub reset_keys: Vec<String>,
    /// Next-number hint.
    pub next_number_hint: i64,
    /// Starting number.
    pub starting_number: i64,
    /// Pad width.
    pub pad_width: u32,
    /// Active flag.
    pub active: bool,
    /// Creation time (RFC 3339).
    pub created_at: String,
    /// Last update time (RFC 3339).
    pub updated_at: String,
}

impl From<IdentifierLogic> for LogicResponse {
    fn from(logic: IdentifierLogic) -> Self {
        Self {
            next_number_hint: logic.next_number_hint(),
            slug: logic.slug,
            format: logic.format,
            reset_mode: logic.reset_mode,
            reset_keys: logic.reset_keys,
            starting_number: logic.starting_number,
            pad_width: logic.pad_width,
            active: logic.active,
            created_at: logic.created_at.to_rfc3339(),
            updated_at: logic.updated_at.to_rfc3339(),
        }
    }
}

/// Allocation history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationResponse {
    /// Epoch token.
    pub epoch_token: String,
    /// Sequence number.
    pub sequence_number: i64,
    /// Rendered code.
    pub code: String,
    /// Allocation instant.
    pub created_at: DateTime<Utc>,
}

impl From<AllocationRecord> for AllocationResponse {
    fn from(record: AllocationRecord) -> Self {
        Self {
            epoch_token: record.epoch_token,
            sequence_number: record.sequence_number,
            code: record.rendered_code,
            created_at: record.created_at,
        }
    }
}
