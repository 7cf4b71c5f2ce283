//! Identifier logic definitions.
//!
//! A logic describes one identifier family: its template, its numeric sequence and the
//! policy deciding when that sequence restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::service::render::Template;

/// Maximum allowed slug length.
const MAX_SLUG_LEN: usize = 255;

/// Maximum allowed pad width.
pub const MAX_PAD_WIDTH: u32 = 20;

/// Check if a slug is reserved (starts or ends with `__`).
#[must_use]
pub fn is_reserved_slug(slug: &str) -> bool {
    slug.starts_with("__") || slug.ends_with("__")
}

/// Policy governing when a sequence restarts at `starting_number`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetMode {
    /// Never reset the sequence.
    #[default]
    None,
    /// Reset when the calendar year changes.
    Yearly,
    /// Reset when the calendar month changes.
    Monthly,
    /// Reset when the calendar day changes.
    Daily,
    /// Reset whenever the epoch token changes.
    #[serde(alias = "token")]
    TokenBased,
}

impl ResetMode {
    /// Whether this mode compares calendar parts of timestamps.
    #[must_use]
    pub const fn is_calendar(self) -> bool {
        matches!(self, Self::Yearly | Self::Monthly | Self::Daily)
    }

    /// Stable string form, as stored by the backends.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Yearly => "yearly",
            Self::Monthly => "monthly",
            Self::Daily => "daily",
            Self::TokenBased => "token_based",
        }
    }
}

impl std::fmt::Display for ResetMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResetMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "yearly" => Ok(Self::Yearly),
            "monthly" => Ok(Self::Monthly),
            "daily" => Ok(Self::Daily),
            "token_based" | "token" => Ok(Self::TokenBased),
            other => Err(format!("unknown reset mode: {other}")),
        }
    }
}

/// Definition of one identifier family.
///
/// Format syntax:
/// - `{YYYY}`, `{YY}`, `{MM}`, `{DD}` - date parts of the allocation instant
/// - `{#####}` - the sequence number, zero-padded to `pad_width`
/// - `{KEY}` - the value of context field `KEY` (empty when absent)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierLogic {
    /// Unique slug naming this family.
    pub slug: String,

    /// Template string, e.g. `"{PREFIX}-{YYYY}-{MM}-{#####}"`.
    pub format: String,

    /// When the sequence restarts.
    #[serde(default)]
    pub reset_mode: ResetMode,

    /// Fields feeding the epoch token.
    #[serde(default)]
    pub reset_keys: Vec<String>,

    /// Informational hint of the next number; not consulted by allocation.
    #[serde(default)]
    pub next_number_hint: Option<i64>,

    /// Value used whenever a new epoch begins.
    #[serde(default = "default_starting_number")]
    pub starting_number: i64,

    /// Minimum digit width of the sequence portion.
    #[serde(default = "default_pad_width")]
    pub pad_width: u32,

    /// Inactive logics are not eligible for allocation.
    #[serde(default = "default_active")]
    pub active: bool,

    /// Creation timestamp.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Last update timestamp.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    /// Soft-delete timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

const fn default_starting_number() -> i64 {
    1
}

const fn default_pad_width() -> u32 {
    4
}

const fn default_active() -> bool {
    true
}

impl IdentifierLogic {
    /// Create a new active logic with default numbering.
    #[must_use]
    pub fn new(slug: impl Into<String>, format: impl Into<String>, reset_mode: ResetMode) -> Self {
        let now = Utc::now();
        Self {
            slug: slug.into(),
            format: format.into(),
            reset_mode,
            reset_keys: Vec::new(),
            next_number_hint: None,
            starting_number: default_starting_number(),
            pad_width: default_pad_width(),
            active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Set the reset keys.
    #[must_use]
    pub fn with_reset_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reset_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set the starting number.
    #[must_use]
    pub const fn with_starting_number(mut self, starting_number: i64) -> Self {
        self.starting_number = starting_number;
        self
    }

    /// Set the pad width.
    #[must_use]
    pub const fn with_pad_width(mut self, pad_width: u32) -> Self {
        self.pad_width = pad_width;
        self
    }

    /// Whether the logic may be used for allocation.
    #[must_use]
    pub const fn is_allocatable(&self) -> bool {
        self.active && self.deleted_at.is_none()
    }

    /// Next number to report to administrators.
    #[must_use]
    pub fn next_number_hint(&self) -> i64 {
        self.next_number_hint.unwrap_or(self.starting_number)
    }

    /// Validate the definition.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        validate_slug(&self.slug)?;

        if self.format.is_empty() {
            return Err("format cannot be empty".to_string());
        }
        if self.starting_number < 0 {
            return Err("starting_number cannot be negative".to_string());
        }
        if self.pad_width > MAX_PAD_WIDTH {
            return Err(format!("pad_width cannot exceed {MAX_PAD_WIDTH}"));
        }
        if self.reset_keys.iter().any(String::is_empty) {
            return Err("reset_keys cannot contain empty names".to_string());
        }

        let template = Template::parse(&self.format);
        if template.has_unclosed_placeholder() {
            return Err("unclosed placeholder in format".to_string());
        }
        if !template.has_sequence() {
            return Err("format must contain a sequence placeholder like {####}".to_string());
        }

        // Codes from different calendar epochs must not collide.
        let dates = template.date_coverage();
        match self.reset_mode {
            ResetMode::Yearly if !dates.year => {
                Err("yearly reset requires {YYYY} or {YY} in format".to_string())
            }
            ResetMode::Monthly if !(dates.year && dates.month) => {
                Err("monthly reset requires a year and {MM} in format".to_string())
            }
            ResetMode::Daily if !(dates.year && dates.month && dates.day) => {
                Err("daily reset requires a year, {MM} and {DD} in format".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Validate a slug.
fn validate_slug(slug: &str) -> Result<(), String> {
    if slug.is_empty() {
        return Err("slug cannot be empty".to_string());
    }
    if slug.len() > MAX_SLUG_LEN {
        return Err(format!("slug cannot exceed {MAX_SLUG_LEN} characters"));
    }
    if is_reserved_slug(slug) {
        return Err("slug cannot start or end with '__' (reserved)".to_string());
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err("slug may only contain ASCII letters, digits, '-' and '_'".to_string());
    }
    Ok(())
}
