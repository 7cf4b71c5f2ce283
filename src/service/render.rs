//! Code rendering.
//!
//! Expands format strings like `"{PREFIX}-{YYYY}-{MM}-{#####}"` into final codes.
//! Rendering is a pure function of the format, the context data, the allocation
//! instant, the sequence number and the pad width.

use chrono::{DateTime, Datelike, TimeZone};

use crate::domain::ContextData;

/// Parsed segment of a format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text.
    Literal(String),
    /// 4-digit year.
    Year4,
    /// 2-digit year.
    Year2,
    /// 2-digit month.
    Month,
    /// 2-digit day.
    Day,
    /// Zero-padded sequence number; the `#` run length is cosmetic.
    Sequence,
    /// Context field lookup.
    Data(String),
}

/// Which calendar parts a format renders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateCoverage {
    /// `{YYYY}` or `{YY}` present.
    pub year: bool,
    /// `{MM}` present.
    pub month: bool,
    /// `{DD}` present.
    pub day: bool,
}

/// Parsed format string.
#[derive(Debug, Clone)]
pub struct Template {
    /// Format segments.
    segments: Vec<Segment>,
    /// Whether the format ended inside an unclosed `{`.
    unclosed: bool,
}

impl Template {
    /// Parse a format string.
    ///
    /// Parsing never fails: an unclosed `{` is kept as literal text and flagged so that
    /// definitions can be rejected at validation time.
    #[must_use]
    pub fn parse(format: &str) -> Self {
        let mut segments = Vec::new();
        let mut chars = format.chars();
        let mut literal = String::new();
        let mut unclosed = false;

        while let Some(c) = chars.next() {
            if c != '{' {
                literal.push(c);
                continue;
            }

            let mut placeholder = String::new();
            let mut found_close = false;

            for inner in chars.by_ref() {
                if inner == '}' {
                    found_close = true;
                    break;
                }
                placeholder.push(inner);
            }

            if !found_close {
                unclosed = true;
                literal.push('{');
                literal.push_str(&placeholder);
                break;
            }

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(parse_placeholder(placeholder));
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments, unclosed }
    }

    /// Parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether the format has a sequence placeholder.
    #[must_use]
    pub fn has_sequence(&self) -> bool {
        self.segments.contains(&Segment::Sequence)
    }

    /// Whether the format ended inside an unclosed `{`.
    #[must_use]
    pub const fn has_unclosed_placeholder(&self) -> bool {
        self.unclosed
    }

    /// Calendar parts rendered by this format.
    #[must_use]
    pub fn date_coverage(&self) -> DateCoverage {
        let mut coverage = DateCoverage::default();
        for segment in &self.segments {
            match segment {
                Segment::Year4 | Segment::Year2 => coverage.year = true,
                Segment::Month => coverage.month = true,
                Segment::Day => coverage.day = true,
                _ => {}
            }
        }
        coverage
    }

    /// Render a code.
    #[must_use]
    pub fn render<Tz: TimeZone>(
        &self,
        data: &ContextData,
        now: &DateTime<Tz>,
        sequence: i64,
        pad_width: u32,
    ) -> String {
        let mut result = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => result.push_str(s),
                Segment::Year4 => result.push_str(&format!("{:04}", now.year())),
                Segment::Year2 => result.push_str(&format!("{:02}", now.year().rem_euclid(100))),
                Segment::Month => result.push_str(&format!("{:02}", now.month())),
                Segment::Day => result.push_str(&format!("{:02}", now.day())),
                Segment::Sequence => {
                    result.push_str(&format!("{sequence:0width$}", width = pad_width as usize));
                }
                Segment::Data(key) => {
                    if let Some(value) = data.get(key) {
                        result.push_str(&value.to_string());
                    }
                }
            }
        }

        normalize_separators(&result)
    }
}

/// Render `format` in one step.
#[must_use]
pub fn render<Tz: TimeZone>(
    format: &str,
    data: &ContextData,
    now: &DateTime<Tz>,
    sequence: i64,
    pad_width: u32,
) -> String {
    Template::parse(format).render(data, now, sequence, pad_width)
}

/// Collapse runs of `-` into one and trim a single leading or trailing `-`.
#[must_use]
pub fn normalize_separators(code: &str) -> String {
    let mut collapsed = String::with_capacity(code.len());
    for c in code.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }

    let trimmed = collapsed.strip_prefix('-').unwrap_or(&collapsed);
    let trimmed = trimmed.strip_suffix('-').unwrap_or(trimmed);
    trimmed.to_string()
}

/// Parse the text between braces.
fn parse_placeholder(placeholder: String) -> Segment {
    match placeholder.as_str() {
        "YYYY" => Segment::Year4,
        "YY" => Segment::Year2,
        "MM" => Segment::Month,
        "DD" => Segment::Day,
        p if !p.is_empty() && p.chars().all(|c| c == '#') => Segment::Sequence,
        _ => Segment::Data(placeholder),
    }
}
