//! Epoch token derivation.
//!
//! The epoch token identifies the reset window an allocation belongs to. It is
//! compared by token-based resets and persisted with every allocation so that
//! historical token drift can be audited.

use chrono::{DateTime, Datelike, TimeZone};

use crate::domain::ContextData;

/// Separator between token fragments.
pub const TOKEN_SEPARATOR: &str = "-";

/// Build the epoch token.
///
/// Fragments are every context value in key order, followed by the date part named by
/// each reset key (`YYYY`, `YY`, `MM`, `DD`). Reset keys naming anything else add
/// nothing; their values already entered through the context data.
#[must_use]
pub fn build_token<Tz: TimeZone>(
    reset_keys: &[String],
    data: &ContextData,
    now: &DateTime<Tz>,
) -> String {
    let mut fragments: Vec<String> = data.values().map(ToString::to_string).collect();

    fragments.extend(
        reset_keys
            .iter()
            .filter_map(|key| date_component(key, now)),
    );

    fragments.join(TOKEN_SEPARATOR)
}

/// Formatted date part for a reset key, if it names one.
fn date_component<Tz: TimeZone>(key: &str, now: &DateTime<Tz>) -> Option<String> {
    match key {
        "YYYY" => Some(format!("{:04}", now.year())),
        "YY" => Some(format!("{:02}", now.year().rem_euclid(100))),
        "MM" => Some(format!("{:02}", now.month())),
        "DD" => Some(format!("{:02}", now.day())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context;
    use chrono::{NaiveDate, Utc};

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn now() -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2025, 11, 4)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_empty_token() {
        assert_eq!(build_token(&[], &ContextData::new(), &now()), "");
    }

    #[test]
    fn test_context_values_then_date_parts() {
        let data = context([("CUSTOMER", "ACME")]);
        let token = build_token(&keys(&["CUSTOMER", "YYYY", "MM"]), &data, &now());
        assert_eq!(token, "ACME-2025-11");
    }

    #[test]
    fn test_all_date_parts() {
        let token = build_token(&keys(&["YYYY", "YY", "MM", "DD"]), &ContextData::new(), &now());
        assert_eq!(token, "2025-25-11-04");
    }

    #[test]
    fn test_unrecognized_keys_contribute_nothing() {
        let token = build_token(&keys(&["BRANCH", "year"]), &ContextData::new(), &now());
        assert_eq!(token, "");
    }

    #[test]
    fn test_context_included_without_reset_keys() {
        let data = context([("PREFIX", "EMP")]);
        assert_eq!(build_token(&[], &data, &now()), "EMP");
    }

    #[test]
    fn test_token_independent_of_key_spelling_order() {
        let a = context([("A", "1"), ("B", "2")]);
        let b = context([("B", "2"), ("A", "1")]);
        assert_eq!(build_token(&[], &a, &now()), build_token(&[], &b, &now()));
        assert_eq!(build_token(&[], &a, &now()), "1-2");
    }

    #[test]
    fn test_distinct_customers_distinct_tokens() {
        let reset_keys = keys(&["CUSTOMER"]);
        let acme = build_token(&reset_keys, &context([("CUSTOMER", "ACME")]), &now());
        let other = build_token(&reset_keys, &context([("CUSTOMER", "OTHER")]), &now());
        assert_ne!(acme, other);
    }
}
