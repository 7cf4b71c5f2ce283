//! Caller-supplied contextual data.
//!
//! Context values only ever take part in string interpolation, so the map is kept to a
//! fixed shape: string keys and primitive values. Keys are stored sorted, which makes
//! the derived epoch token independent of the order a caller wrote them in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A primitive context value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    /// Absent value, rendered as an empty string.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Text.
    Text(String),
}

impl std::fmt::Display for ContextValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ContextValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for ContextValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Context data keyed by field name.
pub type ContextData = BTreeMap<String, ContextValue>;

/// Build context data from key/value pairs.
pub fn context<I, K, V>(pairs: I) -> ContextData
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<ContextValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ContextValue::Null.to_string(), "");
        assert_eq!(ContextValue::from("ACME").to_string(), "ACME");
        assert_eq!(ContextValue::from(42).to_string(), "42");
        assert_eq!(ContextValue::from(true).to_string(), "true");
        assert_eq!(ContextValue::Float(1.5).to_string(), "1.5");
    }

    #[test]
    fn test_deserialize_primitives() {
        let data: ContextData = serde_json::from_str(
            r#"{"CUSTOMER":"ACME","BRANCH":7,"RUSH":false,"NOTE":null,"RATE":0.5}"#,
        )
        .unwrap();

        assert_eq!(data["CUSTOMER"], ContextValue::from("ACME"));
        assert_eq!(data["BRANCH"], ContextValue::Integer(7));
        assert_eq!(data["RUSH"], ContextValue::Bool(false));
        assert_eq!(data["NOTE"], ContextValue::Null);
        assert_eq!(data["RATE"], ContextValue::Float(0.5));
    }

    #[test]
    fn test_keys_are_sorted() {
        let data = context([("Z", "last"), ("A", "first")]);
        let keys: Vec<&str> = data.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["A", "Z"]);
    }

    #[test]
    fn test_nested_values_rejected() {
        let result: Result<ContextData, _> = serde_json::from_str(r#"{"A":{"B":1}}"#);
        assert!(result.is_err());
    }
}
