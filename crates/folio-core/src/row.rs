//! Input rows and their identity keys.

use serde::Serialize;
use serde_json::{Map, Value};

/// Errors that make the data file unusable for a run.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("data file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("data file must contain a JSON array of objects")]
    NotAnArray,

    #[error("data row {index} is not a JSON object")]
    NotAnObject { index: usize },

    #[error("data file is empty")]
    Empty,
}

/// One input record: field name to scalar value, in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Field value as it appears in rendered output and reports.
    ///
    /// `None` for missing fields and JSON `null`.
    pub fn display_value(&self, field: &str) -> Option<String> {
        self.0.get(field).and_then(value_to_text)
    }

    /// Raw identity: the first field's value, or `doc_<index>` when that
    /// value is missing or falsy.
    pub fn identity(&self, index: usize) -> String {
        self.0
            .values()
            .next()
            .filter(|v| is_truthy(v))
            .and_then(value_to_text)
            .unwrap_or_else(|| format!("doc_{index}"))
    }

    /// Identity sanitized for use in object keys and file names.
    pub fn safe_key(&self, index: usize) -> String {
        sanitize_key(&self.identity(index))
    }
}

impl From<Map<String, Value>> for Row {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Replace everything except ASCII alphanumerics, `_` and `-` with `_`.
pub fn sanitize_key(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub(crate) fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Parse the data file: a non-empty JSON array of flat objects.
pub fn parse_rows(bytes: &[u8]) -> Result<Vec<Row>, DataError> {
    let value: Value = serde_json::from_slice(bytes)?;
    let Value::Array(items) = value else {
        return Err(DataError::NotAnArray);
    };
    if items.is_empty() {
        return Err(DataError::Empty);
    }

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(fields) => Ok(Row(fields)),
            _ => Err(DataError::NotAnObject { index }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(m) => Row::new(m),
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn identity_uses_first_field_in_source_order() {
        let rows = parse_rows(br#"[{"zeta": "Z-1", "alpha": "A"}]"#).unwrap();
        assert_eq!(rows[0].identity(0), "Z-1");
    }

    #[test]
    fn falsy_first_field_falls_back_to_index() {
        assert_eq!(row(json!({"id": ""})).identity(4), "doc_4");
        assert_eq!(row(json!({"id": 0})).identity(1), "doc_1");
        assert_eq!(row(json!({"id": null})).identity(2), "doc_2");
        assert_eq!(row(json!({})).identity(3), "doc_3");
        assert_eq!(row(json!({"id": 42})).identity(3), "42");
    }

    #[test]
    fn safe_key_replaces_non_word_characters() {
        let r = row(json!({"name": "Jane Doe/2024 (v1).é"}));
        assert_eq!(r.safe_key(0), "Jane_Doe_2024__v1___");
        assert_eq!(sanitize_key("ok-name_1"), "ok-name_1");
    }

    #[test]
    fn display_value_stringifies_scalars() {
        let r = row(json!({"s": "x", "n": 1.5, "b": true, "z": null}));
        assert_eq!(r.display_value("s").as_deref(), Some("x"));
        assert_eq!(r.display_value("n").as_deref(), Some("1.5"));
        assert_eq!(r.display_value("b").as_deref(), Some("true"));
        assert_eq!(r.display_value("z"), None);
        assert_eq!(r.display_value("missing"), None);
    }

    #[test]
    fn parse_rejects_empty_and_malformed_files() {
        assert!(matches!(parse_rows(b"[]"), Err(DataError::Empty)));
        assert!(matches!(parse_rows(b"{}"), Err(DataError::NotAnArray)));
        assert!(matches!(parse_rows(b"not json"), Err(DataError::Parse(_))));
        assert!(matches!(
            parse_rows(br#"[{"a": 1}, 2]"#),
            Err(DataError::NotAnObject { index: 1 })
        ));
    }
}
