//! The tagged value union shared by the filter parser, the dialect
//! renderers, and the connector result sets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single bound parameter or result cell.
///
/// `Value` never carries SQL text; it is always handed to a driver as a
/// bind parameter or produced by decoding a driver row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render the value as it would appear if substituted into SQL text.
    /// Used only by the injection-invariant test helpers; never used to
    /// build a statement.
    pub fn as_literal_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::I64(i) => i.to_string(),
            Value::F64(f) => f.to_string(),
            Value::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_literal_string())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::I64(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::F64(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_rendering() {
        assert_eq!(Value::Null.as_literal_string(), "NULL");
        assert_eq!(Value::I64(21).as_literal_string(), "21");
        assert_eq!(Value::Text("CA".into()).as_literal_string(), "CA");
    }
}
