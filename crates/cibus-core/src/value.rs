use std::fmt;

use rust_decimal::Decimal;

/// Raw value produced for a field before fixed-width encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    Text(String),
    Number(Decimal),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            FieldValue::Number(value) => Some(*value),
            FieldValue::Text(_) => None,
        }
    }

    /// Key used when another field conditions on this value.
    pub fn lookup_key(&self) -> String {
        match self {
            FieldValue::Text(value) => value.trim_end().to_string(),
            FieldValue::Number(value) => value.normalize().to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(value) => f.write_str(value),
            FieldValue::Number(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        FieldValue::Number(value)
    }
}
