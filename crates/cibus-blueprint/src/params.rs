use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::errors::ValidationError;

/// Typed read access to a field's method parameters.
pub struct ParamMap<'a> {
    field: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> ParamMap<'a> {
    pub fn new(field: &'a str, map: &'a Map<String, Value>) -> Self {
        Self { field, map }
    }

    pub fn field(&self) -> &'a str {
        self.field
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key)
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, ValidationError> {
        self.typed(key, "a non-negative integer", Value::as_u64)
    }

    pub fn get_usize(&self, key: &str) -> Result<Option<usize>, ValidationError> {
        Ok(self
            .get_u64(key)?
            .and_then(|value| usize::try_from(value).ok()))
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, ValidationError> {
        self.typed(key, "a number", Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ValidationError> {
        self.typed(key, "a boolean", Value::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&'a str>, ValidationError> {
        self.typed(key, "a string", Value::as_str)
    }

    pub fn get_date(&self, key: &str) -> Result<Option<NaiveDate>, ValidationError> {
        match self.get_str(key)? {
            None => Ok(None),
            Some(raw) => parse_date_value(raw).map(Some).ok_or_else(|| {
                ValidationError::parameter(
                    self.field,
                    format!("'{key}' must be a YYYY-MM-DD date, got '{raw}'"),
                )
            }),
        }
    }

    pub fn require_f64(&self, key: &str) -> Result<f64, ValidationError> {
        self.get_f64(key)?.ok_or_else(|| self.missing(key))
    }

    pub fn require_usize(&self, key: &str) -> Result<usize, ValidationError> {
        self.get_usize(key)?.ok_or_else(|| self.missing(key))
    }

    pub fn require_date(&self, key: &str) -> Result<NaiveDate, ValidationError> {
        self.get_date(key)?.ok_or_else(|| self.missing(key))
    }

    pub fn missing(&self, key: &str) -> ValidationError {
        ValidationError::parameter(self.field, format!("missing required parameter '{key}'"))
    }

    fn typed<T>(
        &self,
        key: &str,
        expected: &str,
        read: impl Fn(&'a Value) -> Option<T>,
    ) -> Result<Option<T>, ValidationError> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => read(value).map(Some).ok_or_else(|| {
                ValidationError::parameter(self.field, format!("'{key}' must be {expected}"))
            }),
        }
    }
}

pub fn parse_date_value(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Categorical values may be written as strings or bare numbers.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
