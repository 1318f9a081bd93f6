use thiserror::Error;

/// A layout type declaration that does not match any supported grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse type declaration '{declaration}': {reason}")]
pub struct SpecParseError {
    pub declaration: String,
    pub reason: String,
}

impl SpecParseError {
    pub fn new(declaration: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            declaration: declaration.into(),
            reason: reason.into(),
        }
    }
}

/// A value that cannot be written into (or read back from) its field bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("value '{value}' needs {needed} digits but the field holds {capacity}")]
    Overflow {
        value: String,
        needed: usize,
        capacity: u32,
    },
    #[error("negative value '{0}' in an unsigned field")]
    NegativeUnsigned(String),
    #[error("value '{0}' is not numeric")]
    NotNumeric(String),
    #[error("value '{0}' contains non-ASCII characters")]
    NonAscii(String),
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("malformed field bytes: {0}")]
    Malformed(String),
}
