use cibus_core::SpecParseError;
use thiserror::Error;

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    Error,
    Warning,
}

/// Structured validation issue with location and hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub code: String,
    pub path: String,
    pub message: String,
    pub hint: Option<String>,
}

impl ValidationIssue {
    /// Create a new validation issue.
    pub fn new(
        severity: IssueSeverity,
        code: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
        hint: Option<String>,
    ) -> Self {
        Self {
            severity,
            code: code.into(),
            path: path.into(),
            message: message.into(),
            hint,
        }
    }

    /// Shorthand for a sanitization warning.
    pub fn warning(
        code: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(IssueSeverity::Warning, code, path, message, None)
    }
}

/// Aggregated validation report with errors and warnings.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Returns true when there are no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push_error(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
    }

    fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|issue| format!("{}: {}", issue.path, issue.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Unrecoverable blueprint defects. No rows are generated after any of these.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("blueprint structure invalid: {}", .0.summary())]
    Structure(ValidationReport),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("duplicate field name '{name}'")]
    DuplicateField { name: String },
    #[error("field '{field}': unknown generation method '{method}'")]
    UnknownMethod { field: String, method: String },
    #[error("field '{field}': {source}")]
    SpecParse {
        field: String,
        #[source]
        source: SpecParseError,
    },
    #[error("field '{field}': invalid parameter: {message}")]
    InvalidParameter { field: String, message: String },
    #[error("dependency cycle: {}", .fields.join(" -> "))]
    Cycle { fields: Vec<String> },
    #[error("internal error: generation order unresolved for {fields:?}")]
    UnresolvedOrder { fields: Vec<String> },
}

impl ValidationError {
    pub(crate) fn parameter(field: &str, message: impl Into<String>) -> Self {
        ValidationError::InvalidParameter {
            field: field.to_string(),
            message: message.into(),
        }
    }
}
