use cibus_blueprint::ValidationError;
use cibus_core::EncodingError;
use thiserror::Error;

/// Errors emitted by the generation engine.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(
        "field '{field}': unique date range holds {days} days, row {row} needs another"
    )]
    UniqueDatesExhausted { field: String, row: u64, days: u64 },
    #[error("field '{field}': key space of width {width} exhausted at counter {counter}")]
    KeySpaceExhausted {
        field: String,
        counter: u64,
        width: usize,
    },
    #[error("field '{field}': foreign key pool is empty")]
    EmptyPool { field: String },
    #[error("field '{field}', row {row}: {source}")]
    Encoding {
        field: String,
        row: u64,
        #[source]
        source: EncodingError,
    },
    #[error("field '{field}': {message}")]
    Strategy { field: String, message: String },
    #[error("internal error: {0}")]
    Internal(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("generation failed after {rows_written} rows: {source}")]
    Failed {
        rows_written: u64,
        #[source]
        source: Box<GenerationError>,
    },
}

impl GenerationError {
    pub(crate) fn strategy(field: &str, message: impl Into<String>) -> Self {
        GenerationError::Strategy {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Rows written before the run stopped, when the error carries it.
    pub fn rows_written(&self) -> Option<u64> {
        match self {
            GenerationError::Failed { rows_written, .. } => Some(*rows_written),
            _ => None,
        }
    }

    /// Underlying cause, unwrapping a [`GenerationError::Failed`] wrapper.
    pub fn root(&self) -> &GenerationError {
        match self {
            GenerationError::Failed { source, .. } => source.root(),
            other => other,
        }
    }
}
