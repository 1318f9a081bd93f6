use std::collections::BTreeMap;

use cibus_blueprint::{IssueSeverity, ValidationIssue};
use serde::{Deserialize, Serialize};

/// Options for the generation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    /// Worker threads producing rows.
    pub workers: usize,
    /// Completed rows that may wait for the writer.
    pub channel_capacity: usize,
    /// Redraws before a truncated normal value is clamped.
    pub max_normal_retries: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            channel_capacity: 1024,
            max_normal_retries: 100,
        }
    }
}

/// Structured issue carried into the run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationIssue {
    pub level: String,
    pub code: String,
    pub message: String,
    pub path: Option<String>,
}

impl From<&ValidationIssue> for GenerationIssue {
    fn from(issue: &ValidationIssue) -> Self {
        let level = match issue.severity {
            IssueSeverity::Error => "error",
            IssueSeverity::Warning => "warning",
        };
        Self {
            level: level.to_string(),
            code: issue.code.clone(),
            message: issue.message.clone(),
            path: Some(issue.path.clone()),
        }
    }
}

/// Report for a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub run_id: String,
    pub seed: u64,
    pub rows_requested: u64,
    pub rows_written: u64,
    pub bytes_written: u64,
    /// Bytes per record, excluding the newline.
    pub record_length: usize,
    pub workers: usize,
    pub cancelled: bool,
    pub duration_ms: u64,
    /// Pre-built key pool size per foreign key field.
    pub pool_sizes: BTreeMap<String, usize>,
    pub warnings: Vec<GenerationIssue>,
}

impl GenerationReport {
    pub fn new(run_id: String, seed: u64, rows_requested: u64, record_length: usize) -> Self {
        Self {
            run_id,
            seed,
            rows_requested,
            rows_written: 0,
            bytes_written: 0,
            record_length,
            workers: 1,
            cancelled: false,
            duration_ms: 0,
            pool_sizes: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.rows_written == self.rows_requested
    }
}
