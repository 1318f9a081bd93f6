//! Fixed-width record generation for validated blueprints.
//!
//! Rows are built by a bounded pool of worker threads and written in row
//! order, so a fixed seed reproduces the same bytes for any worker count.

pub mod assembler;
pub mod context;
pub mod engine;
pub mod errors;
pub mod generators;
pub mod model;
pub mod output;

pub use assembler::RecordAssembler;
pub use context::{CancellationToken, RowContext, RunContext};
pub use engine::GenerationEngine;
pub use errors::GenerationError;
pub use generators::{FieldGenerator, build_generator};
pub use model::{GenerateOptions, GenerationIssue, GenerationReport};
pub use output::fixed::{RecordWriter, create_output};
