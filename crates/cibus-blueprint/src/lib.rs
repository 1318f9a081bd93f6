//! Blueprint contracts, self-correcting validation and dependency resolution.
//!
//! A blueprint is the JSON rules document describing, per fixed-width field,
//! its layout declaration and the generation method that produces it.

pub mod errors;
pub mod model;
pub mod params;
pub mod resolve;
pub mod rules;
pub mod sanitize;
pub mod schema;
pub mod validate;

pub use errors::{IssueSeverity, ValidationError, ValidationIssue, ValidationReport};
pub use model::{Blueprint, Dependency, FieldEntry, Generation, GlobalConfig};
pub use resolve::resolve_order;
pub use rules::{
    ConditionalRule, DateRangeRule, ForeignKeyRule, GenerationRule, KeyDistribution, METHODS,
    NormalRule, SequenceRule, WeightedValues,
};
pub use schema::blueprint_json_schema;
pub use validate::{CompiledField, ValidatedBlueprint, validate, validate_blueprint_json};
