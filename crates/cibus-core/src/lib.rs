//! Core contracts shared across the cibus crates.
//!
//! Holds the fixed-width type codec derived from mainframe-style picture
//! declarations and the deterministic dependency graph ordering used by the
//! blueprint resolver.

pub mod codec;
pub mod error;
pub mod graph;
pub mod value;

pub use codec::{Encoding, TypeDescriptor, decode, decode_spec, encode};
pub use error::{EncodingError, SpecParseError};
pub use graph::{CycleError, toposort};
pub use value::FieldValue;
