use schemars::schema::RootSchema;
use schemars::schema_for;

use crate::model::Blueprint;

/// Emit the JSON Schema for blueprint documents.
pub fn blueprint_json_schema() -> RootSchema {
    schema_for!(Blueprint)
}
