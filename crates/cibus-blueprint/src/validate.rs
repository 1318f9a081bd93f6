use std::collections::{HashMap, HashSet};

use cibus_core::{TypeDescriptor, decode_spec, toposort};
use jsonschema::JSONSchema;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{IssueSeverity, ValidationError, ValidationIssue, ValidationReport};
use crate::model::Blueprint;
use crate::rules::{GenerationRule, compile_rule, is_known_method};
use crate::sanitize::sanitize_fields;
use crate::schema::blueprint_json_schema;

/// Field ready for generation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledField {
    pub name: String,
    /// Declaration position in the layout.
    pub position: usize,
    pub descriptor: TypeDescriptor,
    pub generation_order: i64,
    pub rule: GenerationRule,
    /// Positions of the fields this one depends on.
    pub dependencies: Vec<usize>,
    /// Position of the conditioning parent, for conditional fields.
    pub parent: Option<usize>,
}

/// Sanitized blueprint plus the warnings its corrections produced.
#[derive(Debug, Clone)]
pub struct ValidatedBlueprint {
    pub blueprint: Blueprint,
    pub fields: Vec<CompiledField>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidatedBlueprint {
    pub fn seed(&self) -> u64 {
        self.blueprint.global_config.seed()
    }

    /// Explicit count when requested, otherwise the scaled default.
    pub fn row_count(&self, requested: Option<u64>) -> u64 {
        requested.unwrap_or_else(|| self.blueprint.global_config.scaled_row_count())
    }

    /// Bytes per record, excluding the line terminator.
    pub fn record_length(&self) -> usize {
        self.fields
            .iter()
            .map(|field| field.descriptor.byte_length)
            .sum()
    }

    pub fn field_position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    /// Sanitized blueprint as JSON; validating it again yields no warnings.
    pub fn to_json(&self) -> Result<Value, ValidationError> {
        Ok(serde_json::to_value(&self.blueprint)?)
    }
}

/// Check a raw blueprint document against the blueprint JSON Schema.
pub fn validate_blueprint_json(raw: &Value) -> Result<ValidationReport, ValidationError> {
    let schema = serde_json::to_value(blueprint_json_schema())?;
    let compiled =
        JSONSchema::compile(&schema).map_err(|err| ValidationError::Schema(err.to_string()))?;

    let mut report = ValidationReport::default();
    if let Err(errors) = compiled.validate(raw) {
        for error in errors {
            let path = error.instance_path.to_string();
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "schema_violation",
                if path.is_empty() { "/".to_string() } else { path },
                error.to_string(),
                None,
            ));
        }
    }
    Ok(report)
}

/// Validate and sanitize a raw blueprint.
///
/// Recoverable defects are corrected and reported as warnings; anything
/// else fails the whole blueprint.
pub fn validate(raw: &Value) -> Result<ValidatedBlueprint, ValidationError> {
    let report = validate_blueprint_json(raw)?;
    if !report.is_ok() {
        return Err(ValidationError::Structure(report));
    }
    let blueprint: Blueprint = serde_json::from_value(raw.clone())?;

    check_names(&blueprint)?;
    let descriptors = blueprint
        .fields
        .iter()
        .map(|field| {
            if !is_known_method(field.method()) {
                return Err(ValidationError::UnknownMethod {
                    field: field.name.clone(),
                    method: field.method().to_string(),
                });
            }
            decode_spec(&field.original_spec).map_err(|source| ValidationError::SpecParse {
                field: field.name.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let Blueprint {
        global_config,
        fields,
    } = blueprint;
    let (fields, warnings) = sanitize_fields(fields, &descriptors);
    let blueprint = Blueprint {
        global_config,
        fields,
    };

    let compiled = compile_fields(&blueprint, descriptors)?;
    check_cycles(&compiled)?;

    for issue in &warnings {
        warn!(code = %issue.code, path = %issue.path, "{}", issue.message);
    }
    debug!(
        fields = compiled.len(),
        warnings = warnings.len(),
        "blueprint validated"
    );

    Ok(ValidatedBlueprint {
        blueprint,
        fields: compiled,
        warnings,
    })
}

fn check_names(blueprint: &Blueprint) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for field in &blueprint.fields {
        if field.name.trim().is_empty() {
            return Err(ValidationError::InvalidParameter {
                field: field.name.clone(),
                message: "field name must not be empty".to_string(),
            });
        }
        if !seen.insert(field.name.as_str()) {
            return Err(ValidationError::DuplicateField {
                name: field.name.clone(),
            });
        }
    }
    Ok(())
}

fn compile_fields(
    blueprint: &Blueprint,
    descriptors: Vec<TypeDescriptor>,
) -> Result<Vec<CompiledField>, ValidationError> {
    let positions: HashMap<&str, usize> = blueprint
        .fields
        .iter()
        .enumerate()
        .map(|(position, field)| (field.name.as_str(), position))
        .collect();

    blueprint
        .fields
        .iter()
        .zip(descriptors)
        .enumerate()
        .map(|(position, (field, descriptor))| {
            let rule = compile_rule(field, &descriptor)?;
            let mut dependencies: Vec<usize> = field
                .dependencies
                .iter()
                .filter_map(|dependency| positions.get(dependency.field.as_str()).copied())
                .collect();
            dependencies.sort_unstable();
            dependencies.dedup();

            let parent = match &rule {
                GenerationRule::ConditionalCategorical(conditional) => conditional
                    .parent_field
                    .as_deref()
                    .and_then(|name| positions.get(name).copied()),
                _ => None,
            };
            let generation_order = field.generation_order.ok_or_else(|| {
                ValidationError::UnresolvedOrder {
                    fields: vec![field.name.clone()],
                }
            })?;

            Ok(CompiledField {
                name: field.name.clone(),
                position,
                descriptor,
                generation_order,
                rule,
                dependencies,
                parent,
            })
        })
        .collect()
}

/// Parent-to-child edges of the dependency graph.
pub(crate) fn dependency_edges(fields: &[CompiledField]) -> Vec<(usize, usize)> {
    fields
        .iter()
        .flat_map(|field| {
            field
                .dependencies
                .iter()
                .map(move |parent| (*parent, field.position))
        })
        .collect()
}

fn check_cycles(fields: &[CompiledField]) -> Result<(), ValidationError> {
    let keys: Vec<i64> = fields.iter().map(|field| field.generation_order).collect();
    match toposort(&keys, &dependency_edges(fields)) {
        Ok(_) => Ok(()),
        Err(err) => {
            let mut names: Vec<String> = err
                .cycle
                .iter()
                .map(|index| fields[*index].name.clone())
                .collect();
            if let Some(first) = names.first().cloned() {
                names.push(first);
            }
            Err(ValidationError::Cycle { fields: names })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn minimal() -> Value {
        json!({
            "global_config": {"default_row_count": 10, "scaling_factor": 1.0, "random_seed": 7},
            "fields": [
                {
                    "name": "id",
                    "original_spec": "9(6)",
                    "generation_order": 1,
                    "generation": {"method": "sequential_unique_id", "parameters": {"length": 6}}
                }
            ]
        })
    }

    #[test]
    fn schema_reports_missing_generation() {
        let raw = json!({
            "global_config": {},
            "fields": [{"name": "id", "original_spec": "9(6)"}]
        });
        let report = validate_blueprint_json(&raw).unwrap();
        assert!(!report.is_ok());
        assert!(matches!(validate(&raw), Err(ValidationError::Structure(_))));
    }

    #[test]
    fn schema_accepts_minimal_blueprint() {
        let report = validate_blueprint_json(&minimal()).unwrap();
        assert!(report.is_ok(), "{report:?}");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut raw = minimal();
        let copy = raw["fields"][0].clone();
        raw["fields"].as_array_mut().unwrap().push(copy);
        let err = validate(&raw).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateField { ref name } if name == "id"));
    }

    #[test]
    fn bad_declaration_names_the_field() {
        let mut raw = minimal();
        raw["fields"][0]["original_spec"] = json!("Q(3)");
        let err = validate(&raw).unwrap_err();
        assert!(matches!(err, ValidationError::SpecParse { ref field, .. } if field == "id"));
    }

    #[test]
    fn record_length_sums_byte_lengths() {
        let mut raw = minimal();
        raw["fields"].as_array_mut().unwrap().push(json!({
            "name": "amount",
            "original_spec": "S9(5)V99 COMP-3",
            "generation_order": 2,
            "generation": {"method": "truncated_normal", "parameters": {"mean": 10, "sigma": 2, "length": 7}}
        }));
        let validated = validate(&raw).unwrap();
        assert_eq!(validated.record_length(), 6 + 4);
        assert_eq!(validated.row_count(None), 10);
        assert_eq!(validated.row_count(Some(3)), 3);
        assert_eq!(validated.seed(), 7);
    }
}
