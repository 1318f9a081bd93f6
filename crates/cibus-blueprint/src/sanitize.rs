//! Correction pipeline for machine-authored blueprints.
//!
//! Every rule takes one field entry and returns the corrected entry plus a
//! warning for each change it made. Rules never fail: defects they cannot
//! repair are left for validation to reject.

use std::collections::{BTreeSet, HashMap};

use cibus_core::{TypeDescriptor, toposort};
use serde_json::{Map, Value, json};

use crate::errors::ValidationIssue;
use crate::model::{Dependency, FieldEntry};
use crate::params::{parse_date_value, scalar_text};
use crate::rules::{
    CATEGORICAL_WEIGHTED, CONDITIONAL_CATEGORICAL, FOREIGN_KEY_POOL, TRUNCATED_NORMAL,
    UNIFORM_DATE_RANGE, uses_prefixed_keys,
};

/// Tolerance when checking that weights sum to one.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;
/// Replacement for a non-positive `sigma`.
pub const SIGMA_EPSILON: f64 = 1e-6;
/// Lower clamp for `pool_size_ratio`.
pub const MIN_POOL_RATIO: f64 = 1e-6;

/// Blueprint-wide facts a per-field rule may consult.
pub struct FieldScope<'a> {
    pub index: usize,
    pub descriptor: &'a TypeDescriptor,
    pub field_names: &'a BTreeSet<String>,
    /// Known value sets of categorical fields, keyed by field name.
    pub value_domains: &'a HashMap<String, Vec<String>>,
}

impl FieldScope<'_> {
    fn path(&self, suffix: &str) -> String {
        format!("/fields/{}{suffix}", self.index)
    }
}

/// Escape an object key for use as a JSON pointer reference token.
fn pointer_token(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

pub type CorrectionRule = fn(FieldEntry, &FieldScope<'_>) -> (FieldEntry, Vec<ValidationIssue>);

/// Per-field rules in application order.
pub const FIELD_RULES: &[(&str, CorrectionRule)] = &[
    ("drop_dangling_dependencies", drop_dangling_dependencies),
    ("link_conditional_parent", link_conditional_parent),
    ("infer_length", infer_length),
    ("fit_key_length", fit_key_length),
    ("uniform_on_length_mismatch", uniform_on_length_mismatch),
    ("normalize_weights", normalize_weights),
    ("fill_conditional_defaults", fill_conditional_defaults),
    ("repair_normal_parameters", repair_normal_parameters),
    ("repair_date_bounds", repair_date_bounds),
    ("clamp_pool_ratio", clamp_pool_ratio),
];

/// Apply every per-field rule, then re-rank generation order.
pub fn sanitize_fields(
    fields: Vec<FieldEntry>,
    descriptors: &[TypeDescriptor],
) -> (Vec<FieldEntry>, Vec<ValidationIssue>) {
    let field_names: BTreeSet<String> = fields.iter().map(|field| field.name.clone()).collect();
    let value_domains = collect_value_domains(&fields);
    let mut warnings = Vec::new();

    let mut sanitized: Vec<FieldEntry> = fields
        .into_iter()
        .zip(descriptors)
        .enumerate()
        .map(|(index, (field, descriptor))| {
            let scope = FieldScope {
                index,
                descriptor,
                field_names: &field_names,
                value_domains: &value_domains,
            };
            FIELD_RULES.iter().fold(field, |field, (_, rule)| {
                let (field, issues) = rule(field, &scope);
                warnings.extend(issues);
                field
            })
        })
        .collect();

    warnings.extend(assign_generation_order(&mut sanitized));
    (sanitized, warnings)
}

fn collect_value_domains(fields: &[FieldEntry]) -> HashMap<String, Vec<String>> {
    let mut domains = HashMap::new();
    for field in fields {
        let values = match field.method() {
            CATEGORICAL_WEIGHTED => field.param("values").map(scalar_list).unwrap_or_default(),
            CONDITIONAL_CATEGORICAL => field
                .param("mapping")
                .and_then(Value::as_object)
                .map(mapping_union)
                .unwrap_or_default(),
            _ => continue,
        };
        if !values.is_empty() {
            domains.insert(field.name.clone(), values);
        }
    }
    domains
}

fn scalar_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(scalar_text).collect())
        .unwrap_or_default()
}

fn mapping_union(mapping: &Map<String, Value>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut union = Vec::new();
    for entry in mapping.values() {
        for value in entry.get("values").map(scalar_list).unwrap_or_default() {
            if seen.insert(value.clone()) {
                union.push(value);
            }
        }
    }
    union
}

/// Dependencies on fields that do not exist are removed.
pub fn drop_dangling_dependencies(
    mut field: FieldEntry,
    scope: &FieldScope<'_>,
) -> (FieldEntry, Vec<ValidationIssue>) {
    let mut warnings = Vec::new();
    let mut kept = Vec::with_capacity(field.dependencies.len());
    for (position, dependency) in field.dependencies.drain(..).enumerate() {
        if scope.field_names.contains(&dependency.field) {
            kept.push(dependency);
        } else {
            warnings.push(ValidationIssue::warning(
                "dangling_dependency_dropped",
                scope.path(&format!("/dependencies/{position}")),
                format!(
                    "dependency on unknown field '{}' dropped; field proceeds unconditioned",
                    dependency.field
                ),
            ));
        }
    }
    field.dependencies = kept;
    (field, warnings)
}

/// A conditional field must depend on its parent; an unknown parent is dropped.
pub fn link_conditional_parent(
    mut field: FieldEntry,
    scope: &FieldScope<'_>,
) -> (FieldEntry, Vec<ValidationIssue>) {
    if field.method() != CONDITIONAL_CATEGORICAL {
        return (field, Vec::new());
    }
    let Some(parent) = field
        .param("parent_field")
        .and_then(Value::as_str)
        .map(str::to_string)
    else {
        return (field, Vec::new());
    };

    if !scope.field_names.contains(&parent) {
        field.generation.parameters.remove("parent_field");
        let warning = ValidationIssue::warning(
            "dangling_parent_dropped",
            scope.path("/generation/parameters/parent_field"),
            format!("parent field '{parent}' does not exist; default entry used for every row"),
        );
        return (field, vec![warning]);
    }

    if field.dependencies.iter().any(|dependency| dependency.field == parent) {
        return (field, Vec::new());
    }
    field.dependencies.push(Dependency {
        field: parent.clone(),
        rule: "conditional parent".to_string(),
    });
    let warning = ValidationIssue::warning(
        "parent_dependency_added",
        scope.path("/dependencies"),
        format!("dependency on parent field '{parent}' added"),
    );
    (field, vec![warning])
}

/// Missing `length` is taken from the layout declaration.
pub fn infer_length(
    mut field: FieldEntry,
    scope: &FieldScope<'_>,
) -> (FieldEntry, Vec<ValidationIssue>) {
    if field.generation.parameters.contains_key("length") {
        return (field, Vec::new());
    }
    let mut length = scope.descriptor.logical_width();
    if uses_prefixed_keys(field.method()) {
        let prefix = field
            .param("prefix")
            .and_then(Value::as_str)
            .map(str::len)
            .unwrap_or(0);
        length = length.saturating_sub(prefix).max(1);
    }
    field
        .generation
        .parameters
        .insert("length".to_string(), json!(length));
    let warning = ValidationIssue::warning(
        "length_inferred",
        scope.path("/generation/parameters/length"),
        format!("length {length} inferred from '{}'", field.original_spec),
    );
    (field, vec![warning])
}

/// A key `length` that overflows the field, once the prefix is counted, is cut to fit.
///
/// A prefix that fills the whole field is left alone and rejected at compilation.
pub fn fit_key_length(
    mut field: FieldEntry,
    scope: &FieldScope<'_>,
) -> (FieldEntry, Vec<ValidationIssue>) {
    if !uses_prefixed_keys(field.method()) {
        return (field, Vec::new());
    }
    let Some(length) = field.param("length").and_then(Value::as_u64) else {
        return (field, Vec::new());
    };
    let prefix = field
        .param("prefix")
        .and_then(Value::as_str)
        .map(str::len)
        .unwrap_or(0);
    let width = scope.descriptor.logical_width();
    if prefix >= width || (prefix as u64).saturating_add(length) <= width as u64 {
        return (field, Vec::new());
    }
    let fitted = width - prefix;
    field
        .generation
        .parameters
        .insert("length".to_string(), json!(fitted));
    let warning = ValidationIssue::warning(
        "key_length_reconciled",
        scope.path("/generation/parameters/length"),
        format!(
            "length {length} plus a {prefix}-character prefix exceeds '{}'; length set to {fitted}",
            field.original_spec
        ),
    );
    (field, vec![warning])
}

/// Every weighted entry of a categorical field, with its JSON pointer suffix.
fn weighted_entries<'a>(field: &'a mut FieldEntry) -> Vec<(String, &'a mut Map<String, Value>)> {
    let method = field.generation.method.clone();
    let parameters = &mut field.generation.parameters;
    match method.as_str() {
        CATEGORICAL_WEIGHTED => vec![(String::new(), parameters)],
        CONDITIONAL_CATEGORICAL => {
            let mut entries = Vec::new();
            for (key, value) in parameters.iter_mut() {
                match key.as_str() {
                    "mapping" => {
                        if let Some(mapping) = value.as_object_mut() {
                            for (parent, entry) in mapping.iter_mut() {
                                if let Some(entry) = entry.as_object_mut() {
                                    let suffix = format!("/mapping/{}", pointer_token(parent));
                                    entries.push((suffix, entry));
                                }
                            }
                        }
                    }
                    "default" => {
                        if let Some(entry) = value.as_object_mut() {
                            entries.push(("/default".to_string(), entry));
                        }
                    }
                    _ => {}
                }
            }
            entries
        }
        _ => Vec::new(),
    }
}

fn uniform_weights(count: usize) -> Value {
    let weight = 1.0 / count.max(1) as f64;
    Value::Array(vec![json!(weight); count])
}

fn values_len(entry: &Map<String, Value>) -> Option<usize> {
    entry.get("values").and_then(Value::as_array).map(Vec::len)
}

/// Weights whose count differs from `values` are replaced by a uniform list.
pub fn uniform_on_length_mismatch(
    mut field: FieldEntry,
    scope: &FieldScope<'_>,
) -> (FieldEntry, Vec<ValidationIssue>) {
    let mut warnings = Vec::new();
    for (suffix, entry) in weighted_entries(&mut field) {
        let (Some(values), Some(weights)) = (
            values_len(entry),
            entry.get("weights").and_then(Value::as_array).map(Vec::len),
        ) else {
            continue;
        };
        if values == weights || values == 0 {
            continue;
        }
        entry.insert("weights".to_string(), uniform_weights(values));
        warnings.push(ValidationIssue::warning(
            "weights_length_mismatch",
            scope.path(&format!("/generation/parameters{suffix}/weights")),
            format!("{weights} weights for {values} values replaced with a uniform distribution"),
        ));
    }
    (field, warnings)
}

/// Weights not summing to one are rescaled proportionally.
pub fn normalize_weights(
    mut field: FieldEntry,
    scope: &FieldScope<'_>,
) -> (FieldEntry, Vec<ValidationIssue>) {
    let mut warnings = Vec::new();
    for (suffix, entry) in weighted_entries(&mut field) {
        let Some(raw) = entry.get("weights").and_then(Value::as_array) else {
            continue;
        };
        let path = scope.path(&format!("/generation/parameters{suffix}/weights"));
        let parsed: Option<Vec<f64>> = raw
            .iter()
            .map(|weight| weight.as_f64().filter(|weight| weight.is_finite() && *weight >= 0.0))
            .collect();
        let sum = parsed.as_ref().map(|weights| weights.iter().sum::<f64>());

        match (parsed, sum) {
            (Some(_), Some(sum)) if (sum - 1.0).abs() <= WEIGHT_TOLERANCE => {}
            (Some(weights), Some(sum)) if sum > 0.0 => {
                let rescaled: Vec<Value> = weights.iter().map(|weight| json!(weight / sum)).collect();
                entry.insert("weights".to_string(), Value::Array(rescaled));
                warnings.push(ValidationIssue::warning(
                    "weights_renormalized",
                    path,
                    format!("weights summing to {sum} rescaled to sum to 1"),
                ));
            }
            _ => {
                let count = values_len(entry).unwrap_or(raw.len());
                entry.insert("weights".to_string(), uniform_weights(count));
                warnings.push(ValidationIssue::warning(
                    "weights_invalid",
                    path,
                    "weights were not non-negative numbers with a positive sum; replaced with a uniform distribution",
                ));
            }
        }
    }
    (field, warnings)
}

/// Parent values with no mapping key get a uniform entry over the mapping's union.
pub fn fill_conditional_defaults(
    mut field: FieldEntry,
    scope: &FieldScope<'_>,
) -> (FieldEntry, Vec<ValidationIssue>) {
    if field.method() != CONDITIONAL_CATEGORICAL {
        return (field, Vec::new());
    }
    let Some(parent) = field.param("parent_field").and_then(Value::as_str) else {
        return (field, Vec::new());
    };
    let Some(parent_values) = scope.value_domains.get(parent) else {
        return (field, Vec::new());
    };
    let Some(mapping) = field
        .generation
        .parameters
        .get_mut("mapping")
        .and_then(Value::as_object_mut)
    else {
        return (field, Vec::new());
    };

    let union = mapping_union(mapping);
    if union.is_empty() {
        return (field, Vec::new());
    }

    let mut warnings = Vec::new();
    for parent_value in parent_values {
        if mapping.contains_key(parent_value) {
            continue;
        }
        mapping.insert(
            parent_value.clone(),
            json!({ "values": union, "weights": uniform_weights(union.len()) }),
        );
        warnings.push(ValidationIssue::warning(
            "conditional_default_synthesized",
            scope.path(&format!(
                "/generation/parameters/mapping/{}",
                pointer_token(parent_value)
            )),
            format!("no mapping for parent value '{parent_value}'; uniform default synthesized"),
        ));
    }
    (field, warnings)
}

/// Inverted bounds are swapped and a non-positive sigma becomes a small epsilon.
pub fn repair_normal_parameters(
    mut field: FieldEntry,
    scope: &FieldScope<'_>,
) -> (FieldEntry, Vec<ValidationIssue>) {
    if field.method() != TRUNCATED_NORMAL {
        return (field, Vec::new());
    }
    let mut warnings = Vec::new();
    let parameters = &mut field.generation.parameters;

    let bounds = (
        parameters.get("min_value").and_then(Value::as_f64),
        parameters.get("max_value").and_then(Value::as_f64),
    );
    if let (Some(min), Some(max)) = bounds {
        if min > max {
            parameters.insert("min_value".to_string(), json!(max));
            parameters.insert("max_value".to_string(), json!(min));
            warnings.push(ValidationIssue::warning(
                "normal_bounds_swapped",
                scope.path("/generation/parameters"),
                format!("min_value {min} > max_value {max}; bounds swapped"),
            ));
        }
    }

    let sigma = parameters.get("sigma").and_then(Value::as_f64);
    if let Some(sigma) = sigma.filter(|sigma| *sigma <= 0.0) {
        parameters.insert("sigma".to_string(), json!(SIGMA_EPSILON));
        warnings.push(ValidationIssue::warning(
            "sigma_non_positive",
            scope.path("/generation/parameters/sigma"),
            format!("sigma {sigma} replaced with {SIGMA_EPSILON}"),
        ));
    }
    (field, warnings)
}

/// Inverted date ranges are swapped.
pub fn repair_date_bounds(
    mut field: FieldEntry,
    scope: &FieldScope<'_>,
) -> (FieldEntry, Vec<ValidationIssue>) {
    if field.method() != UNIFORM_DATE_RANGE {
        return (field, Vec::new());
    }
    let parameters = &mut field.generation.parameters;
    let start = parameters.get("start_date").cloned();
    let end = parameters.get("end_date").cloned();
    let (Some(start), Some(end)) = (start, end) else {
        return (field, Vec::new());
    };
    let parsed = (
        start.as_str().and_then(parse_date_value),
        end.as_str().and_then(parse_date_value),
    );
    let (Some(start_date), Some(end_date)) = parsed else {
        return (field, Vec::new());
    };
    if start_date <= end_date {
        return (field, Vec::new());
    }
    parameters.insert("start_date".to_string(), end);
    parameters.insert("end_date".to_string(), start);
    let warning = ValidationIssue::warning(
        "date_bounds_swapped",
        scope.path("/generation/parameters"),
        format!("start_date {start_date} is after end_date {end_date}; bounds swapped"),
    );
    (field, vec![warning])
}

/// `pool_size_ratio` is clamped into (0, 1].
pub fn clamp_pool_ratio(
    mut field: FieldEntry,
    scope: &FieldScope<'_>,
) -> (FieldEntry, Vec<ValidationIssue>) {
    if field.method() != FOREIGN_KEY_POOL {
        return (field, Vec::new());
    }
    let Some(ratio) = field.param("pool_size_ratio").and_then(Value::as_f64) else {
        return (field, Vec::new());
    };
    let clamped = if ratio <= 0.0 {
        MIN_POOL_RATIO
    } else if ratio > 1.0 {
        1.0
    } else {
        return (field, Vec::new());
    };
    field
        .generation
        .parameters
        .insert("pool_size_ratio".to_string(), json!(clamped));
    let warning = ValidationIssue::warning(
        "pool_ratio_clamped",
        scope.path("/generation/parameters/pool_size_ratio"),
        format!("pool_size_ratio {ratio} clamped to {clamped}"),
    );
    (field, vec![warning])
}

/// Missing or colliding ranks are reassigned after every kept rank.
///
/// The first field holding a rank keeps it. Re-ranked fields follow a
/// provisional topological pass over dependencies, ties broken by
/// declaration position.
pub fn assign_generation_order(fields: &mut [FieldEntry]) -> Vec<ValidationIssue> {
    let mut taken = BTreeSet::new();
    let mut rerank = vec![false; fields.len()];
    for (index, field) in fields.iter().enumerate() {
        match field.generation_order {
            Some(order) if taken.insert(order) => {}
            _ => rerank[index] = true,
        }
    }
    if !rerank.iter().any(|flag| *flag) {
        return Vec::new();
    }

    let positions: HashMap<&str, usize> = fields
        .iter()
        .enumerate()
        .map(|(index, field)| (field.name.as_str(), index))
        .collect();
    let edges: Vec<(usize, usize)> = fields
        .iter()
        .enumerate()
        .flat_map(|(child, field)| {
            field
                .dependencies
                .iter()
                .filter_map(|dependency| positions.get(dependency.field.as_str()).copied())
                .map(move |parent| (parent, child))
                .collect::<Vec<_>>()
        })
        .collect();
    let keys: Vec<usize> = (0..fields.len()).collect();
    // A cycle is rejected later; declaration order is enough until then.
    let provisional = toposort(&keys, &edges).unwrap_or(keys);

    let mut next = taken.last().map(|last| last + 1).unwrap_or(1);
    let mut warnings = Vec::new();
    for index in provisional {
        if !rerank[index] {
            continue;
        }
        let field = &mut fields[index];
        let message = match field.generation_order {
            Some(previous) => format!("generation_order {previous} collides; re-ranked to {next}"),
            None => format!("missing generation_order assigned {next}"),
        };
        field.generation_order = Some(next);
        warnings.push(ValidationIssue::warning(
            "generation_order_assigned",
            format!("/fields/{index}/generation_order"),
            message,
        ));
        next += 1;
    }
    warnings
}

#[cfg(test)]
mod tests {
    use cibus_core::decode_spec;
    use serde_json::json;

    use super::*;
    use crate::model::Generation;

    fn field(name: &str, method: &str, parameters: Value) -> FieldEntry {
        FieldEntry {
            name: name.to_string(),
            description: String::new(),
            original_spec: "X(10)".to_string(),
            generation_order: Some(1),
            generation: Generation {
                method: method.to_string(),
                parameters: parameters.as_object().cloned().unwrap_or_default(),
            },
            dependencies: Vec::new(),
        }
    }

    fn run(
        rule: CorrectionRule,
        entry: FieldEntry,
        names: &[&str],
        domains: HashMap<String, Vec<String>>,
    ) -> (FieldEntry, Vec<ValidationIssue>) {
        let descriptor = decode_spec(&entry.original_spec).unwrap();
        let field_names = names.iter().map(|name| name.to_string()).collect();
        let scope = FieldScope {
            index: 0,
            descriptor: &descriptor,
            field_names: &field_names,
            value_domains: &domains,
        };
        rule(entry, &scope)
    }

    #[test]
    fn infers_length_minus_prefix() {
        let mut entry = field("id", "sequential_unique_id", json!({"prefix": "A"}));
        entry.original_spec = "X(11)".to_string();
        let (fixed, warnings) = run(infer_length, entry, &["id"], HashMap::new());
        assert_eq!(fixed.param("length"), Some(&json!(10)));
        assert_eq!(warnings[0].code, "length_inferred");

        let (again, warnings) = run(infer_length, fixed.clone(), &["id"], HashMap::new());
        assert_eq!(again, fixed);
        assert!(warnings.is_empty());
    }

    #[test]
    fn mismatched_weights_become_uniform() {
        let entry = field(
            "kind",
            "categorical_weighted",
            json!({"values": ["a", "b", "c", "d"], "weights": [0.5, 0.5]}),
        );
        let (fixed, warnings) = run(uniform_on_length_mismatch, entry, &["kind"], HashMap::new());
        assert_eq!(fixed.param("weights"), Some(&json!([0.25, 0.25, 0.25, 0.25])));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn weights_are_renormalized() {
        let entry = field(
            "kind",
            "categorical_weighted",
            json!({"values": ["a", "b"], "weights": [3.0, 1.0]}),
        );
        let (fixed, warnings) = run(normalize_weights, entry, &["kind"], HashMap::new());
        assert_eq!(fixed.param("weights"), Some(&json!([0.75, 0.25])));
        assert_eq!(warnings[0].code, "weights_renormalized");
    }

    #[test]
    fn zero_weights_fall_back_to_uniform() {
        let entry = field(
            "kind",
            "categorical_weighted",
            json!({"values": ["a", "b"], "weights": [0, 0]}),
        );
        let (fixed, warnings) = run(normalize_weights, entry, &["kind"], HashMap::new());
        assert_eq!(fixed.param("weights"), Some(&json!([0.5, 0.5])));
        assert_eq!(warnings[0].code, "weights_invalid");
    }

    #[test]
    fn conditional_mapping_entries_are_normalized() {
        let entry = field(
            "sub",
            "conditional_categorical",
            json!({
                "parent_field": "kind",
                "mapping": {"a": {"values": ["x", "y"], "weights": [2, 2]}}
            }),
        );
        let (fixed, warnings) = run(normalize_weights, entry, &["sub", "kind"], HashMap::new());
        assert_eq!(
            fixed.param("mapping").unwrap()["a"]["weights"],
            json!([0.5, 0.5])
        );
        assert_eq!(warnings[0].path, "/fields/0/generation/parameters/mapping/a/weights");
    }

    #[test]
    fn missing_parent_values_get_uniform_union() {
        let entry = field(
            "sub",
            "conditional_categorical",
            json!({
                "parent_field": "kind",
                "mapping": {
                    "a": {"values": ["x", "y"], "weights": [0.5, 0.5]},
                    "b": {"values": ["y", "z"], "weights": [0.1, 0.9]}
                }
            }),
        );
        let domains = HashMap::from([(
            "kind".to_string(),
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
        )]);
        let (fixed, warnings) = run(fill_conditional_defaults, entry, &["sub", "kind"], domains);
        let synthesized = &fixed.param("mapping").unwrap()["c"];
        assert_eq!(synthesized["values"], json!(["x", "y", "z"]));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, "conditional_default_synthesized");
    }

    #[test]
    fn normal_bounds_and_sigma_are_repaired() {
        let entry = field(
            "amount",
            "truncated_normal",
            json!({"mean": 10.0, "sigma": -2.0, "min_value": 50.0, "max_value": 1.0}),
        );
        let (fixed, warnings) = run(repair_normal_parameters, entry, &["amount"], HashMap::new());
        assert_eq!(fixed.param("min_value"), Some(&json!(1.0)));
        assert_eq!(fixed.param("max_value"), Some(&json!(50.0)));
        assert_eq!(fixed.param("sigma"), Some(&json!(SIGMA_EPSILON)));
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn inverted_date_bounds_are_swapped() {
        let entry = field(
            "opened",
            "uniform_date_range",
            json!({"start_date": "2024-12-31", "end_date": "2024-01-01"}),
        );
        let (fixed, warnings) = run(repair_date_bounds, entry, &["opened"], HashMap::new());
        assert_eq!(fixed.param("start_date"), Some(&json!("2024-01-01")));
        assert_eq!(fixed.param("end_date"), Some(&json!("2024-12-31")));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, "date_bounds_swapped");

        let (again, warnings) = run(repair_date_bounds, fixed.clone(), &["opened"], HashMap::new());
        assert_eq!(again, fixed);
        assert!(warnings.is_empty());
    }

    #[test]
    fn key_length_is_cut_to_the_field() {
        let mut entry = field("id", "sequential_unique_id", json!({"prefix": "A", "length": 10}));
        entry.original_spec = "X(5)".to_string();
        let (fixed, warnings) = run(fit_key_length, entry, &["id"], HashMap::new());
        assert_eq!(fixed.param("length"), Some(&json!(4)));
        assert_eq!(warnings[0].code, "key_length_reconciled");
        assert_eq!(warnings[0].path, "/fields/0/generation/parameters/length");

        let mut entry = field("client", "foreign_key_pool", json!({"prefix": "C", "length": 2}));
        entry.original_spec = "X(3)".to_string();
        let (fixed, warnings) = run(fit_key_length, entry.clone(), &["client"], HashMap::new());
        assert_eq!(fixed, entry);
        assert!(warnings.is_empty());
    }

    #[test]
    fn mapping_keys_are_escaped_in_paths() {
        let entry = field(
            "sub",
            "conditional_categorical",
            json!({
                "parent_field": "kind",
                "mapping": {"A/B": {"values": ["x", "y"], "weights": [3, 1]}}
            }),
        );
        let (_, warnings) = run(normalize_weights, entry, &["sub", "kind"], HashMap::new());
        assert_eq!(
            warnings[0].path,
            "/fields/0/generation/parameters/mapping/A~1B/weights"
        );

        let entry = field(
            "sub",
            "conditional_categorical",
            json!({
                "parent_field": "kind",
                "mapping": {"a": {"values": ["x"], "weights": [1.0]}}
            }),
        );
        let domains = HashMap::from([(
            "kind".to_string(),
            vec!["a".to_string(), "b~c".to_string()],
        )]);
        let (_, warnings) = run(fill_conditional_defaults, entry, &["sub", "kind"], domains);
        assert_eq!(warnings[0].path, "/fields/0/generation/parameters/mapping/b~0c");
    }

    #[test]
    fn pool_ratio_is_clamped() {
        let entry = field("client", "foreign_key_pool", json!({"pool_size_ratio": 2.5}));
        let (fixed, _) = run(clamp_pool_ratio, entry, &["client"], HashMap::new());
        assert_eq!(fixed.param("pool_size_ratio"), Some(&json!(1.0)));

        let entry = field("client", "foreign_key_pool", json!({"pool_size_ratio": -1}));
        let (fixed, warnings) = run(clamp_pool_ratio, entry, &["client"], HashMap::new());
        assert_eq!(fixed.param("pool_size_ratio"), Some(&json!(MIN_POOL_RATIO)));
        assert_eq!(warnings[0].code, "pool_ratio_clamped");
    }

    #[test]
    fn dangling_dependencies_are_dropped() {
        let mut entry = field("sub", "categorical_weighted", json!({"values": ["a"]}));
        entry.dependencies = vec![
            Dependency {
                field: "ghost".to_string(),
                rule: String::new(),
            },
            Dependency {
                field: "kind".to_string(),
                rule: String::new(),
            },
        ];
        let (fixed, warnings) = run(drop_dangling_dependencies, entry, &["sub", "kind"], HashMap::new());
        assert_eq!(fixed.dependencies.len(), 1);
        assert_eq!(fixed.dependencies[0].field, "kind");
        assert_eq!(warnings[0].code, "dangling_dependency_dropped");
    }

    #[test]
    fn conditional_parent_becomes_dependency() {
        let entry = field(
            "sub",
            "conditional_categorical",
            json!({"parent_field": "kind", "mapping": {}}),
        );
        let (fixed, warnings) = run(link_conditional_parent, entry, &["sub", "kind"], HashMap::new());
        assert_eq!(fixed.dependencies[0].field, "kind");
        assert_eq!(warnings[0].code, "parent_dependency_added");
    }

    #[test]
    fn colliding_and_missing_orders_are_reranked() {
        let mut first = field("a", "categorical_weighted", json!({}));
        first.generation_order = Some(1);
        let mut second = field("b", "categorical_weighted", json!({}));
        second.generation_order = Some(1);
        let mut third = field("c", "categorical_weighted", json!({}));
        third.generation_order = None;
        third.dependencies = vec![Dependency {
            field: "b".to_string(),
            rule: String::new(),
        }];
        let mut fields = vec![first, second, third];

        let warnings = assign_generation_order(&mut fields);
        assert_eq!(warnings.len(), 2);
        assert_eq!(fields[0].generation_order, Some(1));
        assert_eq!(fields[1].generation_order, Some(2));
        assert_eq!(fields[2].generation_order, Some(3));
        assert!(assign_generation_order(&mut fields).is_empty());
    }
}
