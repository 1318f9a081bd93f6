//! Method registry and typed generation rules.
//!
//! Each method tag accepted in a blueprint maps to one [`GenerationRule`]
//! variant. Compilation happens during validation so a bad method or
//! parameter set is rejected before any row is generated.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use cibus_core::TypeDescriptor;
use serde_json::Value;

use crate::errors::ValidationError;
use crate::model::FieldEntry;
use crate::params::{ParamMap, scalar_text};

pub const SEQUENTIAL_UNIQUE_ID: &str = "sequential_unique_id";
pub const FOREIGN_KEY_POOL: &str = "foreign_key_pool";
pub const CATEGORICAL_WEIGHTED: &str = "categorical_weighted";
pub const CONDITIONAL_CATEGORICAL: &str = "conditional_categorical";
pub const TRUNCATED_NORMAL: &str = "truncated_normal";
pub const UNIFORM_DATE_RANGE: &str = "uniform_date_range";

/// Every method tag the engine can generate.
pub const METHODS: &[&str] = &[
    SEQUENTIAL_UNIQUE_ID,
    FOREIGN_KEY_POOL,
    CATEGORICAL_WEIGHTED,
    CONDITIONAL_CATEGORICAL,
    TRUNCATED_NORMAL,
    UNIFORM_DATE_RANGE,
];

pub fn is_known_method(method: &str) -> bool {
    METHODS.contains(&method)
}

/// Methods whose keys are `prefix + zero_pad(counter, length)`.
pub fn uses_prefixed_keys(method: &str) -> bool {
    method == SEQUENTIAL_UNIQUE_ID || method == FOREIGN_KEY_POOL
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRule {
    SequentialUniqueId(SequenceRule),
    ForeignKeyPool(ForeignKeyRule),
    CategoricalWeighted(WeightedValues),
    ConditionalCategorical(ConditionalRule),
    TruncatedNormal(NormalRule),
    UniformDateRange(DateRangeRule),
}

impl GenerationRule {
    pub fn method(&self) -> &'static str {
        match self {
            GenerationRule::SequentialUniqueId(_) => SEQUENTIAL_UNIQUE_ID,
            GenerationRule::ForeignKeyPool(_) => FOREIGN_KEY_POOL,
            GenerationRule::CategoricalWeighted(_) => CATEGORICAL_WEIGHTED,
            GenerationRule::ConditionalCategorical(_) => CONDITIONAL_CATEGORICAL,
            GenerationRule::TruncatedNormal(_) => TRUNCATED_NORMAL,
            GenerationRule::UniformDateRange(_) => UNIFORM_DATE_RANGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRule {
    pub start_value: u64,
    /// Zero-padded width of the counter, excluding the prefix.
    pub length: usize,
    pub prefix: String,
    /// Logical width of the field the keys are written into.
    pub field_width: usize,
}

impl SequenceRule {
    pub fn format_key(&self, counter: u64) -> String {
        format!("{}{:0width$}", self.prefix, counter, width = self.length)
    }

    /// Widest key that survives encoding untruncated.
    pub fn max_key_len(&self) -> usize {
        self.prefix.len().saturating_add(self.length).min(self.field_width)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyDistribution {
    Uniform,
    /// Weight of the k-th key (1-based) is `1 / k^shape`.
    Zipf { shape: f64 },
    /// Weight of the k-th key (0-based) is `exp(-rate * k / pool_size)`.
    Exponential { rate: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyRule {
    pub keys: SequenceRule,
    pub pool_size_ratio: f64,
    pub distribution: KeyDistribution,
}

impl ForeignKeyRule {
    pub fn pool_size(&self, num_records: u64) -> usize {
        let scaled = (num_records as f64 * self.pool_size_ratio).round();
        (scaled as usize).max(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedValues {
    pub values: Vec<String>,
    pub weights: Vec<f64>,
}

impl WeightedValues {
    pub fn uniform(values: Vec<String>) -> Self {
        let weight = 1.0 / values.len().max(1) as f64;
        let weights = vec![weight; values.len()];
        Self { values, weights }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalRule {
    /// `None` when the configured parent was dropped during sanitization.
    pub parent_field: Option<String>,
    pub mapping: BTreeMap<String, WeightedValues>,
    /// Used for parent values absent from `mapping`.
    pub default: WeightedValues,
}

impl ConditionalRule {
    pub fn entry_for(&self, parent_value: Option<&str>) -> &WeightedValues {
        parent_value
            .and_then(|value| self.mapping.get(value))
            .unwrap_or(&self.default)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalRule {
    pub mean: f64,
    pub sigma: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub decimal_places: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateRangeRule {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub unique: bool,
    /// strftime pattern for the raw value.
    pub format: String,
}

impl DateRangeRule {
    pub fn day_count(&self) -> u64 {
        (self.end_date - self.start_date).num_days().max(0) as u64 + 1
    }
}

/// Build the typed rule for a sanitized field.
pub fn compile_rule(
    field: &FieldEntry,
    descriptor: &TypeDescriptor,
) -> Result<GenerationRule, ValidationError> {
    let params = ParamMap::new(&field.name, &field.generation.parameters);
    match field.method() {
        SEQUENTIAL_UNIQUE_ID => {
            sequence_rule(&params, descriptor).map(GenerationRule::SequentialUniqueId)
        }
        FOREIGN_KEY_POOL => {
            foreign_key_rule(&params, descriptor).map(GenerationRule::ForeignKeyPool)
        }
        CATEGORICAL_WEIGHTED => weighted_values(
            params.field(),
            "parameters",
            field.param("values"),
            field.param("weights"),
        )
        .map(GenerationRule::CategoricalWeighted),
        CONDITIONAL_CATEGORICAL => {
            conditional_rule(&params).map(GenerationRule::ConditionalCategorical)
        }
        TRUNCATED_NORMAL => normal_rule(&params, descriptor).map(GenerationRule::TruncatedNormal),
        UNIFORM_DATE_RANGE => {
            date_rule(&params, descriptor).map(GenerationRule::UniformDateRange)
        }
        other => Err(ValidationError::UnknownMethod {
            field: field.name.clone(),
            method: other.to_string(),
        }),
    }
}

fn sequence_rule(
    params: &ParamMap<'_>,
    descriptor: &TypeDescriptor,
) -> Result<SequenceRule, ValidationError> {
    let length = params.require_usize("length")?;
    let prefix = params.get_str("prefix")?.unwrap_or_default().to_string();
    let field_width = descriptor.logical_width();
    if prefix.len().saturating_add(length) > field_width {
        return Err(ValidationError::parameter(
            params.field(),
            format!(
                "prefix '{prefix}' plus length {length} does not fit a field of width {field_width}"
            ),
        ));
    }
    Ok(SequenceRule {
        start_value: params.get_u64("start_value")?.unwrap_or(1),
        length,
        prefix,
        field_width,
    })
}

fn foreign_key_rule(
    params: &ParamMap<'_>,
    descriptor: &TypeDescriptor,
) -> Result<ForeignKeyRule, ValidationError> {
    let keys = sequence_rule(params, descriptor)?;
    let pool_size_ratio = params.get_f64("pool_size_ratio")?.unwrap_or(1.0);
    if !(pool_size_ratio > 0.0 && pool_size_ratio <= 1.0) {
        return Err(ValidationError::parameter(
            params.field(),
            format!("pool_size_ratio {pool_size_ratio} outside (0, 1]"),
        ));
    }

    let distribution = match params.get_str("distribution")?.unwrap_or("uniform") {
        "uniform" => KeyDistribution::Uniform,
        "zipf" => KeyDistribution::Zipf {
            shape: positive(params, "shape")?,
        },
        "exponential" => KeyDistribution::Exponential {
            rate: positive(params, "rate")?,
        },
        other => {
            return Err(ValidationError::parameter(
                params.field(),
                format!("unknown distribution '{other}' (expected uniform, zipf or exponential)"),
            ));
        }
    };

    Ok(ForeignKeyRule {
        keys,
        pool_size_ratio,
        distribution,
    })
}

fn positive(params: &ParamMap<'_>, key: &str) -> Result<f64, ValidationError> {
    let value = params.get_f64(key)?.unwrap_or(1.0);
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(ValidationError::parameter(
            params.field(),
            format!("'{key}' must be positive"),
        ))
    }
}

pub(crate) fn weighted_values(
    field: &str,
    location: &str,
    values: Option<&Value>,
    weights: Option<&Value>,
) -> Result<WeightedValues, ValidationError> {
    let values = values
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ValidationError::parameter(field, format!("{location}: 'values' must be an array"))
        })?
        .iter()
        .map(|value| {
            scalar_text(value).ok_or_else(|| {
                ValidationError::parameter(field, format!("{location}: values must be scalars"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if values.is_empty() {
        return Err(ValidationError::parameter(
            field,
            format!("{location}: 'values' must not be empty"),
        ));
    }

    let Some(weights) = weights.and_then(Value::as_array) else {
        return Ok(WeightedValues::uniform(values));
    };
    let weights = weights
        .iter()
        .map(|weight| weight.as_f64().filter(|weight| weight.is_finite() && *weight >= 0.0))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| {
            ValidationError::parameter(
                field,
                format!("{location}: weights must be non-negative numbers"),
            )
        })?;
    if weights.len() != values.len() || weights.iter().sum::<f64>() <= 0.0 {
        return Err(ValidationError::parameter(
            field,
            format!("{location}: weights do not describe a distribution over values"),
        ));
    }
    Ok(WeightedValues { values, weights })
}

fn conditional_rule(params: &ParamMap<'_>) -> Result<ConditionalRule, ValidationError> {
    let parent_field = params.get_str("parent_field")?.map(str::to_string);
    let mapping_value = params.get("mapping").and_then(Value::as_object);
    let mut mapping = BTreeMap::new();
    if let Some(entries) = mapping_value {
        for (key, entry) in entries {
            let location = format!("mapping '{key}'");
            let weighted = weighted_values(
                params.field(),
                &location,
                entry.get("values"),
                entry.get("weights"),
            )?;
            mapping.insert(key.clone(), weighted);
        }
    }

    let default = match params.get("default") {
        Some(entry) => weighted_values(
            params.field(),
            "default",
            entry.get("values"),
            entry.get("weights"),
        )?,
        None => {
            let union = mapping_union(&mapping);
            if union.is_empty() {
                return Err(ValidationError::parameter(
                    params.field(),
                    "conditional_categorical needs a non-empty mapping or default",
                ));
            }
            WeightedValues::uniform(union)
        }
    };

    Ok(ConditionalRule {
        parent_field,
        mapping,
        default,
    })
}

/// Distinct values across all mapping entries, in first-seen order.
pub(crate) fn mapping_union(mapping: &BTreeMap<String, WeightedValues>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut union = Vec::new();
    for entry in mapping.values() {
        for value in &entry.values {
            if seen.insert(value.clone()) {
                union.push(value.clone());
            }
        }
    }
    union
}

fn normal_rule(
    params: &ParamMap<'_>,
    descriptor: &TypeDescriptor,
) -> Result<NormalRule, ValidationError> {
    let mean = params.require_f64("mean")?;
    let sigma = params.require_f64("sigma")?;
    if !(sigma > 0.0 && sigma.is_finite()) {
        return Err(ValidationError::parameter(params.field(), "sigma must be positive"));
    }

    let (lowest, highest) = descriptor.value_range();
    let min_value = params.get_f64("min_value")?.unwrap_or(lowest);
    let max_value = params.get_f64("max_value")?.unwrap_or(highest);
    if min_value > max_value {
        return Err(ValidationError::parameter(
            params.field(),
            "min_value must be <= max_value",
        ));
    }

    let decimal_places = match params.get_u64("decimal_places")? {
        Some(places) => u32::try_from(places)
            .map_err(|_| ValidationError::parameter(params.field(), "decimal_places too large"))?,
        None => descriptor.decimal_places,
    };

    Ok(NormalRule {
        mean,
        sigma,
        min_value,
        max_value,
        decimal_places,
    })
}

fn date_rule(
    params: &ParamMap<'_>,
    descriptor: &TypeDescriptor,
) -> Result<DateRangeRule, ValidationError> {
    let start_date = params.require_date("start_date")?;
    let end_date = params.require_date("end_date")?;
    if start_date > end_date {
        return Err(ValidationError::parameter(
            params.field(),
            "start_date must be <= end_date",
        ));
    }
    let default_format = if descriptor.is_numeric() {
        "%Y%m%d"
    } else {
        "%Y-%m-%d"
    };
    let format = params
        .get_str("format")?
        .unwrap_or(default_format)
        .to_string();

    Ok(DateRangeRule {
        start_date,
        end_date,
        unique: params.get_bool("unique")?.unwrap_or(false),
        format,
    })
}

#[cfg(test)]
mod tests {
    use cibus_core::decode_spec;
    use serde_json::{Value, json};

    use super::*;
    use crate::model::Generation;

    fn compile(spec: &str, method: &str, parameters: Value) -> Result<GenerationRule, ValidationError> {
        let field = FieldEntry {
            name: "F".to_string(),
            description: String::new(),
            original_spec: spec.to_string(),
            generation_order: Some(1),
            generation: Generation {
                method: method.to_string(),
                parameters: parameters.as_object().cloned().unwrap_or_default(),
            },
            dependencies: Vec::new(),
        };
        compile_rule(&field, &decode_spec(spec).unwrap())
    }

    #[test]
    fn sequence_needs_length() {
        let err = compile("X(5)", SEQUENTIAL_UNIQUE_ID, json!({"prefix": "A"})).unwrap_err();
        assert!(err.to_string().contains("length"));

        let rule = compile("X(5)", SEQUENTIAL_UNIQUE_ID, json!({"prefix": "A", "length": 4})).unwrap();
        let GenerationRule::SequentialUniqueId(sequence) = rule else {
            panic!("expected sequence rule");
        };
        assert_eq!(sequence.start_value, 1);
        assert_eq!(sequence.format_key(42), "A0042");
        assert_eq!(sequence.field_width, 5);
    }

    #[test]
    fn sequence_wider_than_field_is_rejected() {
        let err = compile("X(5)", SEQUENTIAL_UNIQUE_ID, json!({"prefix": "A", "length": 10}));
        assert!(matches!(err, Err(ValidationError::InvalidParameter { .. })));

        let err = compile("X(3)", FOREIGN_KEY_POOL, json!({"prefix": "C", "length": 6}));
        assert!(matches!(err, Err(ValidationError::InvalidParameter { .. })));
    }

    #[test]
    fn foreign_key_distribution_is_checked() {
        let rule = compile(
            "X(5)",
            FOREIGN_KEY_POOL,
            json!({"length": 5, "pool_size_ratio": 0.5, "distribution": "zipf", "shape": 1.5}),
        )
        .unwrap();
        let GenerationRule::ForeignKeyPool(foreign) = rule else {
            panic!("expected foreign key rule");
        };
        assert_eq!(foreign.distribution, KeyDistribution::Zipf { shape: 1.5 });
        assert_eq!(foreign.pool_size(9), 5);
        assert_eq!(foreign.pool_size(0), 1);

        let err = compile("X(5)", FOREIGN_KEY_POOL, json!({"length": 5, "distribution": "pareto"}));
        assert!(matches!(err, Err(ValidationError::InvalidParameter { .. })));
    }

    #[test]
    fn normal_bounds_default_to_field_capacity() {
        let rule = compile("S9(3)V99", TRUNCATED_NORMAL, json!({"mean": 0, "sigma": 10})).unwrap();
        let GenerationRule::TruncatedNormal(normal) = rule else {
            panic!("expected normal rule");
        };
        assert_eq!(normal.min_value, -999.99);
        assert_eq!(normal.max_value, 999.99);
        assert_eq!(normal.decimal_places, 2);
    }

    #[test]
    fn date_format_follows_field_type() {
        let params = json!({"start_date": "2024-01-01", "end_date": "2024-01-10"});
        let GenerationRule::UniformDateRange(numeric) = compile("9(8)", UNIFORM_DATE_RANGE, params.clone()).unwrap() else {
            panic!("expected date rule");
        };
        assert_eq!(numeric.format, "%Y%m%d");
        assert_eq!(numeric.day_count(), 10);

        let GenerationRule::UniformDateRange(text) = compile("X(10)", UNIFORM_DATE_RANGE, params).unwrap() else {
            panic!("expected date rule");
        };
        assert_eq!(text.format, "%Y-%m-%d");
    }

    #[test]
    fn conditional_default_is_union_of_entries() {
        let rule = compile(
            "X(2)",
            CONDITIONAL_CATEGORICAL,
            json!({
                "parent_field": "P",
                "mapping": {
                    "a": {"values": ["x", "y"], "weights": [0.5, 0.5]},
                    "b": {"values": ["y", "z"]}
                }
            }),
        )
        .unwrap();
        let GenerationRule::ConditionalCategorical(conditional) = rule else {
            panic!("expected conditional rule");
        };
        assert_eq!(conditional.default.values, vec!["x", "y", "z"]);
        assert_eq!(conditional.entry_for(Some("b")).values, vec!["y", "z"]);
        assert_eq!(conditional.entry_for(Some("q")), &conditional.default);
        assert_eq!(conditional.entry_for(None), &conditional.default);
    }
}
