use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Run-wide settings carried inside the blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GlobalConfig {
    /// Rows produced when the host does not request a count.
    #[serde(default)]
    pub default_row_count: u64,
    /// Multiplier applied to `default_row_count`.
    #[serde(default = "default_scaling_factor")]
    pub scaling_factor: f64,
    /// Seed for reproducibility; absent means 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_seed: Option<u64>,
}

fn default_scaling_factor() -> f64 {
    1.0
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_row_count: 0,
            scaling_factor: default_scaling_factor(),
            random_seed: None,
        }
    }
}

impl GlobalConfig {
    pub fn seed(&self) -> u64 {
        self.random_seed.unwrap_or(0)
    }

    /// Row count used when the host does not ask for an explicit number.
    pub fn scaled_row_count(&self) -> u64 {
        let scaled = self.default_row_count as f64 * self.scaling_factor;
        if scaled.is_finite() && scaled > 0.0 {
            scaled.round() as u64
        } else {
            0
        }
    }
}

/// Canonical blueprint document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Blueprint {
    pub global_config: GlobalConfig,
    /// Output fields in original layout order.
    pub fields: Vec<FieldEntry>,
}

/// One output field: layout declaration plus its generation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Layout declaration such as `S9(7)V99 COMP-3` or `X(10)`.
    pub original_spec: String,
    /// Rank used to break ties between independent fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_order: Option<i64>,
    pub generation: Generation,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

/// Method tag plus method-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Generation {
    pub method: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Edge from this field to a field it reads during generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Dependency {
    pub field: String,
    /// Free-form note describing the relationship.
    #[serde(default)]
    pub rule: String,
}

impl FieldEntry {
    pub fn method(&self) -> &str {
        self.generation.method.as_str()
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.generation.parameters.get(key)
    }
}
