use std::collections::HashMap;

use cibus_blueprint::{ConditionalRule, WeightedValues};
use cibus_core::FieldValue;
use rand::RngCore;

use super::Choice;
use crate::context::RowContext;
use crate::errors::GenerationError;

#[derive(Debug, Clone)]
pub struct WeightedGenerator {
    choice: Choice,
}

impl WeightedGenerator {
    pub fn new(field: &str, values: &WeightedValues) -> Result<Self, GenerationError> {
        Ok(Self {
            choice: Choice::new(field, values)?,
        })
    }
}

impl super::FieldGenerator for WeightedGenerator {
    fn method(&self) -> &'static str {
        "categorical_weighted"
    }

    fn generate(
        &self,
        _row: &RowContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<FieldValue, GenerationError> {
        Ok(self.choice.sample(rng))
    }
}

/// Weighted choice keyed by the value already generated for a parent field.
#[derive(Debug, Clone)]
pub struct ConditionalGenerator {
    field: String,
    parent: Option<usize>,
    mapping: HashMap<String, Choice>,
    default: Choice,
}

impl ConditionalGenerator {
    pub fn new(
        field: &str,
        rule: &ConditionalRule,
        parent: Option<usize>,
    ) -> Result<Self, GenerationError> {
        let mapping = rule
            .mapping
            .iter()
            .map(|(key, entry)| Ok((key.clone(), Choice::new(field, entry)?)))
            .collect::<Result<HashMap<_, _>, GenerationError>>()?;
        Ok(Self {
            field: field.to_string(),
            parent,
            mapping,
            default: Choice::new(field, &rule.default)?,
        })
    }
}

impl super::FieldGenerator for ConditionalGenerator {
    fn method(&self) -> &'static str {
        "conditional_categorical"
    }

    fn generate(
        &self,
        row: &RowContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<FieldValue, GenerationError> {
        let Some(position) = self.parent else {
            return Ok(self.default.sample(rng));
        };
        // Resolution order guarantees the parent ran first.
        let parent = row.value(position).ok_or_else(|| {
            GenerationError::Internal(format!(
                "field '{}' generated before its parent at row {}",
                self.field, row.index
            ))
        })?;
        let choice = self
            .mapping
            .get(&parent.lookup_key())
            .unwrap_or(&self.default);
        Ok(choice.sample(rng))
    }
}
