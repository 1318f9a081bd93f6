//! One generator per blueprint method.
//!
//! Generators are built once per run from a compiled field. Anything that
//! must be shared across rows (key pools, unique date allocations) is set up
//! at build time, so `generate` only reads run-scoped state or claims from it
//! under a lock.

mod categorical;
mod date;
mod foreign;
mod normal;
mod sequence;

use cibus_blueprint::{CompiledField, GenerationRule, WeightedValues};
use cibus_core::FieldValue;
use rand::RngCore;
use rand::distr::weighted::WeightedIndex;

use crate::context::{RowContext, RunContext};
use crate::errors::GenerationError;

pub use categorical::{ConditionalGenerator, WeightedGenerator};
pub use date::DateRangeGenerator;
pub use foreign::ForeignKeyGenerator;
pub use normal::TruncatedNormalGenerator;
pub use sequence::SequenceGenerator;

/// Produces the raw value of one field for one row.
pub trait FieldGenerator: Send + Sync {
    fn method(&self) -> &'static str;

    fn generate(
        &self,
        row: &RowContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<FieldValue, GenerationError>;

    /// Size of the pre-built key pool, for pool-backed generators.
    fn pool_size(&self) -> Option<usize> {
        None
    }
}

/// Build the generator for a compiled field.
pub fn build_generator(
    field: &CompiledField,
    run: &RunContext,
) -> Result<Box<dyn FieldGenerator>, GenerationError> {
    let generator: Box<dyn FieldGenerator> = match &field.rule {
        GenerationRule::SequentialUniqueId(rule) => {
            Box::new(SequenceGenerator::new(&field.name, rule.clone()))
        }
        GenerationRule::ForeignKeyPool(rule) => Box::new(ForeignKeyGenerator::new(
            &field.name,
            rule,
            run.num_records,
        )?),
        GenerationRule::CategoricalWeighted(values) => {
            Box::new(WeightedGenerator::new(&field.name, values)?)
        }
        GenerationRule::ConditionalCategorical(rule) => {
            Box::new(ConditionalGenerator::new(&field.name, rule, field.parent)?)
        }
        GenerationRule::TruncatedNormal(rule) => Box::new(TruncatedNormalGenerator::new(
            &field.name,
            rule,
            run.max_normal_retries,
        )?),
        GenerationRule::UniformDateRange(rule) => Box::new(DateRangeGenerator::new(
            &field.name,
            rule.clone(),
            run.field_seed(&field.name),
        )),
    };
    Ok(generator)
}

/// Weighted choice table over categorical values.
#[derive(Debug, Clone)]
pub(crate) struct Choice {
    values: Vec<FieldValue>,
    index: WeightedIndex<f64>,
}

impl Choice {
    pub(crate) fn new(field: &str, weighted: &WeightedValues) -> Result<Self, GenerationError> {
        let index = WeightedIndex::new(weighted.weights.iter().copied())
            .map_err(|err| GenerationError::strategy(field, format!("invalid weights: {err}")))?;
        let values = weighted
            .values
            .iter()
            .map(|value| FieldValue::Text(value.clone()))
            .collect();
        Ok(Self { values, index })
    }

    pub(crate) fn sample(&self, rng: &mut dyn RngCore) -> FieldValue {
        use rand::distr::Distribution;

        self.values[self.index.sample(rng)].clone()
    }
}
