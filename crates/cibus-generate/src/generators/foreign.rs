use cibus_blueprint::{ForeignKeyRule, KeyDistribution};
use cibus_core::FieldValue;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::{Rng, RngCore};
use tracing::debug;

use super::sequence::checked_key;
use crate::context::RowContext;
use crate::errors::GenerationError;

/// Samples parent keys, with replacement, from a pool built before the run.
///
/// The pool is immutable once built, so concurrent draws need no lock.
#[derive(Debug, Clone)]
pub struct ForeignKeyGenerator {
    field: String,
    pool: Vec<String>,
    skew: Option<WeightedIndex<f64>>,
}

impl ForeignKeyGenerator {
    pub fn new(field: &str, rule: &ForeignKeyRule, num_records: u64) -> Result<Self, GenerationError> {
        let size = rule.pool_size(num_records);
        let pool = (0..size as u64)
            .map(|offset| checked_key(field, &rule.keys, offset))
            .collect::<Result<Vec<_>, _>>()?;
        if pool.is_empty() {
            return Err(GenerationError::EmptyPool {
                field: field.to_string(),
            });
        }

        let skew = match key_weights(rule.distribution, pool.len()) {
            Some(weights) => Some(WeightedIndex::new(weights).map_err(|err| {
                GenerationError::strategy(field, format!("invalid key distribution: {err}"))
            })?),
            None => None,
        };
        debug!(field = %field, pool_size = pool.len(), "foreign key pool built");

        Ok(Self {
            field: field.to_string(),
            pool,
            skew,
        })
    }

    pub fn pool(&self) -> &[String] {
        &self.pool
    }
}

/// Relative weight of each pool slot; `None` for uniform draws.
fn key_weights(distribution: KeyDistribution, size: usize) -> Option<Vec<f64>> {
    match distribution {
        KeyDistribution::Uniform => None,
        KeyDistribution::Zipf { shape } => Some(
            (1..=size)
                .map(|rank| 1.0 / (rank as f64).powf(shape))
                .collect(),
        ),
        KeyDistribution::Exponential { rate } => Some(
            (0..size)
                .map(|slot| (-rate * slot as f64 / size as f64).exp())
                .collect(),
        ),
    }
}

impl super::FieldGenerator for ForeignKeyGenerator {
    fn method(&self) -> &'static str {
        "foreign_key_pool"
    }

    fn generate(
        &self,
        _row: &RowContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<FieldValue, GenerationError> {
        let slot = match &self.skew {
            Some(index) => index.sample(rng),
            None => rng.random_range(0..self.pool.len()),
        };
        self.pool
            .get(slot)
            .cloned()
            .map(FieldValue::Text)
            .ok_or_else(|| GenerationError::EmptyPool {
                field: self.field.clone(),
            })
    }

    fn pool_size(&self) -> Option<usize> {
        Some(self.pool.len())
    }
}

#[cfg(test)]
mod tests {
    use cibus_blueprint::SequenceRule;

    use super::*;

    fn rule(ratio: f64, distribution: KeyDistribution) -> ForeignKeyRule {
        ForeignKeyRule {
            keys: SequenceRule {
                start_value: 1,
                length: 4,
                prefix: "C".to_string(),
                field_width: 5,
            },
            pool_size_ratio: ratio,
            distribution,
        }
    }

    #[test]
    fn pool_size_follows_ratio() {
        let generator = ForeignKeyGenerator::new("CLIENT", &rule(0.25, KeyDistribution::Uniform), 10).unwrap();
        assert_eq!(generator.pool(), ["C0001", "C0002", "C0003"]);

        let tiny = ForeignKeyGenerator::new("CLIENT", &rule(0.01, KeyDistribution::Uniform), 10).unwrap();
        assert_eq!(tiny.pool().len(), 1);
    }

    #[test]
    fn zipf_favours_first_keys() {
        let weights = key_weights(KeyDistribution::Zipf { shape: 2.0 }, 3).unwrap();
        assert_eq!(weights, vec![1.0, 0.25, 1.0 / 9.0]);
        let weights = key_weights(KeyDistribution::Exponential { rate: 1.0 }, 2).unwrap();
        assert!(weights[0] > weights[1]);
        assert!(key_weights(KeyDistribution::Uniform, 3).is_none());
    }

    #[test]
    fn pool_keys_wider_than_field_are_rejected() {
        let mut rule = rule(1.0, KeyDistribution::Uniform);
        rule.keys.field_width = 3;
        assert!(matches!(
            ForeignKeyGenerator::new("CLIENT", &rule, 4),
            Err(GenerationError::KeySpaceExhausted { width: 3, .. })
        ));
    }
}
