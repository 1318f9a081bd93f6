use cibus_blueprint::NormalRule;
use cibus_core::FieldValue;
use rand::RngCore;
use rand::distr::Distribution;
use rand_distr::Normal;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::context::RowContext;
use crate::errors::GenerationError;

/// Normal draws rejected outside `[min, max]`, clamped after the retry budget.
#[derive(Debug, Clone)]
pub struct TruncatedNormalGenerator {
    field: String,
    normal: Normal<f64>,
    min: f64,
    max: f64,
    decimal_places: u32,
    max_retries: u32,
}

impl TruncatedNormalGenerator {
    pub fn new(field: &str, rule: &NormalRule, max_retries: u32) -> Result<Self, GenerationError> {
        let normal = Normal::new(rule.mean, rule.sigma)
            .map_err(|err| GenerationError::strategy(field, format!("invalid normal: {err}")))?;
        Ok(Self {
            field: field.to_string(),
            normal,
            min: rule.min_value,
            max: rule.max_value,
            decimal_places: rule.decimal_places,
            max_retries,
        })
    }

    /// One draw plus up to `max_retries` redraws; the last rejected draw is clamped.
    fn draw(&self, rng: &mut dyn RngCore) -> f64 {
        let mut value = self.normal.sample(rng);
        for _ in 0..self.max_retries {
            if (self.min..=self.max).contains(&value) {
                return value;
            }
            value = self.normal.sample(rng);
        }
        value.clamp(self.min, self.max)
    }

    /// Round to the configured scale without leaving the bounds.
    fn to_decimal(&self, value: f64) -> Result<Decimal, GenerationError> {
        let convert = |raw: f64| {
            Decimal::from_f64_retain(raw).ok_or_else(|| {
                GenerationError::strategy(&self.field, format!("{raw} is not representable"))
            })
        };
        let rounded = convert(value)?.round_dp(self.decimal_places);
        let min = convert(self.min)?;
        let max = convert(self.max)?;
        if rounded > max {
            return Ok(max.round_dp_with_strategy(
                self.decimal_places,
                RoundingStrategy::ToNegativeInfinity,
            ));
        }
        if rounded < min {
            return Ok(min.round_dp_with_strategy(
                self.decimal_places,
                RoundingStrategy::ToPositiveInfinity,
            ));
        }
        Ok(rounded)
    }
}

impl super::FieldGenerator for TruncatedNormalGenerator {
    fn method(&self) -> &'static str {
        "truncated_normal"
    }

    fn generate(
        &self,
        _row: &RowContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<FieldValue, GenerationError> {
        let value = self.draw(rng);
        self.to_decimal(value).map(FieldValue::Number)
    }
}
