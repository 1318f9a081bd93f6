use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Mutex;

use chrono::{Days, NaiveDate};
use cibus_blueprint::DateRangeRule;
use cibus_core::FieldValue;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::context::RowContext;
use crate::errors::GenerationError;

/// Uniform day within `[start_date, end_date]`.
///
/// With `unique`, row `i` takes slot `i` of a seed-shuffled permutation of
/// the range, so no day is handed out twice and the mapping does not depend
/// on which worker builds the row.
#[derive(Debug)]
pub struct DateRangeGenerator {
    field: String,
    rule: DateRangeRule,
    days: u64,
    permutation: Option<Vec<u64>>,
    allocated: Mutex<HashSet<u64>>,
}

impl DateRangeGenerator {
    pub fn new(field: &str, rule: DateRangeRule, field_seed: u64) -> Self {
        let days = rule.day_count();
        let permutation = rule.unique.then(|| {
            let mut slots: Vec<u64> = (0..days).collect();
            slots.shuffle(&mut ChaCha8Rng::seed_from_u64(field_seed));
            slots
        });
        Self {
            field: field.to_string(),
            rule,
            days,
            permutation,
            allocated: Mutex::new(HashSet::new()),
        }
    }

    /// Distinct days handed out so far by a unique range.
    pub fn allocated(&self) -> usize {
        self.allocated.lock().map(|set| set.len()).unwrap_or(0)
    }

    fn claim(&self, permutation: &[u64], row: u64) -> Result<u64, GenerationError> {
        let slot = usize::try_from(row)
            .ok()
            .and_then(|index| permutation.get(index))
            .copied()
            .ok_or_else(|| GenerationError::UniqueDatesExhausted {
                field: self.field.clone(),
                row,
                days: self.days,
            })?;
        let mut allocated = self
            .allocated
            .lock()
            .map_err(|_| GenerationError::Internal("date allocation lock poisoned".to_string()))?;
        if !allocated.insert(slot) {
            return Err(GenerationError::Internal(format!(
                "field '{}': day slot {slot} claimed twice",
                self.field
            )));
        }
        Ok(slot)
    }

    fn format(&self, date: NaiveDate) -> Result<String, GenerationError> {
        let mut rendered = String::new();
        write!(rendered, "{}", date.format(&self.rule.format)).map_err(|_| {
            GenerationError::strategy(
                &self.field,
                format!("invalid date format '{}'", self.rule.format),
            )
        })?;
        Ok(rendered)
    }
}

impl super::FieldGenerator for DateRangeGenerator {
    fn method(&self) -> &'static str {
        "uniform_date_range"
    }

    fn generate(
        &self,
        row: &RowContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<FieldValue, GenerationError> {
        let offset = match &self.permutation {
            Some(permutation) => self.claim(permutation, row.index)?,
            None => rng.random_range(0..self.days),
        };
        let date = self
            .rule
            .start_date
            .checked_add_days(Days::new(offset))
            .ok_or_else(|| GenerationError::strategy(&self.field, "date out of range"))?;
        self.format(date).map(FieldValue::Text)
    }
}
