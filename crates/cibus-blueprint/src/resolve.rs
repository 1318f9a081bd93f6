use cibus_core::toposort;
use tracing::debug;

use crate::errors::ValidationError;
use crate::validate::{ValidatedBlueprint, dependency_edges};

/// Order in which fields are generated within a row.
///
/// Parents always precede children. Fields ready at the same time are taken
/// by ascending `generation_order`, then by declaration position. Returns
/// field positions.
pub fn resolve_order(validated: &ValidatedBlueprint) -> Result<Vec<usize>, ValidationError> {
    let keys: Vec<i64> = validated
        .fields
        .iter()
        .map(|field| field.generation_order)
        .collect();
    let order = toposort(&keys, &dependency_edges(&validated.fields)).map_err(|err| {
        ValidationError::UnresolvedOrder {
            fields: err
                .unresolved
                .iter()
                .map(|index| validated.fields[*index].name.clone())
                .collect(),
        }
    })?;

    debug!(
        order = ?order
            .iter()
            .map(|index| validated.fields[*index].name.as_str())
            .collect::<Vec<_>>(),
        "generation order resolved"
    );
    Ok(order)
}
