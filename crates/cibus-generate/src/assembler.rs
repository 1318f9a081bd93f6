use cibus_blueprint::{ValidatedBlueprint, resolve_order};
use cibus_core::{FieldValue, TypeDescriptor, encode};

use crate::context::{RowContext, RunContext};
use crate::errors::GenerationError;
use crate::generators::{FieldGenerator, build_generator};

struct FieldSlot {
    name: String,
    descriptor: TypeDescriptor,
    offset: usize,
    seed: u64,
    generator: Box<dyn FieldGenerator>,
}

/// Builds one fixed-width line per row index.
///
/// Fields are produced in resolved order so that dependants can read their
/// parents, then written at their layout offsets.
pub struct RecordAssembler {
    run: RunContext,
    slots: Vec<FieldSlot>,
    order: Vec<usize>,
    record_length: usize,
}

impl RecordAssembler {
    pub fn new(validated: &ValidatedBlueprint, run: RunContext) -> Result<Self, GenerationError> {
        let order = resolve_order(validated)?;
        let mut offset = 0;
        let mut slots = Vec::with_capacity(validated.fields.len());
        for field in &validated.fields {
            slots.push(FieldSlot {
                name: field.name.clone(),
                descriptor: field.descriptor,
                offset,
                seed: run.field_seed(&field.name),
                generator: build_generator(field, &run)?,
            });
            offset += field.descriptor.byte_length;
        }

        Ok(Self {
            run,
            slots,
            order,
            record_length: offset,
        })
    }

    /// Bytes per record, excluding the newline.
    pub fn record_length(&self) -> usize {
        self.record_length
    }

    /// Pool sizes of pool-backed fields, by field name.
    pub fn pool_sizes(&self) -> impl Iterator<Item = (&str, usize)> {
        self.slots.iter().filter_map(|slot| {
            slot.generator
                .pool_size()
                .map(|size| (slot.name.as_str(), size))
        })
    }

    /// Build the newline-terminated line for `row_index`.
    ///
    /// Either the whole line is returned or an error; a partial record is
    /// never produced.
    pub fn assemble(&self, row_index: u64) -> Result<Vec<u8>, GenerationError> {
        let mut values: Vec<Option<FieldValue>> = vec![None; self.slots.len()];
        let mut line = vec![b' '; self.record_length + 1];
        line[self.record_length] = b'\n';

        for &position in &self.order {
            let slot = &self.slots[position];
            let value = {
                let row = RowContext {
                    run: &self.run,
                    index: row_index,
                    values: &values,
                };
                let mut rng = RunContext::row_rng(slot.seed, row_index);
                slot.generator.generate(&row, &mut rng)?
            };
            let bytes = encode(&value, &slot.descriptor).map_err(|source| {
                GenerationError::Encoding {
                    field: slot.name.clone(),
                    row: row_index,
                    source,
                }
            })?;
            line[slot.offset..slot.offset + bytes.len()].copy_from_slice(&bytes);
            values[position] = Some(value);
        }
        Ok(line)
    }
}
