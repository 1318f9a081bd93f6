use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

use cibus_blueprint::ValidatedBlueprint;
use crossbeam_channel::{Receiver, bounded};
use tracing::{debug, info, warn};

use crate::assembler::RecordAssembler;
use crate::context::{CancellationToken, RunContext};
use crate::errors::GenerationError;
use crate::model::{GenerateOptions, GenerationIssue, GenerationReport};
use crate::output::fixed::RecordWriter;

type RowResult = (u64, Result<Vec<u8>, GenerationError>);

/// Entry point for generating fixed-width records from a validated blueprint.
#[derive(Debug, Clone, Default)]
pub struct GenerationEngine {
    options: GenerateOptions,
}

impl GenerationEngine {
    pub fn new(options: GenerateOptions) -> Self {
        Self { options }
    }

    /// Generate `rows` records (or the blueprint's scaled default) into `out`.
    pub fn run<W: Write>(
        &self,
        validated: &ValidatedBlueprint,
        rows: Option<u64>,
        out: &mut W,
    ) -> Result<GenerationReport, GenerationError> {
        self.run_with_cancel(validated, rows, out, &CancellationToken::new())
    }

    /// Like [`GenerationEngine::run`], stopping at the next row boundary once
    /// `cancel` fires. Rows already claimed are still written.
    pub fn run_with_cancel<W: Write>(
        &self,
        validated: &ValidatedBlueprint,
        rows: Option<u64>,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> Result<GenerationReport, GenerationError> {
        let start = Instant::now();
        let rows_requested = validated.row_count(rows);
        let mut run = RunContext::new(validated.seed(), rows_requested);
        run.max_normal_retries = self.options.max_normal_retries;
        let run_id = run.run_id.clone();

        let assembler = RecordAssembler::new(validated, run)?;
        let workers = self.options.workers.max(1);

        let mut report = GenerationReport::new(
            run_id.clone(),
            validated.seed(),
            rows_requested,
            assembler.record_length(),
        );
        report.workers = workers;
        report.warnings = validated.warnings.iter().map(GenerationIssue::from).collect();
        for (field, size) in assembler.pool_sizes() {
            report.pool_sizes.insert(field.to_string(), size);
        }

        info!(
            run_id = %run_id,
            rows = rows_requested,
            workers,
            seed = report.seed,
            record_length = report.record_length,
            "generation started"
        );

        let cursor = AtomicU64::new(0);
        let stop = AtomicBool::new(false);
        let (sender, receiver) = bounded::<RowResult>(self.options.channel_capacity.max(1));
        let mut writer = RecordWriter::new(out);

        let mut failure = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let sender = sender.clone();
                    let (assembler, cursor, stop) = (&assembler, &cursor, &stop);
                    scope.spawn(move || {
                        let mut produced = 0_u64;
                        while !cancel.is_cancelled() && !stop.load(Ordering::SeqCst) {
                            let row = cursor.fetch_add(1, Ordering::SeqCst);
                            if row >= rows_requested {
                                break;
                            }
                            let result = assembler.assemble(row);
                            if sender.send((row, result)).is_err() {
                                break;
                            }
                            produced += 1;
                        }
                        debug!(worker, rows = produced, "worker finished");
                    })
                })
                .collect();
            drop(sender);

            let mut failure = write_in_order(&receiver, &mut writer, &stop);
            for handle in handles {
                if handle.join().is_err() && failure.is_none() {
                    failure = Some(GenerationError::Internal("worker panicked".to_string()));
                }
            }
            failure
        });

        let rows_written = writer.records_written();
        report.bytes_written = writer.bytes_written();
        if let Err(err) = writer.finish() {
            failure.get_or_insert(GenerationError::Io(err));
        }
        report.rows_written = rows_written;
        report.cancelled = cancel.is_cancelled() && rows_written < rows_requested;
        report.duration_ms = start.elapsed().as_millis() as u64;

        match failure {
            None => {
                info!(
                    run_id = %run_id,
                    rows_written,
                    bytes_written = report.bytes_written,
                    cancelled = report.cancelled,
                    duration_ms = report.duration_ms,
                    "generation completed"
                );
                Ok(report)
            }
            Some(err) => {
                warn!(run_id = %run_id, rows_written, error = %err, "generation failed");
                Err(GenerationError::Failed {
                    rows_written,
                    source: Box::new(err),
                })
            }
        }
    }
}

/// Drain finished rows and write them strictly by row index.
///
/// Rows that arrive early wait in a buffer. After the first failure, rows
/// before it are still written and rows after it are discarded; the channel
/// is drained to the end so no worker stays blocked on a full queue.
fn write_in_order<W: Write>(
    receiver: &Receiver<RowResult>,
    writer: &mut RecordWriter<W>,
    stop: &AtomicBool,
) -> Option<GenerationError> {
    let mut pending: BTreeMap<u64, Vec<u8>> = BTreeMap::new();
    let mut next = 0_u64;
    let mut failure: Option<(u64, GenerationError)> = None;

    for (row, result) in receiver.iter() {
        let failed_at = failure.as_ref().map(|(at, _)| *at);
        if failed_at.is_some_and(|at| row >= at) {
            continue;
        }
        match result {
            Ok(line) => {
                pending.insert(row, line);
            }
            Err(err) => {
                stop.store(true, Ordering::SeqCst);
                pending.split_off(&row);
                failure = Some((row, err));
                continue;
            }
        }

        while let Some(line) = pending.remove(&next) {
            if let Err(err) = writer.write_record(&line) {
                stop.store(true, Ordering::SeqCst);
                pending.clear();
                failure = Some((next, GenerationError::Io(err)));
                break;
            }
            next += 1;
        }
    }

    failure.map(|(_, err)| err)
}
