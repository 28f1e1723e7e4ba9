//! Parse, normalize and store an export in one pass
//!
//! Entries are normalized as they stream out of the parser and written in
//! bounded batches into a single import transaction. The transaction commits
//! only once the parser reaches the end of the document, so a truncated or
//! malformed export leaves the store untouched. Activity summaries ride along
//! in the same transaction, upserted by day.

use std::fmt;
use std::io::{BufReader, Read};
use std::time::Instant;

use crate::error::Result;
use crate::models::{ActivitySummary, CanonicalRecord, EntryKind, ImportStats, RawEntry};
use crate::normalize::{normalize, normalize_summary};
use crate::parser::{ExportParser, ExportSource};
use crate::storage::{ImportTransaction, RecordStore};

/// Entries buffered before a batch is written
pub const DEFAULT_BATCH_SIZE: usize = 2000;

type ProgressFn<'a> = Box<dyn FnMut(&ImportStats) + 'a>;

/// Configurable import driver
pub struct Importer<'a> {
    batch_size: usize,
    on_progress: Option<ProgressFn<'a>>,
}

impl Default for Importer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Importer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Importer")
            .field("batch_size", &self.batch_size)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl<'a> Importer<'a> {
    pub fn new() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            on_progress: None,
        }
    }

    /// Entries per write; at least one
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Called with the running totals after every written batch
    pub fn on_progress(mut self, callback: impl FnMut(&ImportStats) + 'a) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Import an export file or archive
    pub fn import(&mut self, source: &mut ExportSource, store: &mut RecordStore) -> Result<ImportStats> {
        tracing::info!(source = %source.describe(), "Importing export");
        let entries = source.entries()?;
        self.run(entries, store)
    }

    /// Import from a raw byte stream of the export document
    pub fn import_reader<R: Read>(&mut self, reader: R, store: &mut RecordStore) -> Result<ImportStats> {
        self.run(ExportParser::new(BufReader::new(reader)), store)
    }

    /// Drive any entry stream into the store
    pub fn run<I>(&mut self, entries: I, store: &mut RecordStore) -> Result<ImportStats>
    where
        I: IntoIterator<Item = Result<RawEntry>>,
    {
        let started = Instant::now();
        let mut tx = store.begin_import()?;
        let mut stats = ImportStats::default();
        let mut batch = Batch::with_capacity(self.batch_size);

        for entry in entries {
            let entry = entry.inspect_err(|e| tracing::warn!(error = %e, "Import aborted"))?;
            stats.processed += 1;

            if entry.kind == EntryKind::ActivitySummary {
                match normalize_summary(&entry) {
                    Ok(summary) => batch.summaries.push(summary),
                    Err(e) => {
                        stats.rejected += 1;
                        tracing::debug!(day = %entry.start_date, error = %e, "Rejected activity summary");
                    }
                }
            } else {
                match normalize(&entry) {
                    Ok(Some(record)) => batch.records.push(record),
                    Ok(None) => stats.skipped += 1,
                    Err(e) => {
                        stats.rejected += 1;
                        tracing::debug!(tag = %entry.type_tag, error = %e, "Rejected entry");
                    }
                }
            }

            if batch.len() >= self.batch_size {
                self.flush(&mut tx, &mut batch, &mut stats)?;
            }
        }

        self.flush(&mut tx, &mut batch, &mut stats)?;
        tx.commit()?;

        tracing::info!(
            processed = stats.processed,
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            rejected = stats.rejected,
            skipped = stats.skipped,
            summaries = stats.summaries,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Import complete"
        );
        Ok(stats)
    }

    fn flush(
        &mut self,
        tx: &mut ImportTransaction<'_>,
        batch: &mut Batch,
        stats: &mut ImportStats,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let written = tx.write_batch(&batch.records)?;
        stats.absorb(&written);
        stats.summaries += tx.write_summaries(&batch.summaries)?;
        batch.records.clear();
        batch.summaries.clear();

        tracing::debug!(
            processed = stats.processed,
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            "Wrote batch"
        );
        if let Some(callback) = self.on_progress.as_mut() {
            callback(stats);
        }
        Ok(())
    }
}

/// Normalized entries waiting to be written
struct Batch {
    records: Vec<CanonicalRecord>,
    summaries: Vec<ActivitySummary>,
}

impl Batch {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            summaries: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.records.len() + self.summaries.len()
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty() && self.summaries.is_empty()
    }
}

/// Import an export with default settings
pub fn import(source: &mut ExportSource, store: &mut RecordStore) -> Result<ImportStats> {
    Importer::new().import(source, store)
}

/// Import a raw export document stream with default settings
pub fn import_reader<R: Read>(reader: R, store: &mut RecordStore) -> Result<ImportStats> {
    Importer::new().import_reader(reader, store)
}

/// Remove everything previously imported
pub fn reset(store: &mut RecordStore) -> Result<u64> {
    let deleted = store.delete_all()?;
    tracing::info!(deleted, "Store reset");
    Ok(deleted)
}
