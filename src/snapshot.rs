// =============================================================================
// Snapshot Dispatcher — materialize and persist one row per dirty tick
// =============================================================================
//
// Delivery is at-least-once: the dirty flag is cleared only after the sink
// accepts the row. A failed append leaves the flag set so the next tick
// retries with all changes accumulated since the last successful flush.
// Duplicate rows are acceptable; lost rows are not.
// =============================================================================

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::PersistenceError;
use crate::quote::{FieldTag, QuoteCache};

/// One persisted row: the drift-corrected timestamp plus every symbol's seven
/// fields in configured symbol order. Immutable once built; handed to the
/// sink and not retained.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp: String,
    pub values: Vec<String>,
}

impl Snapshot {
    /// Read every record in configured symbol order. Unset fields become
    /// empty cells, never fabricated zeros.
    pub fn capture(cache: &QuoteCache, timestamp: String) -> Self {
        let mut values = Vec::with_capacity(cache.symbols().len() * FieldTag::ALL.len());
        for symbol in cache.symbols() {
            // Symbols come from the cache itself, so the lookup cannot fail.
            if let Ok(record) = cache.get(symbol) {
                for tag in FieldTag::ALL {
                    values.push(record.value_cell(tag));
                }
            }
        }
        Self { timestamp, values }
    }
}

// -----------------------------------------------------------------------------
// Persistence collaborator
// -----------------------------------------------------------------------------

/// Destination for snapshot rows. Must create the destination (with its
/// header) if absent on first append.
pub trait SnapshotSink {
    fn append_row(&mut self, snapshot: &Snapshot) -> Result<(), PersistenceError>;
}

/// CSV-backed sink. The header carries one leading `time` column followed by
/// seven `"<SYMBOL> <field>"` columns per symbol, symbols contiguous in
/// configured order.
pub struct CsvSink {
    path: PathBuf,
    symbols: Vec<String>,
}

impl CsvSink {
    /// `output_key` is the destination file stem, e.g. `Day3` -> `Day3.csv`.
    pub fn new(output_key: &str, symbols: &[String]) -> Self {
        Self {
            path: PathBuf::from(format!("{output_key}.csv")),
            symbols: symbols.to_vec(),
        }
    }

    #[cfg(test)]
    fn at_path(path: impl Into<PathBuf>, symbols: &[String]) -> Self {
        Self {
            path: path.into(),
            symbols: symbols.to_vec(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn header(&self) -> Vec<String> {
        let mut header = Vec::with_capacity(1 + self.symbols.len() * FieldTag::ALL.len());
        header.push("time".to_string());
        for symbol in &self.symbols {
            for tag in FieldTag::ALL {
                header.push(format!("{symbol} {}", tag.column_name()));
            }
        }
        header
    }

    fn write_header(&self) -> Result<(), PersistenceError> {
        let mut writer = csv::Writer::from_path(&self.path)
            .map_err(|e| PersistenceError(format!("create {}: {e}", self.path.display())))?;
        writer
            .write_record(self.header())
            .map_err(|e| PersistenceError(format!("write header: {e}")))?;
        writer
            .flush()
            .map_err(|e| PersistenceError(format!("flush header: {e}")))?;

        info!(path = %self.path.display(), "snapshot file created");
        Ok(())
    }
}

impl SnapshotSink for CsvSink {
    fn append_row(&mut self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        if !self.path.exists() {
            self.write_header()?;
        }

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| PersistenceError(format!("open {}: {e}", self.path.display())))?;

        let mut writer = csv::Writer::from_writer(file);
        let mut record = Vec::with_capacity(1 + snapshot.values.len());
        record.push(snapshot.timestamp.clone());
        record.extend(snapshot.values.iter().cloned());

        writer
            .write_record(&record)
            .map_err(|e| PersistenceError(format!("write row: {e}")))?;
        writer
            .flush()
            .map_err(|e| PersistenceError(format!("flush row: {e}")))?;

        debug!(path = %self.path.display(), time = %snapshot.timestamp, "snapshot row appended");
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Dispatch
// -----------------------------------------------------------------------------

/// Flush the cache to `sink` if the dirty flag is set.
///
/// Returns `Ok(true)` when a row was persisted (flag cleared), `Ok(false)`
/// when the cache was clean (no side effect at all). On `Err` the flag
/// remains set for the next tick's retry.
pub fn flush_if_dirty(
    cache: &mut QuoteCache,
    timestamp: String,
    sink: &mut impl SnapshotSink,
) -> Result<bool, PersistenceError> {
    if !cache.is_dirty() {
        return Ok(false);
    }

    let snapshot = Snapshot::capture(cache, timestamp);
    sink.append_row(&snapshot)?;
    cache.clear_dirty();
    Ok(true)
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
