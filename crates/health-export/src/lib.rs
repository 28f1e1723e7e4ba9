//! Apple Health export importer
//!
//! Streams `export.xml` (or the `export.zip` around it), normalizes supported
//! records into canonical units, stores them idempotently in SQLite and
//! summarizes them per day, week or month in any IANA timezone. Daily Activity
//! ring totals are kept alongside, one row per day.
//!
//! ```no_run
//! use health_export::{aggregate, import, ExportSource, Granularity, MetricId, RecordStore};
//!
//! # fn main() -> health_export::Result<()> {
//! let mut store = RecordStore::open("health.db")?;
//! let mut source = ExportSource::open("export.zip")?;
//! let stats = import(&mut source, &mut store)?;
//! println!("{}", stats);
//!
//! for bucket in aggregate(&store, MetricId::Steps, Granularity::Day, "Europe/Amsterdam", None)? {
//!     println!("{} {}", bucket.label(), bucket.sum);
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod error;
pub mod import;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod parser;
pub mod storage;

pub use aggregate::{
    aggregate, aggregate_with, AggregateBucket, AggregateRequest, Granularity, Measure, TimeRange,
};
pub use error::{HealthError, Result};
pub use import::{import, import_reader, reset, Importer};
pub use models::{
    ActivitySummary, CanonicalRecord, EntryKind, ImportStats, MetricId, RawEntry, StoredRecord,
};
pub use normalize::{normalize, normalize_summary, record_hash, NormalizeError};
pub use parser::{parse, ExportParser, ExportSource};
pub use storage::{ImportTransaction, RecordStore};
