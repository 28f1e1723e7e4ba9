//! Data models shared by the parser, normalizer, storage and aggregation layers

pub mod activity;
pub mod metric;
pub mod record;

pub use activity::ActivitySummary;
pub use metric::{MetricId, Statistic, WORKOUT_TAG_PREFIX};
pub use record::{CanonicalRecord, EntryKind, ImportStats, RawEntry, StoredRecord};
