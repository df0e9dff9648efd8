//! Partitioned writer.
//!
//! Persists tables as Hive-partitioned Parquet files with full-replace
//! semantics per destination.

pub mod manifest;
pub mod parquet;
pub mod partition;
pub mod writer;

pub use manifest::{CommittedFile, CommittedTable, MANIFEST_FILE, Manifest, ManifestFile};
pub use writer::{PartitionedWriter, TableSink, TableSinkRef, WriteSummary, WriterConfig};
