//! Partitioned, full-replace table writer.
//!
//! A write goes through three phases:
//! 1. every partition file is encoded and uploaded under a fresh name
//! 2. `_manifest.json` is replaced atomically (the commit point)
//! 3. objects not named by the new manifest are deleted
//!
//! A failure in phase 1 or 2 removes the files uploaded so far and leaves
//! the previous manifest in place, so the destination keeps its prior table.
//!
//! Phase 3 is best effort and never fails the write. Readers going through
//! the manifest always see exactly the committed table. A reader that scans
//! partition directories directly can see old files next to new ones until
//! a later write removes them; `WriteSummary::cleanup_complete` is false
//! when that can happen.

use arrow::array::RecordBatch;
use async_trait::async_trait;
use futures::{StreamExt, stream};
use object_store::PutPayload;
use object_store::path::Path;
use snafu::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::manifest::{CommittedFile, CommittedTable, MANIFEST_FILE, Manifest, ManifestFile};
use super::parquet;
use super::partition::split_partitions;
use crate::config::{ParquetCompression, SinkConfig};
use crate::emit;
use crate::error::{
    EncodeTaskSnafu, NotCommittedSnafu, ReadCommittedSnafu, WriteFailureSnafu, WriterError,
};
use crate::metrics::events::{FileWritten, RowsWritten, StaleFilesRemoved};
use crate::storage::{StorageProvider, StorageProviderRef};

/// Outcome of a committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub destination: String,
    pub rows: u64,
    pub files: usize,
    pub bytes: u64,
    pub partitions: usize,
    /// False when some object not named by the new manifest may remain.
    pub cleanup_complete: bool,
}

/// Capability to persist a table at a named destination.
#[async_trait]
pub trait TableSink: Send + Sync {
    /// Replace the contents of `destination` with `table`, partitioned by
    /// `partition_columns`.
    async fn write(
        &self,
        table: &RecordBatch,
        destination: &str,
        partition_columns: &[&str],
    ) -> Result<WriteSummary, WriterError>;
}

/// Settings for the partitioned writer.
#[derive(Debug, Clone, Copy)]
pub struct WriterConfig {
    pub compression: ParquetCompression,
    pub max_rows_per_file: usize,
    pub max_concurrent_uploads: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            compression: ParquetCompression::default(),
            max_rows_per_file: 1_000_000,
            max_concurrent_uploads: 4,
        }
    }
}

impl From<&SinkConfig> for WriterConfig {
    fn from(config: &SinkConfig) -> Self {
        Self {
            compression: config.compression,
            max_rows_per_file: config.max_rows_per_file,
            max_concurrent_uploads: config.max_concurrent_uploads,
        }
    }
}

/// A file waiting to be encoded and uploaded.
struct PendingFile {
    path: String,
    batch: RecordBatch,
    partition_values: BTreeMap<String, Option<String>>,
}

/// Writes tables as Hive-partitioned Parquet under a base location.
#[derive(Debug, Clone)]
pub struct PartitionedWriter {
    storage: StorageProviderRef,
    config: WriterConfig,
}

impl PartitionedWriter {
    pub fn new(storage: StorageProviderRef, config: WriterConfig) -> Self {
        Self {
            storage,
            config: WriterConfig {
                max_rows_per_file: config.max_rows_per_file.max(1),
                max_concurrent_uploads: config.max_concurrent_uploads.max(1),
                ..config
            },
        }
    }

    fn destination(&self, name: &str) -> StorageProvider {
        self.storage.scoped(name)
    }

    /// Load the committed table at `destination` through its manifest.
    pub async fn read_committed(&self, destination: &str) -> Result<CommittedTable, WriterError> {
        let store = self.destination(destination);
        let data = match store.get(MANIFEST_FILE).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => return NotCommittedSnafu { destination }.fail(),
            Err(source) => return Err(source).context(ReadCommittedSnafu { destination }),
        };
        let manifest = Manifest::from_bytes(destination, &data)?;

        let mut files = Vec::with_capacity(manifest.files.len());
        for file in &manifest.files {
            let data = store
                .get(Path::from(file.path.as_str()))
                .await
                .context(ReadCommittedSnafu { destination })?;
            let batch = tokio::task::spawn_blocking(move || parquet::decode(data))
                .await
                .context(EncodeTaskSnafu)??;
            files.push(CommittedFile {
                file: file.clone(),
                batch,
            });
        }

        Ok(CommittedTable { manifest, files })
    }

    fn plan_files(
        &self,
        table: &RecordBatch,
        partition_columns: &[&str],
    ) -> Result<Vec<PendingFile>, WriterError> {
        let partitions = split_partitions(table, partition_columns)?;
        let mut pending = Vec::new();
        let mut index = 0usize;

        for partition in partitions {
            let directory = partition.path();
            let values: BTreeMap<String, Option<String>> = partition.values.into_iter().collect();
            let rows = partition.batch.num_rows();

            let mut offset = 0;
            while offset < rows {
                let length = self.config.max_rows_per_file.min(rows - offset);
                let name = format!("part-{index:05}-{}.parquet", Uuid::now_v7());
                let path = if directory.is_empty() {
                    name
                } else {
                    format!("{directory}/{name}")
                };
                pending.push(PendingFile {
                    path,
                    batch: partition.batch.slice(offset, length),
                    partition_values: values.clone(),
                });
                index += 1;
                offset += length;
            }
        }

        Ok(pending)
    }

    async fn upload(
        &self,
        store: &StorageProvider,
        destination: &str,
        file: PendingFile,
    ) -> Result<ManifestFile, WriterError> {
        let compression = self.config.compression;
        let rows = file.batch.num_rows() as u64;
        let batch = file.batch;
        let data = tokio::task::spawn_blocking(move || parquet::encode(&batch, compression))
            .await
            .context(EncodeTaskSnafu)??;
        let bytes = data.len() as u64;

        store
            .put_parquet(&Path::from(file.path.as_str()), PutPayload::from(data))
            .await
            .context(WriteFailureSnafu { destination })?;

        emit!(FileWritten {
            table: destination.to_string(),
            bytes,
        });
        debug!("Uploaded {} ({} rows, {} bytes)", file.path, rows, bytes);

        Ok(ManifestFile {
            path: file.path,
            rows,
            bytes,
            partition_values: file.partition_values,
        })
    }

    async fn discard(&self, store: &StorageProvider, files: &[ManifestFile]) {
        for file in files {
            if let Err(e) = store.delete(&Path::from(file.path.as_str())).await {
                warn!("Failed to remove uncommitted file {}: {}", file.path, e);
            }
        }
    }

    /// Returns whether every stale object was removed.
    async fn remove_stale(
        &self,
        store: &StorageProvider,
        destination: &str,
        manifest: &Manifest,
    ) -> bool {
        let keep: HashSet<Path> = manifest
            .files
            .iter()
            .map(|f| Path::from(f.path.as_str()))
            .chain(std::iter::once(Path::from(MANIFEST_FILE)))
            .collect();

        let listed = match store.list_all("").await {
            Ok(listed) => listed,
            Err(e) => {
                warn!("Failed to list {} for cleanup: {}", destination, e);
                return false;
            }
        };

        let mut removed = 0u64;
        let mut complete = true;
        for path in listed.into_iter().filter(|p| !keep.contains(p)) {
            match store.delete(&path).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!("Failed to remove stale file {}: {}", path, e);
                    complete = false;
                }
            }
        }

        if removed > 0 {
            debug!("Removed {} stale objects from {}", removed, destination);
            emit!(StaleFilesRemoved {
                table: destination.to_string(),
                count: removed,
            });
        }
        complete
    }
}

#[async_trait]
impl TableSink for PartitionedWriter {
    async fn write(
        &self,
        table: &RecordBatch,
        destination: &str,
        partition_columns: &[&str],
    ) -> Result<WriteSummary, WriterError> {
        let pending = self.plan_files(table, partition_columns)?;
        let partition_count = pending
            .iter()
            .map(|f| f.path.rsplit_once('/').map_or("", |(dir, _)| dir))
            .collect::<HashSet<_>>()
            .len();
        let store = self.destination(destination);
        let run_id = Uuid::now_v7().to_string();

        info!(
            "Writing {} rows to {} as {} files",
            table.num_rows(),
            store.canonical_url(),
            pending.len()
        );

        let results: Vec<Result<ManifestFile, WriterError>> = stream::iter(pending)
            .map(|file| self.upload(&store, destination, file))
            .buffer_unordered(self.config.max_concurrent_uploads)
            .collect()
            .await;

        let mut uploaded = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(file) => uploaded.push(file),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(error) = first_error {
            self.discard(&store, &uploaded).await;
            return Err(error);
        }

        let manifest = Manifest::new(
            destination,
            &run_id,
            &table.schema(),
            partition_columns,
            uploaded,
        );
        let commit = async {
            let data = manifest.to_bytes()?;
            store
                .atomic_write(&Path::from(MANIFEST_FILE), data)
                .await
                .context(WriteFailureSnafu { destination })
        };
        if let Err(e) = commit.await {
            self.discard(&store, &manifest.files).await;
            return Err(e);
        }

        let cleanup_complete = self.remove_stale(&store, destination, &manifest).await;

        let summary = WriteSummary {
            destination: destination.to_string(),
            rows: manifest.total_rows(),
            files: manifest.files.len(),
            bytes: manifest.total_bytes(),
            partitions: partition_count,
            cleanup_complete,
        };
        emit!(RowsWritten {
            table: destination.to_string(),
            rows: summary.rows,
        });
        info!(
            "Committed {}: {} rows in {} files across {} partitions",
            destination, summary.rows, summary.files, summary.partitions
        );
        Ok(summary)
    }
}

/// Shorthand for a shared sink.
pub type TableSinkRef = Arc<dyn TableSink>;
