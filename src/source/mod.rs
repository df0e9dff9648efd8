//! Record reader.
//!
//! Lists the files matching a path pattern, downloads them concurrently and
//! decodes them into a single table with the registry schema.

pub mod pattern;
pub mod reader;

pub use pattern::PathPattern;
pub use reader::{NdjsonReader, ReadResult};

use arrow::array::RecordBatch;
use arrow::compute::concat_batches;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use snafu::prelude::*;
use tracing::{debug, info};

use crate::error::{
    BatchBuildSnafu, DecodeTaskSnafu, FetchSnafu, ListingSnafu, ReaderError, SourceNotFoundSnafu,
};
use crate::schema::{RecordKind, arrow_schema};
use crate::storage::StorageProviderRef;

/// Capability to load every record of one kind matching a pattern.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Read all records matching `pattern` as one table.
    ///
    /// Fails with [`ReaderError::SourceNotFound`] when nothing matches. Files
    /// that match but hold no records produce an empty table.
    async fn read(&self, pattern: &str, kind: RecordKind) -> Result<RecordBatch, ReaderError>;
}

/// Record source backed by a storage provider.
#[derive(Debug, Clone)]
pub struct StorageSource {
    storage: StorageProviderRef,
    max_concurrent_files: usize,
}

impl StorageSource {
    pub fn new(storage: StorageProviderRef, max_concurrent_files: usize) -> Self {
        Self {
            storage,
            max_concurrent_files: max_concurrent_files.max(1),
        }
    }

    /// Paths under the source location matching `pattern`, in lexicographic order.
    pub async fn matching_files(&self, pattern: &PathPattern) -> Result<Vec<String>, ReaderError> {
        let listed = self
            .storage
            .list_all(pattern.listing_prefix())
            .await
            .context(ListingSnafu {
                pattern: pattern.as_str(),
            })?;

        Ok(listed
            .iter()
            .map(|path| path.to_string())
            .filter(|path| pattern.matches(path))
            .collect())
    }
}

#[async_trait]
impl RecordSource for StorageSource {
    async fn read(&self, pattern: &str, kind: RecordKind) -> Result<RecordBatch, ReaderError> {
        let pattern = PathPattern::parse(pattern)?;
        let files = self.matching_files(&pattern).await?;
        ensure!(
            !files.is_empty(),
            SourceNotFoundSnafu {
                pattern: pattern.as_str(),
            }
        );

        debug!(
            "Reading {} {} files matching '{}' from {}",
            files.len(),
            kind,
            pattern.as_str(),
            self.storage.canonical_url()
        );

        let reader = NdjsonReader::new(kind);
        let storage = &self.storage;

        // `buffered` keeps file order so the first occurrence of a key is stable
        let batches: Vec<RecordBatch> = stream::iter(files)
            .map(|path| async move {
                let data = storage
                    .get(path.as_str())
                    .await
                    .context(FetchSnafu { path: path.as_str() })?;
                let result = tokio::task::spawn_blocking(move || reader.read(data, &path))
                    .await
                    .context(DecodeTaskSnafu)??;
                Ok::<_, ReaderError>(result.batch)
            })
            .buffered(self.max_concurrent_files)
            .try_collect()
            .await?;

        let table = concat_batches(&arrow_schema(kind), &batches).context(BatchBuildSnafu {
            path: pattern.as_str(),
        })?;

        info!(
            "Loaded {} {} records from {} files",
            table.num_rows(),
            kind,
            batches.len()
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageProvider;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::Arc;

    async fn memory_source(files: &[(&str, &str)]) -> StorageSource {
        let storage = StorageProvider::for_url_with_options("memory://raw", HashMap::new())
            .await
            .unwrap();
        for (path, content) in files {
            storage
                .put(*path, Bytes::copy_from_slice(content.as_bytes()))
                .await
                .unwrap();
        }
        StorageSource::new(Arc::new(storage), 2)
    }

    #[tokio::test]
    async fn test_reads_all_matching_files_in_order() {
        let source = memory_source(&[
            ("song_data/B/A/A/b.json", r#"{"song_id":"S2","title":"B"}"#),
            ("song_data/A/A/A/a.json", r#"{"song_id":"S1","title":"A"}"#),
            ("song_data/A/A/notes.txt", "ignored"),
        ])
        .await;

        let table = source
            .read("song_data/*/*/*/*.json", RecordKind::Track)
            .await
            .unwrap();
        assert_eq!(table.num_rows(), 2);

        let ids = table
            .column_by_name("song_id")
            .unwrap()
            .as_any()
            .downcast_ref::<arrow::array::StringArray>()
            .unwrap();
        assert_eq!(ids.value(0), "S1");
        assert_eq!(ids.value(1), "S2");
    }

    #[tokio::test]
    async fn test_no_match_is_source_not_found() {
        let source = memory_source(&[("log_data/a.txt", "{}")]).await;
        let err = source
            .read("log_data/*.json", RecordKind::Event)
            .await
            .unwrap_err();
        assert!(matches!(err, ReaderError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_matched_but_empty_is_empty_table() {
        let source = memory_source(&[("log_data/a.json", "\n\n")]).await;
        let table = source
            .read("log_data/*.json", RecordKind::Event)
            .await
            .unwrap();
        assert_eq!(table.num_rows(), 0);
        assert_eq!(table.schema(), arrow_schema(RecordKind::Event));
    }

    #[tokio::test]
    async fn test_one_bad_file_fails_whole_read() {
        let source = memory_source(&[
            ("log_data/a.json", r#"{"userId":"1"}"#),
            ("log_data/b.json", r#"{"userId":"one"}"#),
        ])
        .await;
        let err = source
            .read("log_data/*.json", RecordKind::Event)
            .await
            .unwrap_err();
        assert!(err.is_schema_violation());
    }
}
