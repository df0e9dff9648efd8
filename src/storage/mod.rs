//! Storage abstraction handed to the reader and writer.
//!
//! A [`StorageProvider`] is an object store rooted at a key prefix. Callers
//! only see paths relative to that prefix, which keeps the pipeline agnostic
//! of whether it runs against S3, the local filesystem or memory.

mod local;
mod memory;
mod s3;
mod url_parser;

pub use local::LocalConfig;
pub use memory::MemoryConfig;
pub use s3::S3Config;
pub use url_parser::BackendConfig;

use bytes::Bytes;
use futures::{Stream, StreamExt, future::ready};
use object_store::path::Path;
use object_store::{Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload};
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::emit;
use crate::error::{ObjectStoreSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Storage provider that abstracts over the supported backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

fn join_url(base: &str, child: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with(':') {
        format!("{base}//{child}")
    } else {
        format!("{base}/{child}")
    }
}

fn record_request<T, E>(operation: StorageOperation, result: &Result<T, E>, start: Instant) {
    let status = if result.is_ok() {
        RequestStatus::Success
    } else {
        RequestStatus::Error
    };
    emit!(StorageRequest { operation, status });
    emit!(StorageRequestDuration {
        operation,
        duration: start.elapsed(),
    });
}

impl StorageProvider {
    /// Create a storage provider for the given URL with storage options.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let config = BackendConfig::parse_url(url)?;

        match config {
            BackendConfig::S3(config) => Self::construct_s3(config, options).await,
            BackendConfig::Local(config) => Self::construct_local(config, true).await,
            BackendConfig::Memory(config) => Ok(Self::construct_memory(config)),
        }
    }

    /// Like [`Self::for_url_with_options`], but never creates a missing local
    /// directory. Used for input locations.
    pub async fn for_existing_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        match BackendConfig::parse_url(url)? {
            BackendConfig::Local(config) => Self::construct_local(config, false).await,
            _ => Self::for_url_with_options(url, options).await,
        }
    }

    /// A provider sharing this connection, rooted one level deeper.
    pub fn scoped(&self, prefix: &str) -> Self {
        let child = Path::from(prefix);
        let key: Path = match self.config.key() {
            Some(key) => key.parts().chain(child.parts()).collect(),
            None => child,
        };
        let key = if key.as_ref().is_empty() {
            None
        } else {
            Some(key)
        };

        Self {
            config: self.config.with_key(key),
            object_store: Arc::clone(&self.object_store),
            canonical_url: join_url(&self.canonical_url, prefix),
        }
    }

    /// The URL this provider is rooted at.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    /// List every object under `prefix` (relative to the configured base prefix).
    ///
    /// Returns paths relative to the configured base prefix. An empty prefix
    /// lists the whole location recursively.
    pub fn list_with_prefix(
        &self,
        prefix: &str,
    ) -> impl Stream<Item = Result<Path, object_store::Error>> + '_ {
        emit!(StorageRequest {
            operation: StorageOperation::List,
            status: RequestStatus::Success,
        });

        let relative = Path::from(prefix);
        let full_prefix: Option<Path> = match self.config.key() {
            Some(key) => Some(key.parts().chain(relative.parts()).collect()),
            None if prefix.is_empty() => None,
            None => Some(relative),
        };

        let key_part_count = self
            .config
            .key()
            .map(|key| key.parts().count())
            .unwrap_or_default();

        self.object_store
            .list(full_prefix.as_ref())
            .filter_map(move |meta| {
                let result = match meta {
                    Ok(metadata) => {
                        // Strip the base prefix so callers get paths they can pass to get()
                        let relative_path: Path =
                            metadata.location.parts().skip(key_part_count).collect();
                        Some(Ok(relative_path))
                    }
                    Err(err) => Some(Err(err)),
                };
                ready(result)
            })
    }

    /// Collect every path under `prefix`, sorted.
    pub async fn list_all(&self, prefix: &str) -> Result<Vec<Path>, StorageError> {
        let mut stream = Box::pin(self.list_with_prefix(prefix));
        let mut paths = Vec::new();
        while let Some(result) = stream.next().await {
            match result {
                Ok(path) => paths.push(path),
                // Listing a prefix that was never written is an empty listing
                Err(object_store::Error::NotFound { .. }) => {}
                Err(source) => return Err(StorageError::ObjectStore { source }),
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Get the contents of a file.
    pub async fn get(&self, path: impl Into<Path>) -> Result<Bytes, StorageError> {
        let path = path.into();
        let start = Instant::now();
        let result = self.object_store.get(&self.qualify_path(&path)).await;
        record_request(StorageOperation::Get, &result, start);

        let bytes = result
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)?;
        Ok(bytes)
    }

    /// Put bytes to a path.
    pub async fn put(&self, path: impl Into<Path>, bytes: Bytes) -> Result<(), StorageError> {
        self.put_payload(&path.into(), PutPayload::from(bytes))
            .await
    }

    /// Put a payload to a path.
    pub async fn put_payload(&self, path: &Path, payload: PutPayload) -> Result<(), StorageError> {
        self.put_payload_with_opts(path, payload, PutOptions::default())
            .await
    }

    /// Put a Parquet file to a path with the correct content type.
    ///
    /// Sets `Content-Type: application/vnd.apache.parquet` on S3. The local
    /// filesystem and memory backends don't support attributes.
    pub async fn put_parquet(&self, path: &Path, payload: PutPayload) -> Result<(), StorageError> {
        if !matches!(self.config, BackendConfig::S3(_)) {
            return self.put_payload(path, payload).await;
        }

        let opts = PutOptions {
            attributes: Attributes::from_iter([(
                Attribute::ContentType,
                AttributeValue::from("application/vnd.apache.parquet"),
            )]),
            ..Default::default()
        };
        self.put_payload_with_opts(path, payload, opts).await
    }

    async fn put_payload_with_opts(
        &self,
        path: &Path,
        payload: PutPayload,
        opts: PutOptions,
    ) -> Result<(), StorageError> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.put_opts(&path, payload, opts).await;
        record_request(StorageOperation::Put, &result, start);

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Delete a file at the given path.
    pub async fn delete(&self, path: &Path) -> Result<(), StorageError> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.delete(&path).await;
        record_request(StorageOperation::Delete, &result, start);

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Atomically write content to a path using temp file + rename.
    ///
    /// 1. Write to `{path}.tmp`
    /// 2. Rename `{path}.tmp` to `{path}`
    ///
    /// If the write or rename fails, the original file (if any) is unchanged.
    pub async fn atomic_write(&self, path: &Path, content: Bytes) -> Result<(), StorageError> {
        let temp_path = Path::from(format!("{path}.tmp"));
        self.put_payload(&temp_path, PutPayload::from(content))
            .await?;
        self.rename(&temp_path, path).await
    }

    /// Server-side rename (move) operation.
    pub async fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        let from_qualified = self.qualify_path(from);
        let to_qualified = self.qualify_path(to);
        let start = Instant::now();
        let result = self
            .object_store
            .rename(&from_qualified, &to_qualified)
            .await;
        record_request(StorageOperation::Rename, &result, start);

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }
}
