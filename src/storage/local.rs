//! Local filesystem storage backend implementation.

use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use snafu::prelude::*;
use std::sync::Arc;

use crate::error::{IoSnafu, ObjectStoreSnafu, PathSnafu, StorageError};

use super::{BackendConfig, StorageProvider};

/// Local filesystem configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    /// Directory the store is rooted at (relative paths resolve against the
    /// working directory).
    pub path: String,
    pub key: Option<Path>,
}

impl StorageProvider {
    /// Root a store at `config.path`. With `create_root` unset, a missing
    /// directory is left alone and simply lists as empty.
    pub(super) async fn construct_local(
        config: LocalConfig,
        create_root: bool,
    ) -> Result<Self, StorageError> {
        let root = std::path::Path::new(&config.path);
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir().context(IoSnafu)?.join(root)
        };

        if create_root {
            tokio::fs::create_dir_all(&root).await.context(IoSnafu)?;
        }

        let (object_store, key): (Arc<dyn ObjectStore>, Option<Path>) =
            if tokio::fs::try_exists(&root).await.context(IoSnafu)? {
                let store = LocalFileSystem::new_with_prefix(&root).context(ObjectStoreSnafu)?;
                (Arc::new(store), config.key)
            } else {
                // new_with_prefix canonicalizes, which needs the directory to exist
                let base = Path::from_absolute_path(&root).context(PathSnafu)?;
                let key = match config.key {
                    Some(key) => base.parts().chain(key.parts()).collect(),
                    None => base,
                };
                (Arc::new(LocalFileSystem::new()), Some(key))
            };

        let canonical_url = format!("file://{}", root.display());

        Ok(Self {
            config: BackendConfig::Local(LocalConfig {
                path: root.display().to_string(),
                key,
            }),
            object_store,
            canonical_url,
        })
    }
}
