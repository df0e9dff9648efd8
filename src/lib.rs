//! playlake: turns raw music-track metadata and listening-session logs into
//! partitioned Parquet analytics tables.
//!
//! The pipeline reads NDJSON records through a fixed schema registry,
//! derives five tables (tracks, artists, users, time, session plays) and
//! replaces each destination wholesale.
//!
//! # Example
//!
//! ```ignore
//! use playlake::error::{ConfigSnafu, PipelineError};
//! use playlake::{Config, run_pipeline};
//! use snafu::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), PipelineError> {
//!     let config = Config::from_file("playlake.yaml").context(ConfigSnafu)?;
//!     let stats = run_pipeline(config).await?;
//!     println!("Wrote {} session plays", stats.session_plays);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod source;
pub mod storage;
pub mod transform;

// Re-export main types
pub use config::Config;
pub use pipeline::{Pipeline, PipelineStats, run_pipeline};
pub use sink::{PartitionedWriter, TableSink};
pub use source::{RecordSource, StorageSource};
pub use storage::{StorageProvider, StorageProviderRef};
