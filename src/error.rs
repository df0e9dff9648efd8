//! Error types for playlake using snafu.
//!
//! Each layer of the pipeline has its own error enum; the orchestrator wraps
//! them in [`PipelineError`] together with the name of the step that failed.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error: {source}"))]
    S3Config { source: object_store::Error },

    /// A local directory could not be expressed as an object path.
    #[snafu(display("Invalid local path: {source}"))]
    Path { source: object_store::path::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Input base location is empty.
    #[snafu(display("Source path cannot be empty"))]
    EmptySourcePath,

    /// Output base location is empty.
    #[snafu(display("Sink path cannot be empty"))]
    EmptySinkPath,

    /// A read pattern is empty.
    #[snafu(display("Pattern for {kind} records cannot be empty"))]
    EmptyPattern { kind: String },

    /// Timezone setting could not be understood.
    #[snafu(display("Invalid timezone '{value}': expected utc, local or an offset like +05:30"))]
    InvalidTimezone { value: String },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {path}: {source}"))]
    ReadFile {
        path: String,
        source: std::io::Error,
    },
}

// ============ Schema Errors ============

/// A single raw value that could not be coerced to its declared type.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SchemaError {
    /// The value has the wrong JSON shape or unparseable text for the field.
    #[snafu(display("Field '{field}' expects {expected}, got {value}"))]
    Coercion {
        field: String,
        expected: &'static str,
        value: String,
    },

    /// A non-nullable field was missing or null.
    #[snafu(display("Field '{field}' is required but was null or missing"))]
    MissingRequired { field: String },
}

// ============ Reader Errors ============

/// Errors that can occur while loading raw records.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReaderError {
    /// No file matched the read pattern.
    #[snafu(display("No files match pattern '{pattern}'"))]
    SourceNotFound { pattern: String },

    /// The read pattern itself is invalid.
    #[snafu(display("Invalid path pattern '{pattern}': {message}"))]
    InvalidPattern { pattern: String, message: String },

    /// A record's field failed type coercion.
    #[snafu(display("Schema violation in {path} line {line}: {source}"))]
    SchemaViolation {
        path: String,
        line: usize,
        source: SchemaError,
    },

    /// A line is not a JSON object.
    #[snafu(display("Malformed record in {path} line {line}: {message}"))]
    MalformedRecord {
        path: String,
        line: usize,
        message: String,
    },

    /// Listing the source location failed.
    #[snafu(display("Failed to list files for pattern '{pattern}': {source}"))]
    Listing {
        pattern: String,
        source: StorageError,
    },

    /// Fetching a matched file failed.
    #[snafu(display("Failed to fetch {path}: {source}"))]
    Fetch { path: String, source: StorageError },

    /// Gzip decompression failed.
    #[snafu(display("Gzip decompression failed for {path}: {source}"))]
    GzipDecompression {
        path: String,
        source: std::io::Error,
    },

    /// Assembling the Arrow batch failed.
    #[snafu(display("Failed to build record batch for {path}: {source}"))]
    BatchBuild {
        path: String,
        source: arrow::error::ArrowError,
    },

    /// A blocking decode task panicked or was cancelled.
    #[snafu(display("Decode task failed: {source}"))]
    DecodeTask { source: tokio::task::JoinError },
}

impl ReaderError {
    /// Whether this error belongs to the schema-violation class.
    pub fn is_schema_violation(&self) -> bool {
        matches!(
            self,
            ReaderError::SchemaViolation { .. } | ReaderError::MalformedRecord { .. }
        )
    }
}

// ============ Transform Errors ============

/// Errors raised by the table transformations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransformError {
    /// A referenced column does not exist in the table.
    #[snafu(display("Column '{column}' not found"))]
    ColumnNotFound { column: String },

    /// A column has a different type than the transformation requires.
    #[snafu(display("Column '{column}' has type {actual}, expected {expected}"))]
    ColumnType {
        column: String,
        expected: String,
        actual: String,
    },

    /// Deduplication was requested without key columns.
    #[snafu(display("Deduplication requires at least one key column"))]
    EmptyKey,

    /// An Arrow kernel failed.
    #[snafu(display("Arrow operation failed: {source}"))]
    Arrow { source: arrow::error::ArrowError },
}

// ============ Writer Errors ============

/// Errors that can occur while persisting a table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WriterError {
    /// The destination could not be written; its prior state is preserved.
    #[snafu(display("Write to destination '{destination}' failed: {source}"))]
    WriteFailure {
        destination: String,
        source: StorageError,
    },

    /// Reading back a committed destination failed.
    #[snafu(display("Read of destination '{destination}' failed: {source}"))]
    ReadCommitted {
        destination: String,
        source: StorageError,
    },

    /// A partition column is not part of the table.
    #[snafu(display("Partition column '{column}' not found in table"))]
    UnknownPartitionColumn { column: String },

    /// Every column of the table is a partition column.
    #[snafu(display("Table must keep at least one non-partition column"))]
    NoDataColumns,

    /// Parquet encoding or decoding failed.
    #[snafu(display("Parquet error: {source}"))]
    Parquet {
        source: parquet::errors::ParquetError,
    },

    /// An Arrow kernel failed while splitting partitions.
    #[snafu(display("Arrow error while partitioning: {source}"))]
    PartitionArrow { source: arrow::error::ArrowError },

    /// The manifest could not be (de)serialized.
    #[snafu(display("Manifest error for '{destination}': {source}"))]
    Manifest {
        destination: String,
        source: serde_json::Error,
    },

    /// A manifest names a column type the reader cannot reconstruct.
    #[snafu(display(
        "Manifest for '{destination}' has column '{column}' of unsupported type {data_type}"
    ))]
    UnsupportedColumnType {
        destination: String,
        column: String,
        data_type: String,
    },

    /// A destination has no committed manifest.
    #[snafu(display("Destination '{destination}' has no committed table"))]
    NotCommitted { destination: String },

    /// A blocking encode task panicked or was cancelled.
    #[snafu(display("Encode task failed: {source}"))]
    EncodeTask { source: tokio::task::JoinError },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder: {source}"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Failed to parse the listen address.
    #[snafu(display("Failed to parse metrics address: {source}"))]
    AddressParse { source: std::net::AddrParseError },
}

// ============ Pipeline Error (top-level) ============

/// Top-level errors; every fatal error aborts the remaining steps.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Storage setup error.
    #[snafu(display("Storage error: {source}"))]
    PipelineStorage { source: StorageError },

    /// Reading a source failed.
    #[snafu(display("Step '{step}' failed to read records: {source}"))]
    Read { step: String, source: ReaderError },

    /// A transformation failed.
    #[snafu(display("Step '{step}' failed to transform records: {source}"))]
    Transform {
        step: String,
        source: TransformError,
    },

    /// Writing a table failed.
    #[snafu(display("Step '{step}' failed to write table: {source}"))]
    Write { step: String, source: WriterError },

    /// The run was cancelled before the named step started.
    #[snafu(display("Run cancelled before step '{step}'"))]
    Cancelled { step: String },

    /// Metrics error.
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },
}

impl PipelineError {
    /// Check if this error was caused by a read pattern matching no files.
    pub fn is_source_not_found(&self) -> bool {
        matches!(
            self,
            PipelineError::Read {
                source: ReaderError::SourceNotFound { .. },
                ..
            }
        )
    }

    /// Check if this error was caused by a record failing schema coercion.
    pub fn is_schema_violation(&self) -> bool {
        match self {
            PipelineError::Read { source, .. } => source.is_schema_violation(),
            _ => false,
        }
    }

    /// Check if this error was caused by an unwritable destination.
    pub fn is_write_failure(&self) -> bool {
        matches!(
            self,
            PipelineError::Write {
                source: WriterError::WriteFailure { .. },
                ..
            }
        )
    }
}
