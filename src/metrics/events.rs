//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in a run. Events
//! implement the `InternalEvent` trait which records the corresponding
//! Prometheus metric and a trace line.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

// ============================================================================
// Source events
// ============================================================================

/// Kind of raw record being loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Tracks,
    Events,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Tracks => "tracks",
            SourceKind::Events => "events",
        }
    }
}

/// Event emitted when a source file has been decoded.
pub struct FileRead {
    pub kind: SourceKind,
}

impl InternalEvent for FileRead {
    fn emit(self) {
        trace!(kind = self.kind.as_str(), "File read");
        counter!("playlake_files_read_total", "kind" => self.kind.as_str()).increment(1);
    }
}

/// Event emitted when raw records are decoded from a source file.
pub struct RecordsRead {
    pub kind: SourceKind,
    pub count: u64,
}

impl InternalEvent for RecordsRead {
    fn emit(self) {
        trace!(kind = self.kind.as_str(), count = self.count, "Records read");
        counter!("playlake_records_read_total", "kind" => self.kind.as_str())
            .increment(self.count);
    }
}

/// Event emitted when bytes are fetched from the source location.
pub struct BytesRead {
    pub bytes: u64,
}

impl InternalEvent for BytesRead {
    fn emit(self) {
        trace!(bytes = self.bytes, "Bytes read");
        counter!("playlake_bytes_read_total").increment(self.bytes);
    }
}

// ============================================================================
// Transform events
// ============================================================================

/// Why rows were removed from a table.
#[derive(Debug, Clone, Copy)]
pub enum DropReason {
    Filtered,
    Duplicate,
}

impl DropReason {
    fn as_str(&self) -> &'static str {
        match self {
            DropReason::Filtered => "filtered",
            DropReason::Duplicate => "duplicate",
        }
    }
}

/// Event emitted when a transformation removes rows.
pub struct RowsDropped {
    pub table: String,
    pub reason: DropReason,
    pub count: u64,
}

impl InternalEvent for RowsDropped {
    fn emit(self) {
        trace!(
            table = %self.table,
            reason = self.reason.as_str(),
            count = self.count,
            "Rows dropped"
        );
        counter!(
            "playlake_rows_dropped_total",
            "table" => self.table,
            "reason" => self.reason.as_str()
        )
        .increment(self.count);
    }
}

/// Event emitted when a left row found no partner in a join.
pub struct JoinUnmatchedRows {
    pub count: u64,
}

impl InternalEvent for JoinUnmatchedRows {
    fn emit(self) {
        trace!(count = self.count, "Join rows without a match");
        counter!("playlake_join_unmatched_rows_total").increment(self.count);
    }
}

/// Event emitted when a left row matched more than one right row.
pub struct JoinAmbiguousRows {
    pub count: u64,
}

impl InternalEvent for JoinAmbiguousRows {
    fn emit(self) {
        trace!(count = self.count, "Join rows with several matches");
        counter!("playlake_join_ambiguous_rows_total").increment(self.count);
    }
}

// ============================================================================
// Sink events
// ============================================================================

/// Event emitted when a table's rows have been committed.
pub struct RowsWritten {
    pub table: String,
    pub rows: u64,
}

impl InternalEvent for RowsWritten {
    fn emit(self) {
        trace!(table = %self.table, rows = self.rows, "Rows written");
        counter!("playlake_rows_written_total", "table" => self.table).increment(self.rows);
    }
}

/// Event emitted when a Parquet file has been uploaded.
pub struct FileWritten {
    pub table: String,
    pub bytes: u64,
}

impl InternalEvent for FileWritten {
    fn emit(self) {
        trace!(table = %self.table, bytes = self.bytes, "File written");
        counter!("playlake_files_written_total", "table" => self.table.clone()).increment(1);
        counter!("playlake_bytes_written_total", "table" => self.table).increment(self.bytes);
    }
}

/// Event emitted when files left over from a previous commit are removed.
pub struct StaleFilesRemoved {
    pub table: String,
    pub count: u64,
}

impl InternalEvent for StaleFilesRemoved {
    fn emit(self) {
        trace!(table = %self.table, count = self.count, "Stale files removed");
        counter!("playlake_stale_files_removed_total", "table" => self.table)
            .increment(self.count);
    }
}

// ============================================================================
// Histogram events for timing
// ============================================================================

/// Event emitted when a Parquet file has been encoded.
pub struct ParquetEncodeCompleted {
    pub duration: Duration,
}

impl InternalEvent for ParquetEncodeCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            "Parquet encode completed"
        );
        histogram!("playlake_parquet_encode_duration_seconds")
            .record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a pipeline step finishes.
pub struct StepCompleted {
    pub step: &'static str,
    pub duration: Duration,
}

impl InternalEvent for StepCompleted {
    fn emit(self) {
        trace!(
            step = self.step,
            duration_ms = self.duration.as_millis(),
            "Step completed"
        );
        counter!("playlake_steps_completed_total", "step" => self.step).increment(1);
        histogram!("playlake_step_duration_seconds", "step" => self.step)
            .record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Storage operation events
// ============================================================================

/// Storage operation types.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Put,
    List,
    Delete,
    Rename,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
            StorageOperation::List => "list",
            StorageOperation::Delete => "delete",
            StorageOperation::Rename => "rename",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Storage request"
        );
        counter!(
            "playlake_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a storage request completes with duration.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            duration_ms = self.duration.as_millis(),
            "Storage request duration"
        );
        histogram!(
            "playlake_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}
