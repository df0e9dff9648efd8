//! Deduplication by business key.

use arrow::array::{RecordBatch, UInt32Array};
use arrow::compute::take_record_batch;
use arrow::row::{RowConverter, SortField};
use snafu::prelude::*;
use std::collections::HashSet;
use tracing::debug;

use super::column;
use crate::emit;
use crate::error::{ArrowSnafu, EmptyKeySnafu, TransformError};
use crate::metrics::events::{DropReason, RowsDropped};

/// Keep the first row of every distinct key tuple, in input order.
///
/// Null is a key value of its own, so rows with nulls in key columns are
/// grouped with each other and survive once.
pub fn dedup(
    batch: &RecordBatch,
    table: &str,
    keys: &[&str],
) -> Result<RecordBatch, TransformError> {
    ensure!(!keys.is_empty(), EmptyKeySnafu);

    let key_columns = keys
        .iter()
        .map(|key| column(batch, key).cloned())
        .collect::<Result<Vec<_>, _>>()?;

    let converter = RowConverter::new(
        key_columns
            .iter()
            .map(|array| SortField::new(array.data_type().clone()))
            .collect(),
    )
    .context(ArrowSnafu)?;
    let rows = converter.convert_columns(&key_columns).context(ArrowSnafu)?;

    let mut seen = HashSet::with_capacity(rows.num_rows());
    let keep: UInt32Array = (0..rows.num_rows())
        .filter(|&i| seen.insert(rows.row(i)))
        .map(|i| i as u32)
        .collect();

    let dropped = batch.num_rows() - keep.len();
    if dropped == 0 {
        return Ok(batch.clone());
    }

    debug!("Dropped {} duplicate rows from {}", dropped, table);
    emit!(RowsDropped {
        table: table.to_string(),
        reason: DropReason::Duplicate,
        count: dropped as u64,
    });

    take_record_batch(batch, &keep).context(ArrowSnafu)
}
