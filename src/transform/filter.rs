//! Row filtering by predicate.

use arrow::array::{Array, AsArray, BooleanArray, RecordBatch, StringArray};
use arrow::compute::kernels::boolean::and;
use arrow::compute::kernels::cmp::eq;
use arrow::compute::{filter_record_batch, is_not_null};
use arrow::datatypes::DataType;
use snafu::prelude::*;

use super::{column, typed_column};
use crate::emit;
use crate::error::{ArrowSnafu, TransformError};
use crate::metrics::events::{DropReason, RowsDropped};

/// A condition a row must satisfy to be kept.
#[derive(Debug, Clone, Copy)]
pub enum Predicate<'a> {
    /// Text column equals the value exactly. Nulls never match.
    Equals { column: &'a str, value: &'a str },
    /// Column is non-null and, for text columns, not blank.
    Present { column: &'a str },
}

impl Predicate<'_> {
    fn evaluate(&self, batch: &RecordBatch) -> Result<BooleanArray, TransformError> {
        match self {
            Predicate::Equals { column, value } => {
                let array = typed_column(batch, column, &DataType::Utf8)?;
                eq(array, &StringArray::new_scalar(*value)).context(ArrowSnafu)
            }
            Predicate::Present { column: name } => {
                let array = column(batch, name)?;
                if array.data_type() == &DataType::Utf8 {
                    Ok(array
                        .as_string::<i32>()
                        .iter()
                        .map(|v| Some(v.is_some_and(|s| !s.trim().is_empty())))
                        .collect())
                } else {
                    is_not_null(array.as_ref()).context(ArrowSnafu)
                }
            }
        }
    }
}

/// Keep the rows of `batch` satisfying every predicate.
///
/// `table` labels the dropped-row metric.
pub fn filter(
    batch: &RecordBatch,
    table: &str,
    predicates: &[Predicate<'_>],
) -> Result<RecordBatch, TransformError> {
    let mut mask: Option<BooleanArray> = None;
    for predicate in predicates {
        let current = predicate.evaluate(batch)?;
        mask = Some(match mask {
            Some(previous) => and(&previous, &current).context(ArrowSnafu)?,
            None => current,
        });
    }

    let Some(mask) = mask else {
        return Ok(batch.clone());
    };

    // Null mask entries are treated as false
    let filtered = filter_record_batch(batch, &mask).context(ArrowSnafu)?;
    let dropped = batch.num_rows() - filtered.num_rows();
    if dropped > 0 {
        emit!(RowsDropped {
            table: table.to_string(),
            reason: DropReason::Filtered,
            count: dropped as u64,
        });
    }
    Ok(filtered)
}
