//! Hash equi-join.
//!
//! Keys compare by exact value equality. A null (or NaN) in any key column
//! never matches anything. When a left row matches several right rows the
//! right row that comes first in input order is used and the ambiguity is
//! logged, so every left row appears at most once in the output.

use arrow::array::{
    Array, ArrayRef, AsArray, Float64Array, Int32Array, Int64Array, RecordBatch, StringArray,
    UInt32Array,
};
use arrow::compute::take;
use arrow::datatypes::{DataType, Field, Float64Type, Int32Type, Int64Type, Schema};
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::column;
use crate::emit;
use crate::error::{ArrowSnafu, ColumnTypeSnafu, EmptyKeySnafu, TransformError};
use crate::metrics::events::{JoinAmbiguousRows, JoinUnmatchedRows};

/// Which left rows survive the join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// Only left rows with a match.
    Inner,
    /// Every left row; right columns are null where nothing matched.
    LeftOuter,
}

/// How to join two tables.
#[derive(Debug, Clone, Copy)]
pub struct JoinSpec<'a> {
    /// `(left column, right column)` pairs that must all be equal.
    pub on: &'a [(&'a str, &'a str)],
    pub join_type: JoinType,
    /// `(right column, output name)` pairs appended after the left columns.
    pub right_columns: &'a [(&'a str, &'a str)],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum KeyPart<'a> {
    Text(&'a str),
    Integer(i64),
    Float(u64),
}

enum KeyColumn<'a> {
    Text(&'a StringArray),
    Int64(&'a Int64Array),
    Int32(&'a Int32Array),
    Float64(&'a Float64Array),
}

impl<'a> KeyColumn<'a> {
    fn new(array: &'a ArrayRef, name: &str) -> Result<Self, TransformError> {
        match array.data_type() {
            DataType::Utf8 => Ok(KeyColumn::Text(array.as_string::<i32>())),
            DataType::Int64 => Ok(KeyColumn::Int64(array.as_primitive::<Int64Type>())),
            DataType::Int32 => Ok(KeyColumn::Int32(array.as_primitive::<Int32Type>())),
            DataType::Float64 => Ok(KeyColumn::Float64(array.as_primitive::<Float64Type>())),
            other => ColumnTypeSnafu {
                column: name,
                expected: "Utf8, Int32, Int64 or Float64",
                actual: other.to_string(),
            }
            .fail(),
        }
    }

    fn value(&self, row: usize) -> Option<KeyPart<'a>> {
        match self {
            KeyColumn::Text(a) => a.is_valid(row).then(|| KeyPart::Text(a.value(row))),
            KeyColumn::Int64(a) => a.is_valid(row).then(|| KeyPart::Integer(a.value(row))),
            KeyColumn::Int32(a) => a
                .is_valid(row)
                .then(|| KeyPart::Integer(i64::from(a.value(row)))),
            KeyColumn::Float64(a) => {
                if a.is_null(row) || a.value(row).is_nan() {
                    return None;
                }
                // +0.0 and -0.0 are equal
                let value = a.value(row) + 0.0;
                Some(KeyPart::Float(value.to_bits()))
            }
        }
    }
}

fn key_columns<'a, 'n>(
    batch: &'a RecordBatch,
    names: impl Iterator<Item = &'n str>,
) -> Result<Vec<KeyColumn<'a>>, TransformError> {
    names
        .map(|name| KeyColumn::new(column(batch, name)?, name))
        .collect()
}

fn row_key<'a>(columns: &[KeyColumn<'a>], row: usize) -> Option<Vec<KeyPart<'a>>> {
    columns.iter().map(|c| c.value(row)).collect()
}

/// Join `left` with `right` on equality of every `spec.on` pair.
///
/// Output columns are all left columns followed by `spec.right_columns`.
/// Left row order is preserved.
pub fn join(
    left: &RecordBatch,
    right: &RecordBatch,
    spec: &JoinSpec<'_>,
) -> Result<RecordBatch, TransformError> {
    ensure!(!spec.on.is_empty(), EmptyKeySnafu);

    for (left_name, right_name) in spec.on {
        let left_type = column(left, left_name)?.data_type();
        let right_type = column(right, right_name)?.data_type();
        ensure!(
            left_type == right_type,
            ColumnTypeSnafu {
                column: *right_name,
                expected: left_type.to_string(),
                actual: right_type.to_string(),
            }
        );
    }

    let left_keys = key_columns(left, spec.on.iter().map(|(l, _)| *l))?;
    let right_keys = key_columns(right, spec.on.iter().map(|(_, r)| *r))?;

    // key -> (first matching right row, number of matching right rows)
    let mut index: HashMap<Vec<KeyPart<'_>>, (u32, usize)> = HashMap::new();
    for row in 0..right.num_rows() {
        if let Some(key) = row_key(&right_keys, row) {
            index
                .entry(key)
                .and_modify(|(_, count)| *count += 1)
                .or_insert((row as u32, 1));
        }
    }

    let mut left_indices: Vec<u32> = Vec::with_capacity(left.num_rows());
    let mut right_indices: Vec<Option<u32>> = Vec::with_capacity(left.num_rows());
    let mut unmatched = 0u64;
    let mut ambiguous = 0u64;

    for row in 0..left.num_rows() {
        match row_key(&left_keys, row).and_then(|key| index.get(&key)) {
            Some(&(first, count)) => {
                if count > 1 {
                    ambiguous += 1;
                }
                left_indices.push(row as u32);
                right_indices.push(Some(first));
            }
            None => {
                unmatched += 1;
                if spec.join_type == JoinType::LeftOuter {
                    left_indices.push(row as u32);
                    right_indices.push(None);
                }
            }
        }
    }

    if ambiguous > 0 {
        warn!(
            rows = ambiguous,
            "Join rows matched more than one candidate; the first candidate was kept"
        );
        emit!(JoinAmbiguousRows { count: ambiguous });
    }
    if unmatched > 0 {
        emit!(JoinUnmatchedRows { count: unmatched });
    }
    debug!(
        "Joined {} left rows with {} right rows: {} unmatched, {} ambiguous",
        left.num_rows(),
        right.num_rows(),
        unmatched,
        ambiguous
    );

    let left_take = UInt32Array::from(left_indices);
    let right_take = UInt32Array::from(right_indices);

    let left_schema = left.schema();
    let right_schema = right.schema();
    let mut fields: Vec<Field> = Vec::new();
    let mut arrays: Vec<ArrayRef> = Vec::new();

    for (field, array) in left_schema.fields().iter().zip(left.columns()) {
        fields.push(field.as_ref().clone());
        arrays.push(take(array.as_ref(), &left_take, None).context(ArrowSnafu)?);
    }

    for (source, target) in spec.right_columns {
        let array = column(right, source)?;
        let nullable = spec.join_type == JoinType::LeftOuter
            || right_schema
                .field_with_name(source)
                .map(|f| f.is_nullable())
                .unwrap_or(true);
        fields.push(Field::new(*target, array.data_type().clone(), nullable));
        arrays.push(take(array.as_ref(), &right_take, None).context(ArrowSnafu)?);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).context(ArrowSnafu)
}
