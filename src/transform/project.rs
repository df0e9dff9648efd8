//! Column selection and renaming.

use arrow::array::RecordBatch;
use arrow::datatypes::{Field, Schema};
use snafu::prelude::*;
use std::sync::Arc;

use super::column;
use crate::error::{ArrowSnafu, TransformError};

/// Select `columns` in order, renaming each `(source, target)` pair.
///
/// A column may be selected more than once under different names.
pub fn project(
    batch: &RecordBatch,
    columns: &[(&str, &str)],
) -> Result<RecordBatch, TransformError> {
    let schema = batch.schema();
    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays = Vec::with_capacity(columns.len());

    for (source, target) in columns {
        let array = column(batch, source)?;
        let nullable = schema
            .field_with_name(source)
            .map(|f| f.is_nullable())
            .unwrap_or(true);
        fields.push(Field::new(*target, array.data_type().clone(), nullable));
        arrays.push(Arc::clone(array));
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).context(ArrowSnafu)
}
