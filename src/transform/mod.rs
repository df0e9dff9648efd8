//! Table transformations.
//!
//! Every operation takes a whole table and returns a new one; inputs are
//! never mutated. Row cardinality only changes through [`filter`] and
//! [`dedup`], or through an inner [`join`].

pub mod dedup;
pub mod filter;
pub mod join;
pub mod project;
pub mod time;

pub use dedup::dedup;
pub use filter::{Predicate, filter};
pub use join::{JoinSpec, JoinType, join};
pub use project::project;
pub use time::{TimeParts, Timezone, decompose, with_time_columns};

use arrow::array::{ArrayRef, RecordBatch};
use arrow::datatypes::DataType;
use snafu::prelude::*;

use crate::error::{ColumnNotFoundSnafu, ColumnTypeSnafu, TransformError};

/// Look up a column by name.
pub(crate) fn column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a ArrayRef, TransformError> {
    batch
        .column_by_name(name)
        .context(ColumnNotFoundSnafu { column: name })
}

/// Look up a column and check its type.
pub(crate) fn typed_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
    expected: &DataType,
) -> Result<&'a ArrayRef, TransformError> {
    let array = column(batch, name)?;
    ensure!(
        array.data_type() == expected,
        ColumnTypeSnafu {
            column: name,
            expected: expected.to_string(),
            actual: array.data_type().to_string(),
        }
    );
    Ok(array)
}
