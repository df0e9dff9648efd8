//! Hive-style partitioning.
//!
//! Rows are grouped by the distinct values of the partition columns. Each
//! group becomes a directory path like `year=2018/month=11`; the partition
//! columns themselves are removed from the data written under it.

use arrow::array::{Array, RecordBatch, UInt32Array};
use arrow::compute::take_record_batch;
use arrow::util::display::array_value_to_string;
use snafu::prelude::*;
use std::collections::BTreeMap;

use crate::error::{
    NoDataColumnsSnafu, PartitionArrowSnafu, UnknownPartitionColumnSnafu, WriterError,
};

/// Directory name used for null (and empty) partition values.
pub const DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Values of the partition columns for one group, in partition-column order.
pub type PartitionValues = Vec<(String, Option<String>)>;

/// One group of rows sharing the same partition values.
#[derive(Debug, Clone)]
pub struct Partition {
    pub values: PartitionValues,
    /// Rows of the group without the partition columns.
    pub batch: RecordBatch,
}

impl Partition {
    /// Relative directory of this partition; empty when unpartitioned.
    pub fn path(&self) -> String {
        partition_path(&self.values)
    }
}

fn needs_escape(c: char) -> bool {
    c.is_ascii_control()
        || matches!(
            c,
            '"' | '#' | '%' | '\'' | '*' | '/' | ':' | '=' | '?' | '\\' | '{' | '[' | ']' | '^'
        )
}

/// Percent-escape characters that are unsafe in a partition directory name.
pub fn escape_partition_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if needs_escape(c) {
            escaped.push_str(&format!("%{:02X}", c as u32));
        } else {
            escaped.push(c);
        }
    }
    escaped
}

/// Render `col=value` segments joined by `/`.
pub fn partition_path(values: &[(String, Option<String>)]) -> String {
    values
        .iter()
        .map(|(column, value)| match value {
            Some(value) => format!("{}={}", column, escape_partition_value(value)),
            None => format!("{column}={DEFAULT_PARTITION}"),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Group `batch` by the values of `columns`.
///
/// Partitions come back ordered by their values (nulls first). Without
/// partition columns the whole table is a single partition.
pub fn split_partitions(
    batch: &RecordBatch,
    columns: &[&str],
) -> Result<Vec<Partition>, WriterError> {
    let schema = batch.schema();

    let mut partition_indices = Vec::with_capacity(columns.len());
    for column in columns {
        let index = schema
            .index_of(column)
            .ok()
            .context(UnknownPartitionColumnSnafu { column: *column })?;
        partition_indices.push(index);
    }

    let data_indices: Vec<usize> = (0..schema.fields().len())
        .filter(|i| !partition_indices.contains(i))
        .collect();
    ensure!(!data_indices.is_empty(), NoDataColumnsSnafu);

    if columns.is_empty() {
        return Ok(vec![Partition {
            values: Vec::new(),
            batch: batch.clone(),
        }]);
    }

    let mut groups: BTreeMap<Vec<Option<String>>, Vec<u32>> = BTreeMap::new();
    for row in 0..batch.num_rows() {
        let mut key = Vec::with_capacity(partition_indices.len());
        for &index in &partition_indices {
            let array = batch.column(index);
            let value = if array.is_null(row) {
                None
            } else {
                let text = array_value_to_string(array, row).context(PartitionArrowSnafu)?;
                // An empty value cannot be told apart from a missing one on disk
                (!text.is_empty()).then_some(text)
            };
            key.push(value);
        }
        groups.entry(key).or_default().push(row as u32);
    }

    let data = batch.project(&data_indices).context(PartitionArrowSnafu)?;

    groups
        .into_iter()
        .map(|(key, rows)| {
            let batch = take_record_batch(&data, &UInt32Array::from(rows))
                .context(PartitionArrowSnafu)?;
            let values = columns
                .iter()
                .map(|c| c.to_string())
                .zip(key)
                .collect();
            Ok(Partition { values, batch })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int32Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn plays() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("user_id", DataType::Int64, true),
            Field::new("year", DataType::Int32, true),
            Field::new("month", DataType::Int32, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(arrow::array::Int64Array::from(vec![1, 2, 3, 4])),
                Arc::new(Int32Array::from(vec![Some(2018), Some(2018), None, Some(2018)])),
                Arc::new(Int32Array::from(vec![Some(11), Some(12), None, Some(11)])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_split_groups_rows_and_drops_partition_columns() {
        let partitions = split_partitions(&plays(), &["year", "month"]).unwrap();
        let paths: Vec<_> = partitions.iter().map(|p| p.path()).collect();
        assert_eq!(
            paths,
            vec![
                "year=__HIVE_DEFAULT_PARTITION__/month=__HIVE_DEFAULT_PARTITION__",
                "year=2018/month=11",
                "year=2018/month=12",
            ]
        );

        let november = &partitions[1];
        assert_eq!(november.batch.num_rows(), 2);
        assert_eq!(november.batch.num_columns(), 1);
        assert_eq!(
            november.values,
            vec![
                ("year".to_string(), Some("2018".to_string())),
                ("month".to_string(), Some("11".to_string())),
            ]
        );
    }

    #[test]
    fn test_unpartitioned_is_single_group() {
        let partitions = split_partitions(&plays(), &[]).unwrap();
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].path(), "");
        assert_eq!(partitions[0].batch.num_columns(), 3);
    }

    #[test]
    fn test_unknown_partition_column() {
        let err = split_partitions(&plays(), &["day"]).unwrap_err();
        assert!(matches!(err, WriterError::UnknownPartitionColumn { .. }));
    }

    #[test]
    fn test_partitioning_by_every_column_rejected() {
        let err = split_partitions(&plays(), &["user_id", "year", "month"]).unwrap_err();
        assert!(matches!(err, WriterError::NoDataColumns));
    }

    #[test]
    fn test_escaping() {
        assert_eq!(escape_partition_value("AR1"), "AR1");
        assert_eq!(escape_partition_value("a/b=c"), "a%2Fb%3Dc");
        assert_eq!(escape_partition_value("50%"), "50%25");
    }

    #[test]
    fn test_empty_string_uses_default_partition() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("artist_id", DataType::Utf8, true),
            Field::new("title", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["", "AR1"])),
                Arc::new(StringArray::from(vec!["a", "b"])),
            ],
        )
        .unwrap();
        let partitions = split_partitions(&batch, &["artist_id"]).unwrap();
        assert_eq!(partitions[0].path(), "artist_id=__HIVE_DEFAULT_PARTITION__");
        assert_eq!(partitions[1].path(), "artist_id=AR1");
    }
}
