//! Table manifest.
//!
//! `_manifest.json` at the root of a destination lists the data files of the
//! committed table. Writing it is the commit point of a full-replace write:
//! readers that go through the manifest see either the previous table or the
//! new one, never a mix.

use arrow::array::{ArrayRef, RecordBatch, StringArray};
use arrow::compute::{cast, concat_batches};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{
    ManifestSnafu, PartitionArrowSnafu, UnsupportedColumnTypeSnafu, WriterError,
};

/// Object name of the manifest inside a destination.
pub const MANIFEST_FILE: &str = "_manifest.json";

const FORMAT_VERSION: u32 = 1;

/// A column of the committed table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestField {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// A data file of the committed table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Path relative to the destination.
    pub path: String,
    pub rows: u64,
    pub bytes: u64,
    /// Partition column values of every row in the file; null for the default partition.
    #[serde(default)]
    pub partition_values: BTreeMap<String, Option<String>>,
}

/// The committed state of one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub table: String,
    pub run_id: String,
    /// RFC 3339 commit time.
    pub committed_at: String,
    pub partition_columns: Vec<String>,
    /// Full table schema, partition columns included, in table order.
    pub fields: Vec<ManifestField>,
    pub files: Vec<ManifestFile>,
}

fn data_type_name(data_type: &DataType) -> String {
    data_type.to_string()
}

fn parse_data_type(name: &str) -> Option<DataType> {
    match name {
        "Utf8" => Some(DataType::Utf8),
        "Int32" => Some(DataType::Int32),
        "Int64" => Some(DataType::Int64),
        "Float64" => Some(DataType::Float64),
        "Boolean" => Some(DataType::Boolean),
        _ => None,
    }
}

impl Manifest {
    pub fn new(
        table: &str,
        run_id: &str,
        schema: &Schema,
        partition_columns: &[&str],
        mut files: Vec<ManifestFile>,
    ) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            version: FORMAT_VERSION,
            table: table.to_string(),
            run_id: run_id.to_string(),
            committed_at: chrono::Utc::now().to_rfc3339(),
            partition_columns: partition_columns.iter().map(|c| c.to_string()).collect(),
            fields: schema
                .fields()
                .iter()
                .map(|f| ManifestField {
                    name: f.name().clone(),
                    data_type: data_type_name(f.data_type()),
                    nullable: f.is_nullable(),
                })
                .collect(),
            files,
        }
    }

    /// Serialize the manifest. Fails if a column type could not be read back.
    pub fn to_bytes(&self) -> Result<Bytes, WriterError> {
        self.schema()?;
        let json = serde_json::to_vec_pretty(self).context(ManifestSnafu {
            destination: self.table.as_str(),
        })?;
        Ok(Bytes::from(json))
    }

    pub fn from_bytes(destination: &str, data: &[u8]) -> Result<Self, WriterError> {
        let manifest: Self = serde_json::from_slice(data).context(ManifestSnafu { destination })?;
        manifest.schema()?;
        Ok(manifest)
    }

    pub fn total_rows(&self) -> u64 {
        self.files.iter().map(|f| f.rows).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes).sum()
    }

    /// Arrow schema of the full table.
    pub fn schema(&self) -> Result<SchemaRef, WriterError> {
        let fields = self
            .fields
            .iter()
            .map(|f| {
                let data_type = parse_data_type(&f.data_type).context(UnsupportedColumnTypeSnafu {
                    destination: self.table.as_str(),
                    column: f.name.as_str(),
                    data_type: f.data_type.as_str(),
                })?;
                Ok(Field::new(&f.name, data_type, f.nullable))
            })
            .collect::<Result<Vec<_>, WriterError>>()?;
        Ok(Arc::new(Schema::new(fields)))
    }
}

/// A data file loaded back from a committed destination.
#[derive(Debug, Clone)]
pub struct CommittedFile {
    pub file: ManifestFile,
    /// File contents; partition columns are not included.
    pub batch: RecordBatch,
}

/// A committed destination loaded back through its manifest.
#[derive(Debug, Clone)]
pub struct CommittedTable {
    pub manifest: Manifest,
    pub files: Vec<CommittedFile>,
}

impl CommittedTable {
    pub fn num_rows(&self) -> usize {
        self.files.iter().map(|f| f.batch.num_rows()).sum()
    }

    /// Reassemble the whole table, restoring partition columns from the
    /// partition values recorded for each file.
    pub fn to_batch(&self) -> Result<RecordBatch, WriterError> {
        let schema = self.manifest.schema()?;
        let mut batches = Vec::with_capacity(self.files.len());

        for committed in &self.files {
            let rows = committed.batch.num_rows();
            let mut arrays: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
            for field in schema.fields() {
                let array = match committed.batch.column_by_name(field.name()) {
                    Some(array) => Arc::clone(array),
                    None => {
                        let value = committed
                            .file
                            .partition_values
                            .get(field.name())
                            .cloned()
                            .flatten();
                        let text: ArrayRef =
                            Arc::new(StringArray::from(vec![value.as_deref(); rows]));
                        cast(&text, field.data_type()).context(PartitionArrowSnafu)?
                    }
                };
                arrays.push(array);
            }
            batches.push(
                RecordBatch::try_new(Arc::clone(&schema), arrays).context(PartitionArrowSnafu)?,
            );
        }

        concat_batches(&schema, &batches).context(PartitionArrowSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{AsArray, Int32Array, Int64Array};
    use arrow::datatypes::Int32Type;

    fn plays_schema() -> Schema {
        Schema::new(vec![
            Field::new("user_id", DataType::Int64, true),
            Field::new("year", DataType::Int32, true),
        ])
    }

    fn file(path: &str, rows: u64, year: Option<&str>) -> ManifestFile {
        ManifestFile {
            path: path.to_string(),
            rows,
            bytes: 100,
            partition_values: BTreeMap::from([("year".to_string(), year.map(str::to_string))]),
        }
    }

    #[test]
    fn test_manifest_roundtrip_and_ordering() {
        let manifest = Manifest::new(
            "session_plays",
            "run-1",
            &plays_schema(),
            &["year"],
            vec![
                file("year=2018/part-00001.parquet", 3, Some("2018")),
                file("year=2017/part-00000.parquet", 2, Some("2017")),
            ],
        );
        assert_eq!(manifest.files[0].path, "year=2017/part-00000.parquet");
        assert_eq!(manifest.total_rows(), 5);
        assert_eq!(manifest.total_bytes(), 200);

        let bytes = manifest.to_bytes().unwrap();
        let parsed = Manifest::from_bytes("session_plays", &bytes).unwrap();
        assert_eq!(parsed, manifest);
        assert_eq!(parsed.schema().unwrap().field(1).data_type(), &DataType::Int32);
    }

    #[test]
    fn test_unknown_column_type_is_rejected() {
        let schema = Schema::new(vec![
            Field::new("user_id", DataType::Int64, true),
            Field::new("score", DataType::Float32, true),
        ]);
        let manifest = Manifest::new("users", "run-1", &schema, &[], vec![]);
        let err = manifest.to_bytes().unwrap_err();
        assert!(
            matches!(&err, WriterError::UnsupportedColumnType { column, data_type, .. }
                if column == "score" && data_type == "Float32"),
            "{err}"
        );

        let mut value = serde_json::to_value(&Manifest::new(
            "users",
            "run-1",
            &plays_schema(),
            &[],
            vec![],
        ))
        .unwrap();
        value["fields"][0]["data_type"] = serde_json::json!("Decimal128(10, 2)");
        let err = Manifest::from_bytes("users", &serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(matches!(err, WriterError::UnsupportedColumnType { .. }), "{err}");
    }

    #[test]
    fn test_corrupt_manifest() {
        let err = Manifest::from_bytes("users", b"{not json").unwrap_err();
        assert!(matches!(err, WriterError::Manifest { .. }));
    }

    #[test]
    fn test_to_batch_restores_partition_columns() {
        let manifest = Manifest::new(
            "session_plays",
            "run-1",
            &plays_schema(),
            &["year"],
            vec![
                file("year=2018/a.parquet", 2, Some("2018")),
                file("year=__HIVE_DEFAULT_PARTITION__/b.parquet", 1, None),
            ],
        );
        let data_schema = Arc::new(Schema::new(vec![Field::new(
            "user_id",
            DataType::Int64,
            true,
        )]));
        let batch = |ids: Vec<i64>| {
            RecordBatch::try_new(Arc::clone(&data_schema), vec![Arc::new(Int64Array::from(ids))])
                .unwrap()
        };
        let table = CommittedTable {
            files: vec![
                CommittedFile {
                    file: manifest.files[0].clone(),
                    batch: batch(vec![1, 2]),
                },
                CommittedFile {
                    file: manifest.files[1].clone(),
                    batch: batch(vec![3]),
                },
            ],
            manifest,
        };

        assert_eq!(table.num_rows(), 3);
        let full = table.to_batch().unwrap();
        assert_eq!(full.num_columns(), 2);
        let years = full.column(1).as_primitive::<Int32Type>();
        assert_eq!(years, &Int32Array::from(vec![Some(2018), Some(2018), None]));
    }
}
