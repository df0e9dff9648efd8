//! Strict coercion of raw JSON values into declared field types.
//!
//! Missing values, JSON `null` and blank text become null. Anything else that
//! cannot be represented as the declared type is a [`SchemaError`]; there is
//! no best-effort fallback.

use arrow::array::{ArrayRef, Float64Builder, Int64Builder, StringBuilder};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use serde_json::{Map, Value};
use snafu::prelude::*;
use std::sync::Arc;

use super::{FieldSpec, FieldType, RecordKind, arrow_schema, fields};
use crate::error::{CoercionSnafu, MissingRequiredSnafu, SchemaError};

/// A single coerced value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Integer(i64),
    Double(f64),
    Text(String),
}

fn violation(spec: &FieldSpec, value: &Value) -> SchemaError {
    CoercionSnafu {
        field: spec.name,
        expected: spec.field_type.as_str(),
        value: value.to_string(),
    }
    .build()
}

fn truncate(spec: &FieldSpec, raw: &Value, value: f64) -> Result<i64, SchemaError> {
    // Range check in f64 so values beyond i64 are rejected rather than saturated
    if value.is_finite() && value >= i64::MIN as f64 && value < i64::MAX as f64 {
        Ok(value.trunc() as i64)
    } else {
        Err(violation(spec, raw))
    }
}

fn coerce_integer(spec: &FieldSpec, value: &Value) -> Result<Cell, SchemaError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Cell::Integer(i))
            } else {
                let f = n.as_f64().ok_or_else(|| violation(spec, value))?;
                truncate(spec, value, f).map(Cell::Integer)
            }
        }
        Value::String(s) => {
            let text = s.trim();
            if text.is_empty() {
                Ok(Cell::Null)
            } else if let Ok(i) = text.parse::<i64>() {
                Ok(Cell::Integer(i))
            } else {
                let f = text
                    .parse::<f64>()
                    .map_err(|_| violation(spec, value))?;
                truncate(spec, value, f).map(Cell::Integer)
            }
        }
        _ => Err(violation(spec, value)),
    }
}

fn coerce_double(spec: &FieldSpec, value: &Value) -> Result<Cell, SchemaError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(Cell::Double)
            .ok_or_else(|| violation(spec, value)),
        Value::String(s) => {
            let text = s.trim();
            if text.is_empty() {
                return Ok(Cell::Null);
            }
            match text.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Cell::Double(f)),
                _ => Err(violation(spec, value)),
            }
        }
        _ => Err(violation(spec, value)),
    }
}

fn coerce_string(value: &Value) -> Cell {
    match value {
        Value::String(s) => Cell::Text(s.clone()),
        Value::Number(n) => Cell::Text(n.to_string()),
        Value::Bool(b) => Cell::Text(b.to_string()),
        // Nested values are kept as their JSON text
        Value::Array(_) | Value::Object(_) => Cell::Text(value.to_string()),
        Value::Null => Cell::Null,
    }
}

/// Coerce one raw value (or its absence) to the field's declared type.
pub fn coerce(spec: &FieldSpec, value: Option<&Value>) -> Result<Cell, SchemaError> {
    let cell = match value {
        None | Some(Value::Null) => Cell::Null,
        Some(value) => match spec.field_type {
            FieldType::Integer => coerce_integer(spec, value)?,
            FieldType::Double => coerce_double(spec, value)?,
            FieldType::String => coerce_string(value),
        },
    };

    ensure!(
        spec.nullable || cell != Cell::Null,
        MissingRequiredSnafu { field: spec.name }
    );
    Ok(cell)
}

enum ColumnBuilder {
    Integer(Int64Builder),
    Double(Float64Builder),
    Text(StringBuilder),
}

impl ColumnBuilder {
    fn new(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Integer => ColumnBuilder::Integer(Int64Builder::new()),
            FieldType::Double => ColumnBuilder::Double(Float64Builder::new()),
            FieldType::String => ColumnBuilder::Text(StringBuilder::new()),
        }
    }

    fn append(&mut self, cell: Cell) {
        match (self, cell) {
            (ColumnBuilder::Integer(b), Cell::Integer(v)) => b.append_value(v),
            (ColumnBuilder::Double(b), Cell::Double(v)) => b.append_value(v),
            (ColumnBuilder::Text(b), Cell::Text(v)) => b.append_value(v),
            (ColumnBuilder::Integer(b), _) => b.append_null(),
            (ColumnBuilder::Double(b), _) => b.append_null(),
            (ColumnBuilder::Text(b), _) => b.append_null(),
        }
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnBuilder::Integer(b) => Arc::new(b.finish()),
            ColumnBuilder::Double(b) => Arc::new(b.finish()),
            ColumnBuilder::Text(b) => Arc::new(b.finish()),
        }
    }
}

/// Accumulates raw JSON objects of one kind into a columnar batch.
pub struct RecordBuilder {
    kind: RecordKind,
    columns: Vec<ColumnBuilder>,
    rows: usize,
}

impl RecordBuilder {
    pub fn new(kind: RecordKind) -> Self {
        let columns = fields(kind)
            .iter()
            .map(|spec| ColumnBuilder::new(spec.field_type))
            .collect();
        Self {
            kind,
            columns,
            rows: 0,
        }
    }

    /// Coerce every declared field of `object` and append it as one row.
    ///
    /// On error nothing is appended.
    pub fn append(&mut self, object: &Map<String, Value>) -> Result<(), SchemaError> {
        let cells = fields(self.kind)
            .iter()
            .map(|spec| coerce(spec, object.get(spec.name)))
            .collect::<Result<Vec<_>, _>>()?;

        for (column, cell) in self.columns.iter_mut().zip(cells) {
            column.append(cell);
        }
        self.rows += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn finish(mut self) -> Result<RecordBatch, ArrowError> {
        let arrays: Vec<ArrayRef> = self.columns.iter_mut().map(|c| c.finish()).collect();
        RecordBatch::try_new(arrow_schema(self.kind), arrays)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{AsArray, Array};
    use arrow::datatypes::{Float64Type, Int64Type};
    use serde_json::json;

    const USER_ID: FieldSpec = FieldSpec {
        name: "userId",
        field_type: FieldType::Integer,
        nullable: true,
    };
    const LENGTH: FieldSpec = FieldSpec {
        name: "length",
        field_type: FieldType::Double,
        nullable: true,
    };
    const PAGE: FieldSpec = FieldSpec {
        name: "page",
        field_type: FieldType::String,
        nullable: true,
    };

    #[test]
    fn test_integer_accepts_numbers_and_numeric_text() {
        assert_eq!(coerce(&USER_ID, Some(&json!(7))).unwrap(), Cell::Integer(7));
        assert_eq!(coerce(&USER_ID, Some(&json!("7"))).unwrap(), Cell::Integer(7));
        assert_eq!(coerce(&USER_ID, Some(&json!(" 42 "))).unwrap(), Cell::Integer(42));
    }

    #[test]
    fn test_integer_truncates_fractions() {
        assert_eq!(coerce(&USER_ID, Some(&json!(7.9))).unwrap(), Cell::Integer(7));
        assert_eq!(coerce(&USER_ID, Some(&json!("26.0"))).unwrap(), Cell::Integer(26));
        assert_eq!(coerce(&USER_ID, Some(&json!(-3.7))).unwrap(), Cell::Integer(-3));
    }

    #[test]
    fn test_integer_blank_and_missing_are_null() {
        assert_eq!(coerce(&USER_ID, Some(&json!(""))).unwrap(), Cell::Null);
        assert_eq!(coerce(&USER_ID, Some(&json!("  "))).unwrap(), Cell::Null);
        assert_eq!(coerce(&USER_ID, Some(&Value::Null)).unwrap(), Cell::Null);
        assert_eq!(coerce(&USER_ID, None).unwrap(), Cell::Null);
    }

    #[test]
    fn test_integer_rejects_non_numeric() {
        for bad in [json!("abc"), json!(true), json!([1]), json!({"a": 1}), json!(1e300)] {
            let err = coerce(&USER_ID, Some(&bad)).unwrap_err();
            assert!(matches!(err, SchemaError::Coercion { .. }), "{bad}");
        }
    }

    #[test]
    fn test_double_coercion() {
        assert_eq!(coerce(&LENGTH, Some(&json!(200.0))).unwrap(), Cell::Double(200.0));
        assert_eq!(coerce(&LENGTH, Some(&json!(200))).unwrap(), Cell::Double(200.0));
        assert_eq!(coerce(&LENGTH, Some(&json!("1.5"))).unwrap(), Cell::Double(1.5));
        assert_eq!(coerce(&LENGTH, Some(&json!(""))).unwrap(), Cell::Null);
        assert!(coerce(&LENGTH, Some(&json!("long"))).is_err());
        assert!(coerce(&LENGTH, Some(&json!("NaN"))).is_err());
        assert!(coerce(&LENGTH, Some(&json!(false))).is_err());
    }

    #[test]
    fn test_string_coercion() {
        assert_eq!(
            coerce(&PAGE, Some(&json!("NextSong"))).unwrap(),
            Cell::Text("NextSong".into())
        );
        assert_eq!(coerce(&PAGE, Some(&json!(12))).unwrap(), Cell::Text("12".into()));
        assert_eq!(coerce(&PAGE, Some(&json!(true))).unwrap(), Cell::Text("true".into()));
        assert_eq!(
            coerce(&PAGE, Some(&json!({"a": 1}))).unwrap(),
            Cell::Text(r#"{"a":1}"#.into())
        );
        assert_eq!(coerce(&PAGE, Some(&json!(""))).unwrap(), Cell::Text(String::new()));
    }

    #[test]
    fn test_required_field_rejects_null() {
        let required = FieldSpec {
            nullable: false,
            ..USER_ID
        };
        let err = coerce(&required, None).unwrap_err();
        assert!(matches!(err, SchemaError::MissingRequired { .. }));
    }

    #[test]
    fn test_record_builder_ignores_unknown_fields() {
        let mut builder = RecordBuilder::new(RecordKind::Event);
        let row = json!({"userId": "7", "length": 200.5, "page": "NextSong", "extra": [1, 2]});
        builder.append(row.as_object().unwrap()).unwrap();
        let row = json!({"userId": "", "page": "Home"});
        builder.append(row.as_object().unwrap()).unwrap();
        assert_eq!(builder.len(), 2);

        let batch = builder.finish().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 18);

        let user_id = batch
            .column_by_name("userId")
            .unwrap()
            .as_primitive::<Int64Type>();
        assert_eq!(user_id.value(0), 7);
        assert!(user_id.is_null(1));

        let length = batch
            .column_by_name("length")
            .unwrap()
            .as_primitive::<Float64Type>();
        assert_eq!(length.value(0), 200.5);
        assert!(length.is_null(1));
    }

    #[test]
    fn test_record_builder_failed_row_leaves_no_trace() {
        let mut builder = RecordBuilder::new(RecordKind::Event);
        let bad = json!({"page": "NextSong", "userId": "seven"});
        assert!(builder.append(bad.as_object().unwrap()).is_err());
        assert!(builder.is_empty());
        let batch = builder.finish().unwrap();
        assert_eq!(batch.num_rows(), 0);
    }
}
