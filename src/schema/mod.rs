//! Fixed record definitions for the two raw input families.
//!
//! Each [`RecordKind`] maps to an ordered list of [`FieldSpec`]s. Raw fields
//! not listed here are ignored on read; listed fields are coerced strictly by
//! [`coerce`].

pub mod coerce;

pub use coerce::{Cell, RecordBuilder};

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use std::fmt;
use std::sync::Arc;

/// The two raw record families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Track metadata, one object per song file.
    Track,
    /// Session log lines, one object per user action.
    Event,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Track => write!(f, "track"),
            RecordKind::Event => write!(f, "event"),
        }
    }
}

/// Semantic type of a raw field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// 64-bit signed integer; fractional input is truncated.
    Integer,
    /// 64-bit float.
    Double,
    /// UTF-8 text.
    String,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Double => "double",
            FieldType::String => "string",
        }
    }

    pub fn arrow_type(&self) -> DataType {
        match self {
            FieldType::Integer => DataType::Int64,
            FieldType::Double => DataType::Float64,
            FieldType::String => DataType::Utf8,
        }
    }
}

/// One declared field: name as it appears in the raw record, type, nullability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub nullable: bool,
}

const fn nullable(name: &'static str, field_type: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        field_type,
        nullable: true,
    }
}

const TRACK_FIELDS: &[FieldSpec] = &[
    nullable("artist_id", FieldType::String),
    nullable("artist_latitude", FieldType::Double),
    nullable("artist_location", FieldType::String),
    nullable("artist_longitude", FieldType::Double),
    nullable("artist_name", FieldType::String),
    nullable("duration", FieldType::Double),
    nullable("num_songs", FieldType::Integer),
    nullable("song_id", FieldType::String),
    nullable("title", FieldType::String),
    nullable("year", FieldType::Integer),
];

const EVENT_FIELDS: &[FieldSpec] = &[
    nullable("artist", FieldType::String),
    nullable("auth", FieldType::String),
    nullable("firstName", FieldType::String),
    nullable("gender", FieldType::String),
    nullable("itemInSession", FieldType::Integer),
    nullable("lastName", FieldType::String),
    nullable("length", FieldType::Double),
    nullable("level", FieldType::String),
    nullable("location", FieldType::String),
    nullable("method", FieldType::String),
    nullable("page", FieldType::String),
    nullable("registration", FieldType::Double),
    nullable("sessionId", FieldType::Integer),
    nullable("song", FieldType::String),
    nullable("status", FieldType::Integer),
    nullable("ts", FieldType::Integer),
    nullable("userAgent", FieldType::String),
    nullable("userId", FieldType::Integer),
];

/// Ordered field definitions for a record kind.
pub fn fields(kind: RecordKind) -> &'static [FieldSpec] {
    match kind {
        RecordKind::Track => TRACK_FIELDS,
        RecordKind::Event => EVENT_FIELDS,
    }
}

/// Arrow schema of the table a reader produces for `kind`.
pub fn arrow_schema(kind: RecordKind) -> SchemaRef {
    let fields: Vec<Field> = fields(kind)
        .iter()
        .map(|spec| Field::new(spec.name, spec.field_type.arrow_type(), spec.nullable))
        .collect();
    Arc::new(Schema::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_registry_order() {
        let names: Vec<_> = fields(RecordKind::Track).iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            vec![
                "artist_id",
                "artist_latitude",
                "artist_location",
                "artist_longitude",
                "artist_name",
                "duration",
                "num_songs",
                "song_id",
                "title",
                "year"
            ]
        );
    }

    #[test]
    fn test_event_identifiers_are_integers() {
        let event = fields(RecordKind::Event);
        for name in ["userId", "sessionId", "ts", "itemInSession"] {
            let spec = event.iter().find(|f| f.name == name).unwrap();
            assert_eq!(spec.field_type, FieldType::Integer, "{name}");
            assert!(spec.nullable);
        }
    }

    #[test]
    fn test_arrow_schema_types() {
        let schema = arrow_schema(RecordKind::Event);
        assert_eq!(schema.fields().len(), 18);
        assert_eq!(
            schema.field_with_name("length").unwrap().data_type(),
            &DataType::Float64
        );
        assert_eq!(
            schema.field_with_name("userId").unwrap().data_type(),
            &DataType::Int64
        );
        assert_eq!(
            schema.field_with_name("page").unwrap().data_type(),
            &DataType::Utf8
        );
    }
}
