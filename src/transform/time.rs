//! Calendar decomposition of epoch-millisecond timestamps.
//!
//! [`decompose`] is a pure function of the timestamp and a [`Timezone`]; the
//! wall clock of the host never enters the result unless `Timezone::Local`
//! is chosen explicitly.

use arrow::array::{ArrayRef, AsArray, Int32Builder, RecordBatch};
use arrow::datatypes::{DataType, Field, Int64Type, Schema};
use chrono::{DateTime, Datelike, FixedOffset, Local, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::typed_column;
use crate::error::{ArrowSnafu, ConfigError, InvalidTimezoneSnafu, TransformError};

/// Clock used to turn an instant into calendar fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timezone {
    #[default]
    Utc,
    /// The host's local time; results depend on the machine running the job.
    Local,
    /// A fixed offset from UTC.
    Offset(FixedOffset),
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timezone::Utc => write!(f, "utc"),
            Timezone::Local => write!(f, "local"),
            Timezone::Offset(offset) => {
                let seconds = offset.local_minus_utc();
                let sign = if seconds < 0 { '-' } else { '+' };
                let minutes = seconds.abs() / 60;
                write!(f, "{sign}{:02}:{:02}", minutes / 60, minutes % 60)
            }
        }
    }
}

fn parse_offset(text: &str) -> Option<FixedOffset> {
    let (sign, rest) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl FromStr for Timezone {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        match text.to_ascii_lowercase().as_str() {
            "utc" | "z" | "+00:00" => Ok(Timezone::Utc),
            "local" => Ok(Timezone::Local),
            _ => parse_offset(text)
                .map(Timezone::Offset)
                .context(InvalidTimezoneSnafu { value: s }),
        }
    }
}

impl TryFrom<String> for Timezone {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timezone> for String {
    fn from(value: Timezone) -> Self {
        value.to_string()
    }
}

/// Calendar fields of one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeParts {
    /// 0-23
    pub hour: u32,
    /// 1-31
    pub day_of_month: u32,
    /// ISO 8601 week number, 1-53
    pub week_of_year: u32,
    /// 1-12
    pub month: u32,
    /// Calendar year of the date (not the ISO week-numbering year)
    pub year: i32,
    /// ISO weekday, 1 = Monday through 7 = Sunday
    pub weekday: u32,
}

fn parts_of<Tz: TimeZone>(instant: DateTime<Tz>) -> TimeParts {
    TimeParts {
        hour: instant.hour(),
        day_of_month: instant.day(),
        week_of_year: instant.iso_week().week(),
        month: instant.month(),
        year: instant.year(),
        weekday: instant.weekday().number_from_monday(),
    }
}

/// Split an epoch-millisecond timestamp into calendar fields.
///
/// Returns `None` when the value is outside the representable date range.
pub fn decompose(epoch_ms: i64, timezone: Timezone) -> Option<TimeParts> {
    let instant = DateTime::<Utc>::from_timestamp_millis(epoch_ms)?;
    Some(match timezone {
        Timezone::Utc => parts_of(instant),
        Timezone::Local => parts_of(instant.with_timezone(&Local)),
        Timezone::Offset(offset) => parts_of(instant.with_timezone(&offset)),
    })
}

/// Names of the columns added by [`with_time_columns`], in order.
pub const TIME_COLUMNS: [&str; 6] = [
    "hour",
    "day_of_month",
    "week_of_year",
    "month",
    "year",
    "weekday",
];

/// Append the calendar columns derived from the Int64 column `source`.
///
/// Rows whose timestamp is null or out of range get nulls in every derived
/// column. Existing columns with the same names are replaced.
pub fn with_time_columns(
    batch: &RecordBatch,
    source: &str,
    timezone: Timezone,
) -> Result<RecordBatch, TransformError> {
    let timestamps = typed_column(batch, source, &DataType::Int64)?.as_primitive::<Int64Type>();

    let mut builders: Vec<Int32Builder> = TIME_COLUMNS
        .iter()
        .map(|_| Int32Builder::with_capacity(batch.num_rows()))
        .collect();

    for value in timestamps.iter() {
        match value.and_then(|ms| decompose(ms, timezone)) {
            Some(parts) => {
                let values = [
                    parts.hour as i32,
                    parts.day_of_month as i32,
                    parts.week_of_year as i32,
                    parts.month as i32,
                    parts.year,
                    parts.weekday as i32,
                ];
                for (builder, value) in builders.iter_mut().zip(values) {
                    builder.append_value(value);
                }
            }
            None => builders.iter_mut().for_each(|b| b.append_null()),
        }
    }

    let schema = batch.schema();
    let mut fields: Vec<Field> = Vec::new();
    let mut arrays: Vec<ArrayRef> = Vec::new();
    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        if !TIME_COLUMNS.contains(&field.name().as_str()) {
            fields.push(field.as_ref().clone());
            arrays.push(Arc::clone(array));
        }
    }
    for (name, mut builder) in TIME_COLUMNS.iter().zip(builders) {
        let array = builder.finish();
        fields.push(Field::new(*name, DataType::Int32, true));
        arrays.push(Arc::new(array) as ArrayRef);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).context(ArrowSnafu)
}
