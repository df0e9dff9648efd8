//! NDJSON reader.
//!
//! Decodes one source file (optionally gzip-compressed) into an Arrow
//! RecordBatch using the registry schema for its record kind.

use arrow::array::RecordBatch;
use bytes::Bytes;
use snafu::prelude::*;
use std::borrow::Cow;
use std::io::Read;
use tracing::debug;

use crate::emit;
use crate::error::{
    BatchBuildSnafu, GzipDecompressionSnafu, MalformedRecordSnafu, ReaderError,
    SchemaViolationSnafu,
};
use crate::metrics::events::{BytesRead, FileRead, RecordsRead, SourceKind};
use crate::schema::{RecordBuilder, RecordKind};

/// Result of reading and parsing a file.
#[derive(Debug)]
pub struct ReadResult {
    pub batch: RecordBatch,
    /// Number of records decoded (blank lines excluded).
    pub total_records: usize,
}

/// Reader turning newline-delimited JSON objects into rows of one record kind.
#[derive(Debug, Clone, Copy)]
pub struct NdjsonReader {
    kind: RecordKind,
}

fn source_kind(kind: RecordKind) -> SourceKind {
    match kind {
        RecordKind::Track => SourceKind::Tracks,
        RecordKind::Event => SourceKind::Events,
    }
}

impl NdjsonReader {
    pub fn new(kind: RecordKind) -> Self {
        Self { kind }
    }

    /// Parse a whole file.
    ///
    /// Files whose name ends in `.gz` are decompressed first. Blank lines are
    /// skipped; any other line must be a JSON object whose declared fields
    /// coerce cleanly, otherwise the whole file is rejected.
    pub fn read(&self, data: Bytes, path: &str) -> Result<ReadResult, ReaderError> {
        emit!(BytesRead {
            bytes: data.len() as u64,
        });

        let content: Cow<'_, [u8]> = if path.ends_with(".gz") {
            let mut decoder = flate2::read::GzDecoder::new(&data[..]);
            let mut buf = Vec::new();
            decoder
                .read_to_end(&mut buf)
                .context(GzipDecompressionSnafu { path })?;
            debug!(
                "Decompressed {} -> {} bytes for {}",
                data.len(),
                buf.len(),
                path
            );
            Cow::Owned(buf)
        } else {
            Cow::Borrowed(&data[..])
        };

        let mut builder = RecordBuilder::new(self.kind);

        for (index, raw_line) in content.split(|&b| b == b'\n').enumerate() {
            let line = index + 1;
            let text = std::str::from_utf8(raw_line).map_err(|e| {
                MalformedRecordSnafu {
                    path,
                    line,
                    message: e.to_string(),
                }
                .build()
            })?;
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            let value: serde_json::Value = serde_json::from_str(text).map_err(|e| {
                MalformedRecordSnafu {
                    path,
                    line,
                    message: e.to_string(),
                }
                .build()
            })?;

            let serde_json::Value::Object(object) = value else {
                return MalformedRecordSnafu {
                    path,
                    line,
                    message: "expected a JSON object",
                }
                .fail();
            };

            builder
                .append(&object)
                .context(SchemaViolationSnafu { path, line })?;
        }

        let total_records = builder.len();
        let batch = builder.finish().context(BatchBuildSnafu { path })?;

        emit!(FileRead {
            kind: source_kind(self.kind),
        });
        emit!(RecordsRead {
            kind: source_kind(self.kind),
            count: total_records as u64,
        });
        debug!("Parsed {} {} records from {}", total_records, self.kind, path);

        Ok(ReadResult {
            batch,
            total_records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::Int64Type;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Bytes {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        Bytes::from(encoder.finish().unwrap())
    }

    #[test]
    fn test_read_plain_ndjson() {
        let data = Bytes::from_static(
            b"{\"userId\":\"7\",\"page\":\"NextSong\",\"ts\":1000000000000}\n\n{\"userId\":\"\",\"page\":\"Home\"}\n",
        );
        let result = NdjsonReader::new(RecordKind::Event)
            .read(data, "log_data/a.json")
            .unwrap();
        assert_eq!(result.total_records, 2);
        assert_eq!(result.batch.num_rows(), 2);

        let ts = result
            .batch
            .column_by_name("ts")
            .unwrap()
            .as_primitive::<Int64Type>();
        assert_eq!(ts.value(0), 1_000_000_000_000);
        assert!(ts.is_null(1));
    }

    #[test]
    fn test_read_gzip_ndjson() {
        let data = gzip(b"{\"song_id\":\"S1\",\"title\":\"Song A\",\"duration\":200.0}\n");
        let result = NdjsonReader::new(RecordKind::Track)
            .read(data, "song_data/A/A/A/x.json.gz")
            .unwrap();
        assert_eq!(result.total_records, 1);
        let title = result.batch.column_by_name("title").unwrap().as_string::<i32>();
        assert_eq!(title.value(0), "Song A");
    }

    #[test]
    fn test_empty_file_yields_empty_batch() {
        let result = NdjsonReader::new(RecordKind::Track)
            .read(Bytes::new(), "song_data/empty.json")
            .unwrap();
        assert_eq!(result.total_records, 0);
        assert_eq!(result.batch.num_rows(), 0);
        assert_eq!(result.batch.num_columns(), 10);
    }

    #[test]
    fn test_schema_violation_reports_line() {
        let data = Bytes::from_static(b"{\"userId\":1}\n{\"userId\":\"abc\"}\n");
        let err = NdjsonReader::new(RecordKind::Event)
            .read(data, "log_data/bad.json")
            .unwrap_err();
        match err {
            ReaderError::SchemaViolation { path, line, .. } => {
                assert_eq!(path, "log_data/bad.json");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_lines_rejected() {
        for data in [&b"{not json}"[..], &b"[1, 2, 3]"[..], &b"\"text\""[..]] {
            let err = NdjsonReader::new(RecordKind::Event)
                .read(Bytes::copy_from_slice(data), "log_data/bad.json")
                .unwrap_err();
            assert!(matches!(err, ReaderError::MalformedRecord { line: 1, .. }));
            assert!(err.is_schema_violation());
        }
    }

    #[test]
    fn test_corrupt_gzip() {
        let err = NdjsonReader::new(RecordKind::Event)
            .read(Bytes::from_static(b"not gzip"), "log_data/a.json.gz")
            .unwrap_err();
        assert!(matches!(err, ReaderError::GzipDecompression { .. }));
    }
}
