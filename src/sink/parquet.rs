//! Parquet encoding.
//!
//! Tables are small enough per partition file to be encoded in memory and
//! uploaded with a single put.

use arrow::array::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use snafu::prelude::*;
use std::time::Instant;

use crate::config::ParquetCompression;
use crate::emit;
use crate::error::{ParquetSnafu, PartitionArrowSnafu, WriterError};
use crate::metrics::events::ParquetEncodeCompleted;

/// Writer properties for the configured codec.
pub fn writer_properties(compression: ParquetCompression) -> WriterProperties {
    WriterProperties::builder()
        .set_compression(match compression {
            ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            ParquetCompression::Lz4 => Compression::LZ4,
        })
        .build()
}

/// Encode `batch` as a complete Parquet file.
pub fn encode(
    batch: &RecordBatch,
    compression: ParquetCompression,
) -> Result<Bytes, WriterError> {
    let start = Instant::now();
    let mut writer = ArrowWriter::try_new(
        Vec::new(),
        batch.schema(),
        Some(writer_properties(compression)),
    )
    .context(ParquetSnafu)?;
    writer.write(batch).context(ParquetSnafu)?;
    let buffer = writer.into_inner().context(ParquetSnafu)?;

    emit!(ParquetEncodeCompleted {
        duration: start.elapsed()
    });
    Ok(Bytes::from(buffer))
}

/// Decode a Parquet file into a single batch.
pub fn decode(data: Bytes) -> Result<RecordBatch, WriterError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(data).context(ParquetSnafu)?;
    let schema = builder.schema().clone();
    let reader = builder.build().context(ParquetSnafu)?;

    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .context(PartitionArrowSnafu)?;
    arrow::compute::concat_batches(&schema, &batches).context(PartitionArrowSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn users(rows: usize) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("user_id", DataType::Int64, true),
            Field::new("first_name", DataType::Utf8, true),
            Field::new("score", DataType::Float64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from_iter_values(0..rows as i64)),
                Arc::new(StringArray::from_iter_values(
                    (0..rows).map(|i| format!("user_{i}")),
                )),
                Arc::new(Float64Array::from_iter(
                    (0..rows).map(|i| (i % 3 != 0).then_some(i as f64)),
                )),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_every_codec_reads_back() {
        let batch = users(50);
        for codec in [
            ParquetCompression::Uncompressed,
            ParquetCompression::Snappy,
            ParquetCompression::Gzip,
            ParquetCompression::Zstd,
            ParquetCompression::Lz4,
        ] {
            let data = encode(&batch, codec).unwrap();
            assert_eq!(&data[..4], b"PAR1");
            let decoded = decode(data).unwrap();
            assert_eq!(decoded.columns(), batch.columns(), "{codec:?}");
        }
    }

    #[test]
    fn test_empty_batch_keeps_schema() {
        let batch = users(0);
        let decoded = decode(encode(&batch, ParquetCompression::Snappy).unwrap()).unwrap();
        assert_eq!(decoded.num_rows(), 0);
        assert_eq!(decoded.schema().fields(), batch.schema().fields());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode(Bytes::from_static(b"definitely not parquet")).unwrap_err();
        assert!(matches!(err, WriterError::Parquet { .. }));
    }
}
