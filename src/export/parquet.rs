//! Parquet encoding of candle snapshots

use super::SnapshotError;
use crate::candle::{Candle, Interval};
use arrow::array::{
    Array, ArrayRef, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

/// Rows per record batch
const BATCH_ROWS: usize = 65_536;

fn utc_micros() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
}

/// Snapshot schema; the metadata names the merge key columns
pub fn candle_schema() -> Schema {
    let metadata = HashMap::from([
        ("key_columns".to_string(), "symbol,interval,start".to_string()),
        ("writer".to_string(), format!("candle-cache {}", env!("CARGO_PKG_VERSION"))),
    ]);

    Schema::new(vec![
        Field::new("symbol", DataType::Utf8, false),
        Field::new("interval", DataType::Utf8, false),
        Field::new("start", utc_micros(), false),
        Field::new("end", utc_micros(), true),
        Field::new("open", DataType::Float64, true),
        Field::new("high", DataType::Float64, true),
        Field::new("low", DataType::Float64, true),
        Field::new("close", DataType::Float64, true),
        Field::new("volume", DataType::Int64, true),
        Field::new("vwap", DataType::Float64, true),
    ])
    .with_metadata(metadata)
}

fn to_batch(schema: &Arc<Schema>, candles: &[Candle]) -> Result<RecordBatch, SnapshotError> {
    let symbols: Vec<&str> = candles.iter().map(|c| c.symbol.as_str()).collect();
    let intervals: Vec<&str> = candles.iter().map(|c| c.interval.as_str()).collect();
    let starts: Vec<i64> = candles.iter().map(|c| c.start.timestamp_micros()).collect();
    let ends: Vec<Option<i64>> = candles
        .iter()
        .map(|c| c.end.map(|e| e.timestamp_micros()))
        .collect();
    let prices = |f: fn(&Candle) -> Option<f64>| -> ArrayRef {
        Arc::new(Float64Array::from(candles.iter().map(f).collect::<Vec<_>>()))
    };

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(symbols)),
        Arc::new(StringArray::from(intervals)),
        Arc::new(TimestampMicrosecondArray::from(starts).with_timezone("UTC")),
        Arc::new(TimestampMicrosecondArray::from(ends).with_timezone("UTC")),
        prices(|c| c.open),
        prices(|c| c.high),
        prices(|c| c.low),
        prices(|c| c.close),
        Arc::new(Int64Array::from(
            candles.iter().map(|c| c.volume).collect::<Vec<_>>(),
        )),
        prices(|c| c.vwap),
    ];

    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

/// Write `candles` to `path`, replacing any existing file.
///
/// Data goes to a `.tmp` sibling first and is renamed into place once the
/// footer is written.
pub fn write_candles(path: &Path, candles: &[Candle]) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("parquet.tmp");

    let result = write_file(&tmp, candles);
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    fs::rename(&tmp, path)?;
    tracing::debug!(path = ?path, count = candles.len(), "Wrote candles to Parquet");
    Ok(())
}

fn write_file(path: &Path, candles: &[Candle]) -> Result<(), SnapshotError> {
    let schema = Arc::new(candle_schema());
    let file = File::create(path)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;
    for chunk in candles.chunks(BATCH_ROWS) {
        writer.write(&to_batch(&schema, chunk)?)?;
    }
    writer.close()?;
    Ok(())
}

fn column<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a T, SnapshotError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| SnapshotError::Malformed {
            path: path.to_path_buf(),
            reason: format!("missing or mistyped column {:?}", name),
        })
}

fn opt_f64(array: &Float64Array, row: usize) -> Option<f64> {
    array.is_valid(row).then(|| array.value(row))
}

/// Read every candle from a snapshot file
pub fn read_candles(path: &Path) -> Result<Vec<Candle>, SnapshotError> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let malformed = |reason: String| SnapshotError::Malformed {
        path: path.to_path_buf(),
        reason,
    };

    let mut candles = Vec::new();
    for batch in reader {
        let batch = batch?;

        let symbols = column::<StringArray>(&batch, "symbol", path)?;
        let intervals = column::<StringArray>(&batch, "interval", path)?;
        let starts = column::<TimestampMicrosecondArray>(&batch, "start", path)?;
        let ends = column::<TimestampMicrosecondArray>(&batch, "end", path)?;
        let opens = column::<Float64Array>(&batch, "open", path)?;
        let highs = column::<Float64Array>(&batch, "high", path)?;
        let lows = column::<Float64Array>(&batch, "low", path)?;
        let closes = column::<Float64Array>(&batch, "close", path)?;
        let volumes = column::<Int64Array>(&batch, "volume", path)?;
        let vwaps = column::<Float64Array>(&batch, "vwap", path)?;

        for i in 0..batch.num_rows() {
            let interval: Interval = intervals
                .value(i)
                .parse()
                .map_err(|e| malformed(format!("row {}: {}", i, e)))?;
            let start = DateTime::from_timestamp_micros(starts.value(i))
                .ok_or_else(|| malformed(format!("row {}: start out of range", i)))?
                .fixed_offset();
            let end = if ends.is_valid(i) {
                let end = DateTime::from_timestamp_micros(ends.value(i))
                    .ok_or_else(|| malformed(format!("row {}: end out of range", i)))?;
                Some(end.fixed_offset())
            } else {
                None
            };

            candles.push(Candle {
                symbol: symbols.value(i).to_string(),
                interval,
                start,
                end,
                open: opt_f64(opens, i),
                high: opt_f64(highs, i),
                low: opt_f64(lows, i),
                close: opt_f64(closes, i),
                volume: volumes.is_valid(i).then(|| volumes.value(i)),
                vwap: opt_f64(vwaps, i),
            });
        }
    }

    Ok(candles)
}
