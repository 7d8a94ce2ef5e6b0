/// Parquet encoding of canonical ticks (one row per tick, nullable quote columns)
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::error::{PipelineError, Result};
use crate::time::DISPLAY_TZ;
use crate::types::CanonicalTick;

pub const TIMESTAMP_TZ: &str = "America/New_York";

pub fn tick_schema() -> Schema {
    Schema::new(vec![
        Field::new("symbol", DataType::Utf8, false),
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Microsecond, Some(TIMESTAMP_TZ.into())),
            false,
        ),
        Field::new("price", DataType::Float64, false),
        Field::new("volume", DataType::Float64, true),
        Field::new("open", DataType::Float64, true),
        Field::new("day_high", DataType::Float64, true),
        Field::new("day_low", DataType::Float64, true),
        Field::new("previous_close", DataType::Float64, true),
        Field::new("exchange", DataType::Utf8, true),
        Field::new("currency", DataType::Utf8, true),
        Field::new("short_name", DataType::Utf8, true),
        Field::new("source", DataType::Utf8, false),
    ])
}

fn f64_column(ticks: &[CanonicalTick], get: impl Fn(&CanonicalTick) -> Option<f64>) -> ArrayRef {
    Arc::new(Float64Array::from(ticks.iter().map(get).collect::<Vec<_>>())) as ArrayRef
}

fn utf8_column(ticks: &[CanonicalTick], get: impl Fn(&CanonicalTick) -> Option<&str>) -> ArrayRef {
    Arc::new(StringArray::from(ticks.iter().map(get).collect::<Vec<_>>())) as ArrayRef
}

pub fn tick_batch(ticks: &[CanonicalTick]) -> Result<RecordBatch> {
    let schema: SchemaRef = Arc::new(tick_schema());

    let timestamps = Arc::new(
        TimestampMicrosecondArray::from(
            ticks
                .iter()
                .map(|t| t.timestamp.timestamp_micros())
                .collect::<Vec<_>>(),
        )
        .with_timezone(TIMESTAMP_TZ),
    ) as ArrayRef;

    let arrays = vec![
        utf8_column(ticks, |t| Some(t.symbol.as_str())),
        timestamps,
        f64_column(ticks, |t| Some(t.price)),
        f64_column(ticks, |t| t.volume),
        f64_column(ticks, |t| t.open),
        f64_column(ticks, |t| t.day_high),
        f64_column(ticks, |t| t.day_low),
        f64_column(ticks, |t| t.previous_close),
        utf8_column(ticks, |t| t.exchange.as_deref()),
        utf8_column(ticks, |t| t.currency.as_deref()),
        utf8_column(ticks, |t| t.short_name.as_deref()),
        utf8_column(ticks, |t| Some(t.source.as_str())),
    ];

    Ok(RecordBatch::try_new(schema, arrays)?)
}

/// Serialize ticks into one Snappy-compressed Parquet payload
pub fn encode_ticks(ticks: &[CanonicalTick]) -> Result<Bytes> {
    let batch = tick_batch(ticks)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(Bytes::from(buffer))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| PipelineError::InvalidColumnType(name.to_string()))
}

// Optional columns may be absent in older files
fn optional_column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<Option<&'a T>> {
    match batch.column_by_name(name) {
        None => Ok(None),
        Some(col) => col
            .as_any()
            .downcast_ref::<T>()
            .map(Some)
            .ok_or_else(|| PipelineError::InvalidColumnType(name.to_string())),
    }
}

fn f64_at(arr: Option<&Float64Array>, row: usize) -> Option<f64> {
    arr.filter(|a| a.is_valid(row)).map(|a| a.value(row))
}

fn str_at(arr: Option<&StringArray>, row: usize) -> Option<String> {
    arr.filter(|a| a.is_valid(row)).map(|a| a.value(row).to_string())
}

/// Decode a Parquet payload written by `encode_ticks`
pub fn decode_ticks(payload: Bytes) -> Result<Vec<CanonicalTick>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(payload)?.build()?;
    let mut ticks = Vec::new();

    for batch in reader {
        let batch = batch?;

        let symbols = column::<StringArray>(&batch, "symbol")?;
        let timestamps = column::<TimestampMicrosecondArray>(&batch, "timestamp")?;
        let prices = column::<Float64Array>(&batch, "price")?;

        let volume = optional_column::<Float64Array>(&batch, "volume")?;
        let open = optional_column::<Float64Array>(&batch, "open")?;
        let day_high = optional_column::<Float64Array>(&batch, "day_high")?;
        let day_low = optional_column::<Float64Array>(&batch, "day_low")?;
        let previous_close = optional_column::<Float64Array>(&batch, "previous_close")?;
        let exchange = optional_column::<StringArray>(&batch, "exchange")?;
        let currency = optional_column::<StringArray>(&batch, "currency")?;
        let short_name = optional_column::<StringArray>(&batch, "short_name")?;
        let source = optional_column::<StringArray>(&batch, "source")?;

        ticks.reserve(batch.num_rows());
        for row in 0..batch.num_rows() {
            if symbols.is_null(row) || timestamps.is_null(row) || prices.is_null(row) {
                continue;
            }

            let timestamp = DateTime::<Utc>::from_timestamp_micros(timestamps.value(row))
                .ok_or_else(|| PipelineError::InvalidColumnType("timestamp".to_string()))?
                .with_timezone(&DISPLAY_TZ);

            ticks.push(CanonicalTick {
                symbol: symbols.value(row).to_string(),
                timestamp,
                price: prices.value(row),
                volume: f64_at(volume, row),
                open: f64_at(open, row),
                day_high: f64_at(day_high, row),
                day_low: f64_at(day_low, row),
                previous_close: f64_at(previous_close, row),
                exchange: str_at(exchange, row),
                currency: str_at(currency, row),
                short_name: str_at(short_name, row),
                source: str_at(source, row).unwrap_or_default(),
            });
        }
    }

    Ok(ticks)
}
