//! File source: raw CSV exports in, CSV or parquet out.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float32Array, TimestampMillisecondArray, UInt16Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use thiserror::Error;
use tracing::{debug, info};

use crate::candle::{CompactCandle, RawCandle, RAW_COLUMNS};
use crate::dtypes::{timestamp_from_millis, ColumnType, DtypeProfile};

pub const DATETIME_COLUMN: &str = "datetime";

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("invalid output path: {0}")]
    InvalidPath(PathBuf),
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("column {0} is missing")]
    MissingColumn(&'static str),
    #[error("column {column} has type {found}, expected {expected}")]
    UnexpectedColumnType {
        column: &'static str,
        found: String,
        expected: &'static str,
    },
    #[error("{0} ms is not a representable timestamp")]
    InvalidTimestamp(i64),
}

pub fn list_matching_files(dir: &Path, extension: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let matches = path
            .extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if matches {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

pub fn read_raw_csv(path: &Path) -> Result<Vec<RawCandle>, ReadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let rows = reader
        .deserialize::<RawCandle>()
        .collect::<Result<Vec<_>, csv::Error>>()?;

    debug!(
        component = "storage",
        event = "storage.csv.read",
        path = %path.display(),
        rows = rows.len()
    );
    Ok(rows)
}

pub fn write_raw_csv(path: &Path, rows: &[RawCandle]) -> Result<(), WriteError> {
    write_atomic(path, |file| {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(RAW_COLUMNS)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    })?;

    info!(
        component = "storage",
        event = "storage.csv.written",
        path = %path.display(),
        rows = rows.len()
    );
    Ok(())
}

pub fn compact_schema() -> SchemaRef {
    let mut fields: Vec<Field> = DtypeProfile::Compact
        .columns()
        .iter()
        .filter(|(name, _)| *name != "open_time")
        .map(|(name, ty)| Field::new(*name, arrow_type(*ty), false))
        .collect();
    fields.push(Field::new(
        DATETIME_COLUMN,
        arrow_type(ColumnType::TimestampMs),
        false,
    ));
    Arc::new(Schema::new(fields))
}

fn arrow_type(ty: ColumnType) -> DataType {
    match ty {
        ColumnType::TimestampMs => DataType::Timestamp(TimeUnit::Millisecond, None),
        ColumnType::Float64 => DataType::Float64,
        ColumnType::Float32 => DataType::Float32,
        ColumnType::Int64 => DataType::Int64,
        ColumnType::UInt16 => DataType::UInt16,
    }
}

/// The file appears at `path` only once fully written.
pub fn write_compact_parquet(path: &Path, rows: &[CompactCandle]) -> Result<(), WriteError> {
    let batch = compact_record_batch(rows)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    write_atomic(path, |file| {
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    })?;

    info!(
        component = "storage",
        event = "storage.parquet.written",
        path = %path.display(),
        rows = rows.len()
    );
    Ok(())
}

fn compact_record_batch(rows: &[CompactCandle]) -> Result<RecordBatch, WriteError> {
    fn column<T>(rows: &[CompactCandle], f: impl Fn(&CompactCandle) -> T) -> Vec<T> {
        rows.iter().map(f).collect()
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Float32Array::from(column(rows, |r| r.open))),
        Arc::new(Float32Array::from(column(rows, |r| r.high))),
        Arc::new(Float32Array::from(column(rows, |r| r.low))),
        Arc::new(Float32Array::from(column(rows, |r| r.close))),
        Arc::new(Float32Array::from(column(rows, |r| r.volume))),
        Arc::new(Float32Array::from(column(rows, |r| r.quote_asset_volume))),
        Arc::new(UInt16Array::from(column(rows, |r| r.number_of_trades))),
        Arc::new(Float32Array::from(column(rows, |r| {
            r.taker_buy_base_asset_volume
        }))),
        Arc::new(Float32Array::from(column(rows, |r| {
            r.taker_buy_quote_asset_volume
        }))),
        Arc::new(TimestampMillisecondArray::from(column(rows, |r| {
            r.open_time.timestamp_millis()
        }))),
    ];

    Ok(RecordBatch::try_new(compact_schema(), columns)?)
}

pub fn read_compact_parquet(path: &Path) -> Result<Vec<CompactCandle>, ReadError> {
    let file = fs::File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch?;
        let open = f32_column(&batch, "open")?;
        let high = f32_column(&batch, "high")?;
        let low = f32_column(&batch, "low")?;
        let close = f32_column(&batch, "close")?;
        let volume = f32_column(&batch, "volume")?;
        let quote_asset_volume = f32_column(&batch, "quote_asset_volume")?;
        let number_of_trades = typed_column::<UInt16Array>(&batch, "number_of_trades", "uint16")?;
        let taker_base = f32_column(&batch, "taker_buy_base_asset_volume")?;
        let taker_quote = f32_column(&batch, "taker_buy_quote_asset_volume")?;
        let datetime =
            typed_column::<TimestampMillisecondArray>(&batch, DATETIME_COLUMN, "timestamp[ms]")?;

        for idx in 0..batch.num_rows() {
            let ms = datetime.value(idx);
            rows.push(CompactCandle {
                open_time: timestamp_from_millis(ms).ok_or(ReadError::InvalidTimestamp(ms))?,
                open: open.value(idx),
                high: high.value(idx),
                low: low.value(idx),
                close: close.value(idx),
                volume: volume.value(idx),
                quote_asset_volume: quote_asset_volume.value(idx),
                number_of_trades: number_of_trades.value(idx),
                taker_buy_base_asset_volume: taker_base.value(idx),
                taker_buy_quote_asset_volume: taker_quote.value(idx),
            });
        }
    }

    Ok(rows)
}

fn f32_column<'a>(
    batch: &'a RecordBatch,
    name: &'static str,
) -> Result<&'a Float32Array, ReadError> {
    typed_column::<Float32Array>(batch, name, "float32")
}

fn typed_column<'a, A: Array + 'static>(
    batch: &'a RecordBatch,
    name: &'static str,
    expected: &'static str,
) -> Result<&'a A, ReadError> {
    let column = batch
        .column_by_name(name)
        .ok_or(ReadError::MissingColumn(name))?;
    column
        .as_any()
        .downcast_ref::<A>()
        .ok_or_else(|| ReadError::UnexpectedColumnType {
            column: name,
            found: column.data_type().to_string(),
            expected,
        })
}

/// Write through `<name>.tmp` and rename over `path`; the temp file never
/// outlives a failed write or rename.
fn write_atomic(
    path: &Path,
    fill: impl FnOnce(&mut fs::File) -> Result<(), WriteError>,
) -> Result<(), WriteError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| WriteError::InvalidPath(path.to_path_buf()))?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    if let Err(err) = write_tmp(&tmp_path, fill) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}

fn write_tmp(
    tmp_path: &Path,
    fill: impl FnOnce(&mut fs::File) -> Result<(), WriteError>,
) -> Result<(), WriteError> {
    let mut file = fs::File::create(tmp_path)?;
    fill(&mut file)?;
    file.flush()?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    const HEADER: &str = "open_time,open,high,low,close,volume,close_time,quote_asset_volume,number_of_trades,taker_buy_base_asset_volume,taker_buy_quote_asset_volume,ignore\n";

    fn compact(minute: i64, close: f32) -> CompactCandle {
        CompactCandle {
            open_time: Utc.timestamp_millis_opt(minute * 60_000).unwrap(),
            open: close,
            high: close + 0.25,
            low: close - 0.25,
            close,
            volume: 1.5,
            quote_asset_volume: 1.5 * close,
            number_of_trades: 65_535,
            taker_buy_base_asset_volume: 0.5,
            taker_buy_quote_asset_volume: 0.5 * close,
        }
    }

    #[test]
    fn csv_reader_maps_headers_and_empty_cells() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("BTCUSDT.csv");
        fs::write(
            &path,
            format!(
                "{HEADER}0,1.5,2,1,1.75,10,59999,17.5,4,5,8.75,0\n,,,,,,,,,,,\n"
            ),
        )
        .unwrap();

        let rows = read_raw_csv(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].open_time, Some(0));
        assert_eq!(rows[0].close, Some(1.75));
        assert_eq!(rows[0].number_of_trades, Some(4));
        assert_eq!(rows[1], RawCandle::default());
    }

    #[test]
    fn csv_reader_ignores_unnamed_index_column() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("ETHUSDT.csv");
        fs::write(
            &path,
            format!(",{HEADER}0,0,1.5,2,1,1.75,10,59999,17.5,4,5,8.75,0\n"),
        )
        .unwrap();

        let rows = read_raw_csv(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].close_time, Some(59_999));
    }

    #[test]
    fn csv_reader_rejects_unparsable_numbers() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("bad.csv");
        fs::write(&path, format!("{HEADER}zero,1,1,1,1,1,59999,1,1,1,1,0\n")).unwrap();

        assert!(matches!(read_raw_csv(&path), Err(ReadError::Csv(_))));
    }

    #[test]
    fn csv_writer_round_trips_without_temp_leftovers() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("SOLUSDT.csv");
        let rows = vec![
            RawCandle {
                open_time: Some(60_000),
                close: Some(99.5),
                close_time: Some(119_999),
                number_of_trades: Some(3),
                ..RawCandle::default()
            },
            RawCandle {
                open_time: Some(120_000),
                ignore: Some(0.0),
                ..RawCandle::default()
            },
        ];

        write_raw_csv(&path, &rows).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(HEADER));
        assert_eq!(read_raw_csv(&path).unwrap(), rows);
        assert!(!temp.path().join("SOLUSDT.csv.tmp").exists());
    }

    #[test]
    fn failed_rename_removes_temp_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("XRPUSDT.parquet");
        fs::create_dir(&path).unwrap();

        let err = write_compact_parquet(&path, &[compact(0, 0.5)]).unwrap_err();
        assert!(matches!(err, WriteError::Io(_)));
        assert!(path.is_dir());
        assert!(!temp.path().join("XRPUSDT.parquet.tmp").exists());
    }

    #[test]
    fn parquet_schema_puts_datetime_last() {
        let schema = compact_schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            names,
            vec![
                "open",
                "high",
                "low",
                "close",
                "volume",
                "quote_asset_volume",
                "number_of_trades",
                "taker_buy_base_asset_volume",
                "taker_buy_quote_asset_volume",
                "datetime",
            ]
        );
        assert_eq!(
            schema.field_with_name("number_of_trades").unwrap().data_type(),
            &DataType::UInt16
        );
    }

    #[test]
    fn parquet_round_trip_is_exact_for_compact_rows() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("XRPUSDT.parquet");
        let rows = vec![compact(0, 0.5123), compact(1, 0.5125), compact(2, 0.5121)];

        write_compact_parquet(&path, &rows).unwrap();
        assert_eq!(read_compact_parquet(&path).unwrap(), rows);
        assert!(!temp.path().join("XRPUSDT.parquet.tmp").exists());
    }

    #[test]
    fn failed_write_leaves_nothing_behind() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("missing-dir").join("out.parquet");

        let err = write_compact_parquet(&path, &[compact(0, 1.0)]).unwrap_err();
        assert!(matches!(err, WriteError::Io(_)));
        assert!(!path.exists());
    }

    #[test]
    fn listing_filters_by_extension_without_recursing() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("b.csv"), "").unwrap();
        fs::write(temp.path().join("a.CSV"), "").unwrap();
        fs::write(temp.path().join("notes.txt"), "").unwrap();
        fs::create_dir(temp.path().join("nested.csv")).unwrap();

        let files = list_matching_files(temp.path(), "csv").unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.CSV", "b.csv"]);
    }
}
