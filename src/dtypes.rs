//! Column type assignment for the full and compact profiles.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::candle::{Candle, CompactCandle, PrunedCandle, RawCandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    TimestampMs,
    Float64,
    Float32,
    Int64,
    UInt16,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TimestampMs => "datetime64[ms]",
            Self::Float64 => "float64",
            Self::Float32 => "float32",
            Self::Int64 => "int64",
            Self::UInt16 => "uint16",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DtypeProfile {
    Full,
    Compact,
}

const FULL_COLUMNS: [(&str, ColumnType); 12] = [
    ("open_time", ColumnType::TimestampMs),
    ("open", ColumnType::Float64),
    ("high", ColumnType::Float64),
    ("low", ColumnType::Float64),
    ("close", ColumnType::Float64),
    ("volume", ColumnType::Float64),
    ("close_time", ColumnType::TimestampMs),
    ("quote_asset_volume", ColumnType::Float64),
    ("number_of_trades", ColumnType::Int64),
    ("taker_buy_base_asset_volume", ColumnType::Float64),
    ("taker_buy_quote_asset_volume", ColumnType::Float64),
    ("ignore", ColumnType::Float64),
];

const COMPACT_COLUMNS: [(&str, ColumnType); 10] = [
    ("open_time", ColumnType::TimestampMs),
    ("open", ColumnType::Float32),
    ("high", ColumnType::Float32),
    ("low", ColumnType::Float32),
    ("close", ColumnType::Float32),
    ("volume", ColumnType::Float32),
    ("quote_asset_volume", ColumnType::Float32),
    ("number_of_trades", ColumnType::UInt16),
    ("taker_buy_base_asset_volume", ColumnType::Float32),
    ("taker_buy_quote_asset_volume", ColumnType::Float32),
];

impl DtypeProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Compact => "compact",
        }
    }

    pub fn columns(self) -> &'static [(&'static str, ColumnType)] {
        match self {
            Self::Full => &FULL_COLUMNS,
            Self::Compact => &COMPACT_COLUMNS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeCastError {
    #[error("row {row}: column {column} is empty and {target} has no missing value")]
    MissingValue {
        row: usize,
        column: &'static str,
        target: &'static str,
    },
    #[error("row {row}: value {value} in column {column} does not fit {target}")]
    OutOfRange {
        row: usize,
        column: &'static str,
        value: String,
        target: &'static str,
    },
    #[error("row {row}: {value} ms in column {column} is not a representable timestamp")]
    InvalidTimestamp {
        row: usize,
        column: &'static str,
        value: i64,
    },
}

pub fn normalize_full(rows: &[RawCandle]) -> Result<Vec<Candle>, TypeCastError> {
    let out = rows
        .iter()
        .enumerate()
        .map(|(row, raw)| -> Result<Candle, TypeCastError> {
            Ok(Candle {
                open_time: to_timestamp(row, "open_time", raw.open_time)?,
                open: to_f64(raw.open),
                high: to_f64(raw.high),
                low: to_f64(raw.low),
                close: to_f64(raw.close),
                volume: to_f64(raw.volume),
                close_time: to_timestamp(row, "close_time", raw.close_time)?,
                quote_asset_volume: to_f64(raw.quote_asset_volume),
                number_of_trades: raw.number_of_trades.ok_or(TypeCastError::MissingValue {
                    row,
                    column: "number_of_trades",
                    target: ColumnType::Int64.as_str(),
                })?,
                taker_buy_base_asset_volume: to_f64(raw.taker_buy_base_asset_volume),
                taker_buy_quote_asset_volume: to_f64(raw.taker_buy_quote_asset_volume),
                ignore: to_f64(raw.ignore),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        component = "dtypes",
        event = "dtypes.normalized",
        profile = DtypeProfile::Full.as_str(),
        rows = out.len()
    );
    Ok(out)
}

pub fn normalize_compact(rows: &[PrunedCandle]) -> Result<Vec<CompactCandle>, TypeCastError> {
    let out = rows
        .iter()
        .enumerate()
        .map(|(row, raw)| -> Result<CompactCandle, TypeCastError> {
            Ok(CompactCandle {
                open_time: to_timestamp(row, "open_time", raw.open_time)?,
                open: to_f32(row, "open", raw.open)?,
                high: to_f32(row, "high", raw.high)?,
                low: to_f32(row, "low", raw.low)?,
                close: to_f32(row, "close", raw.close)?,
                volume: to_f32(row, "volume", raw.volume)?,
                quote_asset_volume: to_f32(row, "quote_asset_volume", raw.quote_asset_volume)?,
                number_of_trades: to_u16(row, "number_of_trades", raw.number_of_trades)?,
                taker_buy_base_asset_volume: to_f32(
                    row,
                    "taker_buy_base_asset_volume",
                    raw.taker_buy_base_asset_volume,
                )?,
                taker_buy_quote_asset_volume: to_f32(
                    row,
                    "taker_buy_quote_asset_volume",
                    raw.taker_buy_quote_asset_volume,
                )?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        component = "dtypes",
        event = "dtypes.normalized",
        profile = DtypeProfile::Compact.as_str(),
        rows = out.len()
    );
    Ok(out)
}

pub(crate) fn timestamp_from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

fn to_timestamp(
    row: usize,
    column: &'static str,
    value: Option<i64>,
) -> Result<DateTime<Utc>, TypeCastError> {
    let ms = value.ok_or(TypeCastError::MissingValue {
        row,
        column,
        target: ColumnType::TimestampMs.as_str(),
    })?;
    timestamp_from_millis(ms).ok_or(TypeCastError::InvalidTimestamp {
        row,
        column,
        value: ms,
    })
}

fn to_f64(value: Option<f64>) -> f64 {
    value.unwrap_or(f64::NAN)
}

fn to_f32(row: usize, column: &'static str, value: Option<f64>) -> Result<f32, TypeCastError> {
    let Some(value) = value else {
        return Ok(f32::NAN);
    };

    let narrowed = value as f32;
    if value.is_finite() && !narrowed.is_finite() {
        return Err(TypeCastError::OutOfRange {
            row,
            column,
            value: value.to_string(),
            target: ColumnType::Float32.as_str(),
        });
    }
    Ok(narrowed)
}

fn to_u16(row: usize, column: &'static str, value: Option<i64>) -> Result<u16, TypeCastError> {
    let value = value.ok_or(TypeCastError::MissingValue {
        row,
        column,
        target: ColumnType::UInt16.as_str(),
    })?;
    u16::try_from(value).map_err(|_| TypeCastError::OutOfRange {
        row,
        column,
        value: value.to_string(),
        target: ColumnType::UInt16.as_str(),
    })
}
