//! Minute candlestick row types.
//!
//! A record moves through four shapes: [`RawCandle`] as read from CSV,
//! [`PrunedCandle`] once `close_time`/`ignore` are gone, and the two typed
//! profiles [`Candle`] (full fidelity) and [`CompactCandle`] (storage).
//! Every shape keeps `open_time` as a plain field; it is also the ordering key.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

pub const MINUTE_MS: i64 = 60_000;
/// `close_time - open_time` of a complete one-minute candle.
pub const FULL_MINUTE_SPAN_MS: i64 = 59_999;

pub const RAW_COLUMNS: [&str; 12] = [
    "open_time",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "close_time",
    "quote_asset_volume",
    "number_of_trades",
    "taker_buy_base_asset_volume",
    "taker_buy_quote_asset_volume",
    "ignore",
];

pub fn one_minute() -> ChronoDuration {
    ChronoDuration::milliseconds(MINUTE_MS)
}

pub trait CandleRow {
    fn open_time_ms(&self) -> Option<i64>;

    fn is_blank(&self) -> bool;
}

pub trait MinuteBar: Clone {
    fn open_time(&self) -> DateTime<Utc>;

    fn shift_to(&mut self, open_time: DateTime<Utc>);

    fn flatten_to_close(&mut self);
}

/// One row exactly as exported; empty cells are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandle {
    #[serde(default, deserialize_with = "integral_cell")]
    pub open_time: Option<i64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    #[serde(default, deserialize_with = "integral_cell")]
    pub close_time: Option<i64>,
    pub quote_asset_volume: Option<f64>,
    #[serde(default, deserialize_with = "integral_cell")]
    pub number_of_trades: Option<i64>,
    pub taker_buy_base_asset_volume: Option<f64>,
    pub taker_buy_quote_asset_volume: Option<f64>,
    pub ignore: Option<f64>,
}

impl RawCandle {
    pub fn is_full_minute(&self) -> bool {
        match (self.open_time, self.close_time) {
            (Some(open), Some(close)) => open.checked_sub(close) == Some(-FULL_MINUTE_SPAN_MS),
            _ => false,
        }
    }

    pub fn prune(self) -> PrunedCandle {
        PrunedCandle {
            open_time: self.open_time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            quote_asset_volume: self.quote_asset_volume,
            number_of_trades: self.number_of_trades,
            taker_buy_base_asset_volume: self.taker_buy_base_asset_volume,
            taker_buy_quote_asset_volume: self.taker_buy_quote_asset_volume,
        }
    }
}

impl CandleRow for RawCandle {
    fn open_time_ms(&self) -> Option<i64> {
        self.open_time
    }

    fn is_blank(&self) -> bool {
        self.open_time.is_none()
            && self.open.is_none()
            && self.high.is_none()
            && self.low.is_none()
            && self.close.is_none()
            && self.volume.is_none()
            && self.close_time.is_none()
            && self.quote_asset_volume.is_none()
            && self.number_of_trades.is_none()
            && self.taker_buy_base_asset_volume.is_none()
            && self.taker_buy_quote_asset_volume.is_none()
            && self.ignore.is_none()
    }
}

// Integer cells may be written as `1327.0` once a column held an empty cell.
fn integral_cell<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let Some(cell) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(None);
    }
    if let Ok(value) = cell.parse::<i64>() {
        return Ok(Some(value));
    }

    let value: f64 = cell.parse().map_err(serde::de::Error::custom)?;
    if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 {
        Ok(Some(value as i64))
    } else {
        Err(serde::de::Error::custom(format!(
            "expected an integer, found {cell}"
        )))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrunedCandle {
    pub open_time: Option<i64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub quote_asset_volume: Option<f64>,
    pub number_of_trades: Option<i64>,
    pub taker_buy_base_asset_volume: Option<f64>,
    pub taker_buy_quote_asset_volume: Option<f64>,
}

impl CandleRow for PrunedCandle {
    fn open_time_ms(&self) -> Option<i64> {
        self.open_time
    }

    fn is_blank(&self) -> bool {
        self.open_time.is_none()
            && self.open.is_none()
            && self.high.is_none()
            && self.low.is_none()
            && self.close.is_none()
            && self.volume.is_none()
            && self.quote_asset_volume.is_none()
            && self.number_of_trades.is_none()
            && self.taker_buy_base_asset_volume.is_none()
            && self.taker_buy_quote_asset_volume.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: DateTime<Utc>,
    pub quote_asset_volume: f64,
    pub number_of_trades: i64,
    pub taker_buy_base_asset_volume: f64,
    pub taker_buy_quote_asset_volume: f64,
    pub ignore: f64,
}

impl CandleRow for Candle {
    fn open_time_ms(&self) -> Option<i64> {
        Some(self.open_time.timestamp_millis())
    }

    fn is_blank(&self) -> bool {
        false
    }
}

impl MinuteBar for Candle {
    fn open_time(&self) -> DateTime<Utc> {
        self.open_time
    }

    fn shift_to(&mut self, open_time: DateTime<Utc>) {
        self.open_time = open_time;
        self.close_time = open_time + ChronoDuration::milliseconds(FULL_MINUTE_SPAN_MS);
    }

    fn flatten_to_close(&mut self) {
        self.volume = 0.0;
        self.quote_asset_volume = 0.0;
        self.number_of_trades = 0;
        self.taker_buy_base_asset_volume = 0.0;
        self.taker_buy_quote_asset_volume = 0.0;
        self.low = self.close;
        self.high = self.close;
        self.open = self.close;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactCandle {
    pub open_time: DateTime<Utc>,
    pub open: f32,
    pub high: f32,
    pub low: f32,
    pub close: f32,
    pub volume: f32,
    pub quote_asset_volume: f32,
    pub number_of_trades: u16,
    pub taker_buy_base_asset_volume: f32,
    pub taker_buy_quote_asset_volume: f32,
}

impl CandleRow for CompactCandle {
    fn open_time_ms(&self) -> Option<i64> {
        Some(self.open_time.timestamp_millis())
    }

    fn is_blank(&self) -> bool {
        false
    }
}

impl MinuteBar for CompactCandle {
    fn open_time(&self) -> DateTime<Utc> {
        self.open_time
    }

    fn shift_to(&mut self, open_time: DateTime<Utc>) {
        self.open_time = open_time;
    }

    fn flatten_to_close(&mut self) {
        self.volume = 0.0;
        self.quote_asset_volume = 0.0;
        self.number_of_trades = 0;
        self.taker_buy_base_asset_volume = 0.0;
        self.taker_buy_quote_asset_volume = 0.0;
        self.low = self.close;
        self.high = self.close;
        self.open = self.close;
    }
}
