//! Raw export to gap-filled compact rows.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::candle::{CompactCandle, RawCandle};
use crate::dtypes::{normalize_compact, TypeCastError};
use crate::gap_fill::fill_missing_minutes;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub input_rows: u64,
    pub malformed_rows_dropped: u64,
    pub filled_minutes: u64,
    pub gap_count: u64,
    pub output_rows: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub rows: Vec<CompactCandle>,
    pub report: ConversionReport,
}

/// Rows are expected oldest first. Partial candles (typically the first or
/// last row of an export) are removed without being reported as errors.
pub fn convert_raw(rows: Vec<RawCandle>) -> Result<Conversion, TypeCastError> {
    let input_rows = rows.len() as u64;

    let pruned: Vec<_> = rows
        .into_iter()
        .filter(RawCandle::is_full_minute)
        .map(RawCandle::prune)
        .collect();
    let malformed_rows_dropped = input_rows - pruned.len() as u64;

    let compact = normalize_compact(&pruned)?;
    let filled = fill_missing_minutes(compact);

    let report = ConversionReport {
        input_rows,
        malformed_rows_dropped,
        filled_minutes: filled.report.filled_minutes,
        gap_count: filled.report.gap_count,
        output_rows: filled.rows.len() as u64,
    };
    info!(
        component = "pipeline",
        event = "convert.finish",
        input_rows = report.input_rows,
        malformed_rows_dropped = report.malformed_rows_dropped,
        gap_count = report.gap_count,
        filled_minutes = report.filled_minutes,
        output_rows = report.output_rows
    );

    Ok(Conversion {
        rows: filled.rows,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open_time: i64, close_time: i64, close: f64) -> RawCandle {
        RawCandle {
            open_time: Some(open_time),
            open: Some(close - 0.5),
            high: Some(close + 1.0),
            low: Some(close - 1.0),
            close: Some(close),
            volume: Some(3.0),
            close_time: Some(close_time),
            quote_asset_volume: Some(3.0 * close),
            number_of_trades: Some(12),
            taker_buy_base_asset_volume: Some(1.0),
            taker_buy_quote_asset_volume: Some(close),
            ignore: Some(0.0),
        }
    }

    #[test]
    fn fills_three_minute_hole_between_full_candles() {
        let rows = vec![
            candle(0, 59_999, 100.0),
            candle(60_000, 119_999, 101.0),
            candle(240_000, 299_999, 104.0),
        ];

        let converted = convert_raw(rows).unwrap();
        let times: Vec<i64> = converted
            .rows
            .iter()
            .map(|row| row.open_time.timestamp_millis())
            .collect();

        assert_eq!(times, vec![0, 60_000, 120_000, 180_000, 240_000]);
        assert_eq!(converted.rows[2].close, 101.0);
        assert_eq!(converted.rows[3].open, 101.0);
        assert_eq!(converted.rows[3].number_of_trades, 0);
        assert_eq!(converted.rows[4].close, 104.0);
        assert_eq!(converted.report.filled_minutes, 2);
        assert_eq!(converted.report.output_rows, 5);
    }

    #[test]
    fn partial_candle_is_dropped_and_never_a_filler_basis() {
        let rows = vec![
            candle(0, 59_999, 100.0),
            candle(60_000, 110_000, 555.0),
            candle(180_000, 239_999, 103.0),
        ];

        let converted = convert_raw(rows).unwrap();
        assert_eq!(converted.report.malformed_rows_dropped, 1);
        assert_eq!(converted.rows.len(), 4);
        assert!(converted.rows.iter().all(|row| row.close != 555.0));
        assert_eq!(converted.rows[1].close, 100.0);
        assert_eq!(converted.rows[2].close, 100.0);
    }

    #[test]
    fn rows_missing_either_timestamp_are_dropped() {
        let mut no_close_time = candle(60_000, 119_999, 1.0);
        no_close_time.close_time = None;

        let converted = convert_raw(vec![
            RawCandle::default(),
            no_close_time,
            candle(0, 59_999, 2.0),
        ])
        .unwrap();
        assert_eq!(converted.report.malformed_rows_dropped, 2);
        assert_eq!(converted.rows.len(), 1);
    }

    #[test]
    fn cast_failure_aborts_the_conversion() {
        let mut busy = candle(0, 59_999, 1.0);
        busy.number_of_trades = Some(100_000);
        assert!(matches!(
            convert_raw(vec![busy]),
            Err(TypeCastError::OutOfRange { .. })
        ));
    }
}
