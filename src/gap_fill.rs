//! Minute gap filling.
//!
//! Input must already be ordered oldest first. Every missing minute between
//! two consecutive rows is imputed as an idle candle: flat at the last known
//! close, with zero volume and zero trades. Each synthesized row is derived
//! from the one before it, so a long gap becomes a flat run.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::candle::{one_minute, MinuteBar};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapFillReport {
    pub input_rows: u64,
    pub filled_minutes: u64,
    pub gap_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapFillResult<C> {
    pub rows: Vec<C>,
    pub report: GapFillReport,
}

pub fn fill_missing_minutes<C: MinuteBar>(rows: Vec<C>) -> GapFillResult<C> {
    let step = one_minute();
    let mut report = GapFillReport {
        input_rows: rows.len() as u64,
        ..GapFillReport::default()
    };
    let mut out = Vec::with_capacity(rows.len());
    let mut previous: Option<C> = None;

    for row in rows {
        if let Some(prev) = previous.as_ref() {
            if row.open_time() - prev.open_time() > step {
                report.gap_count += 1;
                let mut filler = prev.clone();
                while filler.open_time() + step < row.open_time() {
                    let next = filler.open_time() + step;
                    filler.shift_to(next);
                    filler.flatten_to_close();
                    out.push(filler.clone());
                    report.filled_minutes += 1;
                }
            }
        }

        previous = Some(row.clone());
        out.push(row);
    }

    if report.filled_minutes > 0 {
        debug!(
            component = "gap_fill",
            event = "gap_fill.filled",
            gap_count = report.gap_count,
            filled_minutes = report.filled_minutes
        );
    }

    GapFillResult { rows: out, report }
}
