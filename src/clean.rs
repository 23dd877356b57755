//! Deduplicate and order a raw dataset.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::candle::RawCandle;
use crate::integrity::{check_integrity, IntegrityViolation};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
    AsRead,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
            Self::AsRead => "as_read",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ascending" | "asc" => Some(Self::Ascending),
            "descending" | "desc" => Some(Self::Descending),
            "as_read" | "as-read" | "none" => Some(Self::AsRead),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanReport {
    pub input_rows: u64,
    pub duplicates_removed: u64,
    pub output_rows: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedDataset {
    pub rows: Vec<RawCandle>,
    pub report: CleanReport,
}

/// Drop later rows that repeat an `open_time`, order the rest, then re-check
/// integrity.
pub fn quick_clean(
    rows: Vec<RawCandle>,
    order: SortOrder,
) -> Result<CleanedDataset, IntegrityViolation> {
    let input_rows = rows.len() as u64;

    let mut seen = HashSet::with_capacity(rows.len());
    let mut deduped: Vec<RawCandle> = rows
        .into_iter()
        .filter(|row| seen.insert(row.open_time))
        .collect();
    let duplicates_removed = input_rows - deduped.len() as u64;

    if duplicates_removed > 0 {
        debug!(
            component = "clean",
            event = "clean.duplicates_removed",
            duplicates_removed
        );
    }

    match order {
        SortOrder::Ascending => deduped.sort_by_key(|row| row.open_time),
        SortOrder::Descending => deduped.sort_by(|a, b| b.open_time.cmp(&a.open_time)),
        SortOrder::AsRead => {}
    }

    check_integrity(&deduped)?;

    let report = CleanReport {
        input_rows,
        duplicates_removed,
        output_rows: deduped.len() as u64,
    };
    info!(
        component = "clean",
        event = "clean.finish",
        sort_order = order.as_str(),
        input_rows = report.input_rows,
        duplicates_removed = report.duplicates_removed,
        output_rows = report.output_rows
    );

    Ok(CleanedDataset {
        rows: deduped,
        report,
    })
}
