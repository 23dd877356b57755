//! Dataset integrity: no blank rows, no repeated `open_time`.

use std::collections::HashMap;

use thiserror::Error;

use crate::candle::CandleRow;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityViolation {
    #[error("row {row} has every field empty")]
    EmptyRow { row: usize },
    #[error("open_time {open_time_ms:?} at row {duplicate_row} repeats row {first_row}")]
    DuplicateOpenTime {
        open_time_ms: Option<i64>,
        first_row: usize,
        duplicate_row: usize,
    },
}

/// Validate `rows` without touching them.
///
/// Blank rows are reported before duplicates. Two rows with an empty
/// `open_time` share the same (missing) key and count as duplicates.
pub fn check_integrity<R: CandleRow>(rows: &[R]) -> Result<(), IntegrityViolation> {
    if let Some(row) = rows.iter().position(|row| row.is_blank()) {
        return Err(IntegrityViolation::EmptyRow { row });
    }

    let mut seen: HashMap<Option<i64>, usize> = HashMap::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let key = row.open_time_ms();
        if let Some(&first_row) = seen.get(&key) {
            return Err(IntegrityViolation::DuplicateOpenTime {
                open_time_ms: key,
                first_row,
                duplicate_row: idx,
            });
        }
        seen.insert(key, idx);
    }

    Ok(())
}
