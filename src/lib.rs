//! Minute candlestick grooming.
//!
//! Turns raw per-symbol OHLCV exports into deduplicated CSV (clean mode) or
//! gap-filled, type-compact parquet files (compress mode):
//! - integrity checks and deduplication of raw rows
//! - full and compact column type profiles
//! - minute gap filling with flat zero-volume candles
//! - directory batch drivers with per-file isolation

mod batch;
mod candle;
mod clean;
mod dtypes;
mod gap_fill;
mod integrity;
mod observability;
mod pipeline;
mod storage;

pub use batch::{
    batch_config_from_env, compress_directory, compress_file, groom_directory, groom_file,
    load_full_profile, BatchConfig, BatchError, BatchMode, BatchReport, FileError, FileOutcome,
    FileStatus,
};
pub use candle::{
    one_minute, Candle, CandleRow, CompactCandle, MinuteBar, PrunedCandle, RawCandle,
    FULL_MINUTE_SPAN_MS, MINUTE_MS, RAW_COLUMNS,
};
pub use clean::{quick_clean, CleanReport, CleanedDataset, SortOrder};
pub use dtypes::{normalize_compact, normalize_full, ColumnType, DtypeProfile, TypeCastError};
pub use gap_fill::{fill_missing_minutes, GapFillReport, GapFillResult};
pub use integrity::{check_integrity, IntegrityViolation};
pub use observability::{
    init_logging, log_app_finish, log_app_start, logging_config_from_env, LogFormat,
    LoggingConfig, LoggingInitError,
};
pub use pipeline::{convert_raw, Conversion, ConversionReport};
pub use storage::{
    compact_schema, list_matching_files, read_compact_parquet, read_raw_csv,
    write_compact_parquet, write_raw_csv, ReadError, WriteError, DATETIME_COLUMN,
};
