//! Directory-wide drivers: clean CSV exports in place, or compress them to
//! gap-filled parquet files.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::candle::Candle;
use crate::clean::{quick_clean, CleanReport, SortOrder};
use crate::dtypes::{normalize_full, TypeCastError};
use crate::integrity::IntegrityViolation;
use crate::pipeline::{convert_raw, ConversionReport};
use crate::storage::{
    list_matching_files, read_raw_csv, write_compact_parquet, write_raw_csv, ReadError,
    WriteError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub input_extension: String,
    pub output_extension: String,
    pub sort_order: SortOrder,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("compressed"),
            input_extension: "csv".to_string(),
            output_extension: "parquet".to_string(),
            sort_order: SortOrder::Ascending,
        }
    }
}

pub fn batch_config_from_env() -> BatchConfig {
    let mut config = BatchConfig::default();

    if let Some(dir) = non_blank_var("CANDLE_DATA_DIR") {
        config.input_dir = PathBuf::from(dir);
    }

    if let Some(dir) = non_blank_var("CANDLE_OUTPUT_DIR") {
        config.output_dir = PathBuf::from(dir);
    }

    if let Some(order) = non_blank_var("CANDLE_SORT_ORDER") {
        if let Some(parsed) = SortOrder::parse(&order) {
            config.sort_order = parsed;
        }
    }

    config
}

fn non_blank_var(key: &str) -> Option<String> {
    let raw = env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug, Error)]
pub enum FileError {
    #[error("read failed: {0}")]
    Read(#[from] ReadError),
    #[error("integrity violation: {0}")]
    Integrity(#[from] IntegrityViolation),
    #[error("type cast failed: {0}")]
    TypeCast(#[from] TypeCastError),
    #[error("write failed: {0}")]
    Write(#[from] WriteError),
    #[error("cannot derive output name from {0}")]
    OutputName(PathBuf),
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("cannot list {path}: {source}")]
    ListDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot create output directory {path}: {source}")]
    CreateOutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchMode {
    Groom,
    Compress,
}

impl BatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Groom => "groom",
            Self::Compress => "compress",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Cleaned(CleanReport),
    Converted(ConversionReport),
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub status: FileStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub mode: BatchMode,
    pub input_dir: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub files: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.files
            .iter()
            .filter(|file| matches!(file.status, FileStatus::Failed { .. }))
            .count()
    }

    pub fn succeeded(&self) -> usize {
        self.files.len() - self.failed()
    }
}

pub fn groom_file(path: &Path, order: SortOrder) -> Result<CleanReport, FileError> {
    let rows = read_raw_csv(path)?;
    let cleaned = quick_clean(rows, order)?;
    write_raw_csv(path, &cleaned.rows)?;
    Ok(cleaned.report)
}

pub fn compress_file(input: &Path, output: &Path) -> Result<ConversionReport, FileError> {
    let rows = read_raw_csv(input)?;
    let converted = convert_raw(rows)?;
    write_compact_parquet(output, &converted.rows)?;
    Ok(converted.report)
}

pub fn load_full_profile(path: &Path) -> Result<Vec<Candle>, FileError> {
    let rows = read_raw_csv(path)?;
    Ok(normalize_full(&rows)?)
}

pub fn groom_directory(cfg: &BatchConfig) -> Result<BatchReport, BatchError> {
    let inputs = list_inputs(cfg)?;
    log_batch_start(BatchMode::Groom, cfg, inputs.len());

    let mut files = Vec::with_capacity(inputs.len());
    for input in inputs {
        let status = match groom_file(&input, cfg.sort_order) {
            Ok(report) => FileStatus::Cleaned(report),
            Err(err) => file_failed(BatchMode::Groom, &input, &err),
        };
        files.push(FileOutcome {
            output: Some(input.clone()),
            input,
            status,
        });
    }

    let report = BatchReport {
        mode: BatchMode::Groom,
        input_dir: cfg.input_dir.clone(),
        output_dir: None,
        files,
    };
    log_batch_finish(&report);
    Ok(report)
}

pub fn compress_directory(cfg: &BatchConfig) -> Result<BatchReport, BatchError> {
    fs::create_dir_all(&cfg.output_dir).map_err(|source| BatchError::CreateOutputDir {
        path: cfg.output_dir.clone(),
        source,
    })?;
    let inputs = list_inputs(cfg)?;
    log_batch_start(BatchMode::Compress, cfg, inputs.len());

    let mut files = Vec::with_capacity(inputs.len());
    for input in inputs {
        let output = output_path_for(&input, cfg);
        let status = match output.as_deref() {
            Some(output) => match compress_file(&input, output) {
                Ok(report) => FileStatus::Converted(report),
                Err(err) => file_failed(BatchMode::Compress, &input, &err),
            },
            None => file_failed(
                BatchMode::Compress,
                &input,
                &FileError::OutputName(input.clone()),
            ),
        };
        files.push(FileOutcome {
            input,
            output,
            status,
        });
    }

    let report = BatchReport {
        mode: BatchMode::Compress,
        input_dir: cfg.input_dir.clone(),
        output_dir: Some(cfg.output_dir.clone()),
        files,
    };
    log_batch_finish(&report);
    Ok(report)
}

fn list_inputs(cfg: &BatchConfig) -> Result<Vec<PathBuf>, BatchError> {
    list_matching_files(&cfg.input_dir, &cfg.input_extension).map_err(|source| {
        BatchError::ListDir {
            path: cfg.input_dir.clone(),
            source,
        }
    })
}

fn output_path_for(input: &Path, cfg: &BatchConfig) -> Option<PathBuf> {
    let stem = input.file_stem()?.to_string_lossy();
    Some(
        cfg.output_dir
            .join(format!("{stem}.{}", cfg.output_extension)),
    )
}

fn file_failed(mode: BatchMode, input: &Path, err: &FileError) -> FileStatus {
    warn!(
        component = "batch",
        event = "batch.file.failed",
        mode = mode.as_str(),
        path = %input.display(),
        error = %err
    );
    FileStatus::Failed {
        error: err.to_string(),
    }
}

fn log_batch_start(mode: BatchMode, cfg: &BatchConfig, file_count: usize) {
    info!(
        component = "batch",
        event = "batch.start",
        mode = mode.as_str(),
        input_dir = %cfg.input_dir.display(),
        extension = %cfg.input_extension,
        file_count
    );
}

fn log_batch_finish(report: &BatchReport) {
    info!(
        component = "batch",
        event = "batch.finish",
        mode = report.mode.as_str(),
        succeeded = report.succeeded(),
        failed = report.failed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_lock() -> &'static Mutex<()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn with_env_vars<R>(vars: &[(&str, Option<&str>)], f: impl FnOnce() -> R) -> R {
        let _guard = env_lock().lock().expect("env lock should not be poisoned");
        let previous: Vec<(String, Option<String>)> = vars
            .iter()
            .map(|(key, _)| ((*key).to_string(), env::var(key).ok()))
            .collect();

        for (key, value) in vars {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        let output = f();

        for (key, value) in previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        output
    }

    #[test]
    fn defaults_when_env_missing() {
        let cfg = with_env_vars(
            &[
                ("CANDLE_DATA_DIR", None),
                ("CANDLE_OUTPUT_DIR", None),
                ("CANDLE_SORT_ORDER", None),
            ],
            batch_config_from_env,
        );

        assert_eq!(cfg, BatchConfig::default());
        assert_eq!(cfg.input_dir, PathBuf::from("data"));
        assert_eq!(cfg.output_dir, PathBuf::from("compressed"));
    }

    #[test]
    fn env_overrides_directories_and_sort_order() {
        let cfg = with_env_vars(
            &[
                ("CANDLE_DATA_DIR", Some("/srv/klines")),
                ("CANDLE_OUTPUT_DIR", Some(" /srv/packed ")),
                ("CANDLE_SORT_ORDER", Some("as_read")),
            ],
            batch_config_from_env,
        );

        assert_eq!(cfg.input_dir, PathBuf::from("/srv/klines"));
        assert_eq!(cfg.output_dir, PathBuf::from("/srv/packed"));
        assert_eq!(cfg.sort_order, SortOrder::AsRead);
    }

    #[test]
    fn blank_or_invalid_values_fall_back_to_defaults() {
        let cfg = with_env_vars(
            &[
                ("CANDLE_DATA_DIR", Some("   ")),
                ("CANDLE_OUTPUT_DIR", None),
                ("CANDLE_SORT_ORDER", Some("random")),
            ],
            batch_config_from_env,
        );

        assert_eq!(cfg, BatchConfig::default());
    }

    #[test]
    fn output_path_swaps_directory_and_extension() {
        let cfg = BatchConfig {
            output_dir: PathBuf::from("out"),
            ..BatchConfig::default()
        };
        assert_eq!(
            output_path_for(Path::new("data/BTCUSDT-1m.csv"), &cfg),
            Some(PathBuf::from("out/BTCUSDT-1m.parquet"))
        );
        assert_eq!(
            output_path_for(Path::new("data/BTC.USDT.csv"), &cfg),
            Some(PathBuf::from("out/BTC.USDT.parquet"))
        );
    }
}
