use crate::error::TunerError;
use chrono::{DateTime, Utc};
use core_types::{BacktestMetrics, LoopRecord, Metric, Ranked};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Column order of the learning log.
pub const HEADER: [&str; 11] = [
    "loop",
    "minimal_roi_0",
    "stoploss",
    "minimal_roi",
    "used_fallback",
    "backtest_success",
    "trades",
    "profit_percent",
    "win_rate",
    "max_drawdown",
    "timestamp",
];

/// One line of the learning log. Field order matches [`HEADER`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningLogRow {
    #[serde(rename = "loop")]
    pub loop_index: u32,
    pub minimal_roi_0: Decimal,
    pub stoploss: Decimal,
    /// The full table as written into the strategy file.
    pub minimal_roi: String,
    pub used_fallback: bool,
    pub backtest_success: bool,
    pub trades: Metric,
    pub profit_percent: Metric,
    pub win_rate: Metric,
    pub max_drawdown: Metric,
    pub timestamp: DateTime<Utc>,
}

impl From<&LoopRecord> for LearningLogRow {
    fn from(record: &LoopRecord) -> Self {
        Self {
            loop_index: record.loop_index,
            minimal_roi_0: record.parameters.minimal_roi_0(),
            stoploss: record.parameters.stoploss,
            minimal_roi: record.parameters.minimal_roi.to_source_literal(),
            used_fallback: record.used_fallback,
            backtest_success: record.backtest_success,
            trades: record.metrics.trades,
            profit_percent: record.metrics.profit_percent,
            win_rate: record.metrics.win_rate,
            max_drawdown: record.metrics.max_drawdown,
            timestamp: record.timestamp,
        }
    }
}

impl Ranked for LearningLogRow {
    fn succeeded(&self) -> bool {
        self.backtest_success
    }

    fn metrics(&self) -> BacktestMetrics {
        BacktestMetrics {
            trades: self.trades,
            profit_percent: self.profit_percent,
            win_rate: self.win_rate,
            max_drawdown: self.max_drawdown,
        }
    }
}

/// Append-only CSV of every iteration. The header is written when the file is created.
#[derive(Debug, Clone)]
pub struct LearningLog {
    path: PathBuf,
}

impl LearningLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &LoopRecord) -> Result<(), TunerError> {
        let io = |source| TunerError::Io {
            path: self.path.display().to_string(),
            source,
        };
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(io)?;
        }
        let is_new = std::fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io)?;

        let csv_err = |source| TunerError::LearningLog {
            path: self.path.display().to_string(),
            source,
        };
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            writer.write_record(HEADER).map_err(csv_err)?;
        }
        writer.serialize(LearningLogRow::from(record)).map_err(csv_err)?;
        writer.flush().map_err(io)?;
        Ok(())
    }
}
