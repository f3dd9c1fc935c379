//! Logging configuration and initialization.

use crate::error::ConfigError;
use crate::rotation::{RotatingFile, prune_old_logs};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Console output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    /// Structured JSON-line log file. Disabled when absent.
    pub file: Option<LogFileConfig>,
}

/// A size-bounded, backup-count-bounded JSON-line log file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogFileConfig {
    pub path: PathBuf,
    pub max_bytes: u64,
    pub max_backups: usize,
    /// Rotated backups older than this many days are deleted at startup. `None` keeps
    /// them until rotation drops them.
    pub keep_days: Option<u64>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

impl Default for LogFileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("user_data/logs/tuneloop.log"),
            max_bytes: 10 * 1024 * 1024,
            max_backups: 5,
            keep_days: Some(14),
        }
    }
}

impl LoggingConfig {
    /// Initialize the tracing subscriber with this logging configuration.
    ///
    /// `RUST_LOG` takes precedence over `level`. When a log file is configured the
    /// returned guard must be held until shutdown, or buffered lines are lost.
    pub fn init(&self) -> Result<Option<WorkerGuard>, ConfigError> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        let pretty = (self.format == LogFormat::Pretty).then(fmt::layer);
        let json = (self.format == LogFormat::Json).then(|| fmt::layer().json());

        let pruned = self.file.as_ref().and_then(LogFileConfig::prune);
        let (file_layer, guard) = match &self.file {
            Some(file) => {
                let writer = RotatingFile::new(&file.path, file.max_bytes, file.max_backups)?;
                let (non_blocking, guard) = tracing_appender::non_blocking(writer);
                let layer = fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(non_blocking);
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(pretty)
            .with(json)
            .with(file_layer)
            .try_init()
            .map_err(|e| ConfigError::Logging(e.to_string()))?;

        match pruned {
            Some(Ok(0)) | None => {}
            Some(Ok(removed)) => tracing::debug!(removed, "Pruned old log backups"),
            Some(Err(e)) => tracing::warn!(error = %e, "Failed to prune old log backups"),
        }
        Ok(guard)
    }
}

impl LogFileConfig {
    /// Removes backups older than `keep_days`. `None` when pruning is disabled.
    pub fn prune(&self) -> Option<std::io::Result<usize>> {
        let days = self.keep_days?;
        let max_age = Duration::from_secs(days.saturating_mul(24 * 60 * 60));
        Some(prune_old_logs(&self.path, max_age))
    }
}
