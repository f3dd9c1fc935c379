use indicatif::style::TemplateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WfoError {
    #[error("Tuning failed during the training window: {0}")]
    Tuner(#[from] tuner::TunerError),

    #[error("Backtester error during out-of-sample validation: {0}")]
    Backtester(#[from] backtester::error::BacktestError),

    #[error("Strategy file error during out-of-sample validation: {0}")]
    Strategy(#[from] strategy_file::StrategyFileError),

    #[error("Date range or period error: {0}")]
    DateError(String),

    #[error("Failed to render periods: {0}")]
    Render(String),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Progress bar template error: {0}")]
    ProgressBarTemplate(String),
}

impl From<TemplateError> for WfoError {
    fn from(error: TemplateError) -> Self {
        WfoError::ProgressBarTemplate(error.to_string())
    }
}

impl From<csv::Error> for WfoError {
    fn from(error: csv::Error) -> Self {
        WfoError::Render(error.to_string())
    }
}
