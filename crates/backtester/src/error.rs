use thiserror::Error;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("Failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while collecting backtest output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Progress bar template error: {0}")]
    ProgressBarTemplate(String),
}

impl From<indicatif::style::TemplateError> for BacktestError {
    fn from(error: indicatif::style::TemplateError) -> Self {
        BacktestError::ProgressBarTemplate(error.to_string())
    }
}
