use thiserror::Error;

/// Failures that end a tuning run. Everything transient (model errors, failed
/// backtests, unreadable reports, unreachable memory) is absorbed inside the loop.
#[derive(Error, Debug)]
pub enum TunerError {
    #[error("Strategy file error: {0}")]
    Strategy(#[from] strategy_file::StrategyFileError),

    #[error("Model request failed: {0}")]
    Model(#[from] llm_client::LlmError),

    #[error("Backtest runner error: {0}")]
    Backtest(#[from] backtester::error::BacktestError),

    #[error("Failed to write learning log {path}: {source}")]
    LearningLog {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to prepare {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
