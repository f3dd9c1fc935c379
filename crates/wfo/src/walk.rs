use crate::error::WfoError;
use crate::period::WalkPeriod;
use analytics::parse_text_metrics;
use backtester::{BacktestRequest, BacktestRunner};
use configuration::AppConfig;
use core_types::{BacktestMetrics, LoopRecord};
use indicatif::{ProgressBar, ProgressStyle};
use llm_client::ChatClient;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strategy_file::StrategyFile;
use tuner::{SelfLoop, TunerContext};

/// What one walk produced: the best training iteration and how it held up out of sample.
#[derive(Debug, Clone, Serialize)]
pub struct WalkResult {
    pub period: usize,
    pub train_range: String,
    pub test_range: String,
    /// Tuning iterations run on the training window.
    pub iterations: usize,
    /// `None` when no training backtest produced a profit figure.
    pub best: Option<LoopRecord>,
    pub test_success: bool,
    pub test_metrics: BacktestMetrics,
}

/// Aggregate view over all walks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalkSummary {
    pub total_periods: usize,
    pub validated_periods: usize,
    pub success_rate: Decimal,
    pub avg_profit_percent: Option<Decimal>,
    pub total_trades: Decimal,
    pub best_period: Option<usize>,
    pub worst_period: Option<usize>,
}

/// The highest parsed profit among successful iterations. Ties go to the earlier one.
pub fn best_record(records: &[LoopRecord]) -> Option<&LoopRecord> {
    core_types::best_of(records)
}

pub fn summarize_walks(results: &[WalkResult]) -> WalkSummary {
    let validated: Vec<&WalkResult> = results.iter().filter(|r| r.test_success).collect();
    let profits: Vec<(usize, Decimal)> = validated
        .iter()
        .filter_map(|r| r.test_metrics.profit_percent.value().map(|p| (r.period, p)))
        .collect();

    let success_rate = if results.is_empty() {
        Decimal::ZERO
    } else {
        (Decimal::from(validated.len() * 100) / Decimal::from(results.len())).round_dp(2)
    };
    let avg_profit_percent = (!profits.is_empty()).then(|| {
        let total: Decimal = profits.iter().map(|(_, p)| *p).sum();
        (total / Decimal::from(profits.len())).round_dp(4)
    });

    WalkSummary {
        total_periods: results.len(),
        validated_periods: validated.len(),
        success_rate,
        avg_profit_percent,
        total_trades: validated
            .iter()
            .filter_map(|r| r.test_metrics.trades.value())
            .sum(),
        best_period: profits.iter().max_by_key(|(_, p)| *p).map(|(i, _)| *i),
        worst_period: profits.iter().min_by_key(|(_, p)| *p).map(|(i, _)| *i),
    }
}

/// Tunes on each training window and validates the winner on the following test window.
///
/// Each period gets its own directory under `output_dir` holding its learning log and
/// the validation backtest output. Training runs without persistent memory so nothing
/// learned in one period leaks into the next.
pub struct WalkForward {
    config: AppConfig,
    chat: Arc<dyn ChatClient>,
    runner: Arc<dyn BacktestRunner>,
    loops_per_period: u32,
    output_dir: PathBuf,
    show_progress: bool,
}

impl WalkForward {
    pub fn new(config: AppConfig, chat: Arc<dyn ChatClient>, runner: Arc<dyn BacktestRunner>) -> Self {
        let output_dir = config.paths.reports_dir.join("walk_forward");
        let loops_per_period = config.tuning.max_loops;
        Self {
            config,
            chat,
            runner,
            loops_per_period,
            output_dir,
            show_progress: false,
        }
    }

    pub fn with_loops_per_period(mut self, loops: u32) -> Self {
        self.loops_per_period = loops.max(1);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The main entry point to run the entire walk-forward process.
    pub async fn run(&self, periods: &[WalkPeriod]) -> Result<Vec<WalkResult>, WfoError> {
        let (Some(first), Some(last)) = (periods.first(), periods.last()) else {
            return Err(WfoError::DateError("no walk-forward periods to run".to_string()));
        };

        if self.config.backtest.download_data {
            let whole = format!(
                "{}-{}",
                first.train_start.format(crate::DATE_FORMAT),
                last.test_end.format(crate::DATE_FORMAT)
            );
            if !self.runner.prepare(&self.request(&self.config, whole)).await {
                tracing::warn!("Data preparation failed; walks may fail too");
            }
        }

        tracing::info!(periods = periods.len(), loops = self.loops_per_period, "Starting walk-forward run");
        let progress_bar = if self.show_progress {
            ProgressBar::new(periods.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("=>-"),
        );

        let mut results = Vec::with_capacity(periods.len());
        for period in periods {
            progress_bar.set_message(format!("period {}", period.index));
            let result = self.execute_walk(period).await?;
            tracing::info!(
                period = result.period,
                test_success = result.test_success,
                test_profit = %result.test_metrics.profit_percent,
                "Walk complete"
            );
            results.push(result);
            progress_bar.inc(1);
        }
        progress_bar.finish_with_message("walk-forward complete");

        self.save_results(&results)?;
        Ok(results)
    }

    /// One walk: tune on the training window, then backtest the best pair on the test window.
    async fn execute_walk(&self, period: &WalkPeriod) -> Result<WalkResult, WfoError> {
        let dir = self.output_dir.join(format!("period_{}", period.index));
        tracing::info!(
            period = period.index,
            train = %period.train_range(),
            test = %period.test_range(),
            "Starting walk"
        );

        let mut config = self.config.clone();
        config.backtest.timerange = period.train_range();
        config.backtest.download_data = false;
        config.tuning.max_loops = self.loops_per_period;
        config.paths.learning_log = dir.join("learning_log.csv");
        config.paths.debug_output = dir.join("backtest_debug_output.txt");
        config.paths.reports_dir = dir.clone();

        let ctx = TunerContext::new(config.clone(), self.chat.clone(), self.runner.clone());
        let records = SelfLoop::new(ctx).run().await?;
        let best = best_record(&records).cloned();

        let mut result = WalkResult {
            period: period.index,
            train_range: period.train_range(),
            test_range: period.test_range(),
            iterations: records.len(),
            best,
            test_success: false,
            test_metrics: BacktestMetrics::default(),
        };
        let Some(best) = &result.best else {
            tracing::warn!(period = period.index, "No training iteration produced a profit figure; skipping validation");
            return Ok(result);
        };

        let strategy = StrategyFile::new(config.strategy.file_path(), config.strategy.name.clone());
        strategy.mutate(&best.parameters)?;
        let outcome = self
            .runner
            .run(&self.request(&config, period.test_range()))
            .await?;

        let log_path = dir.join("validation_backtest.log");
        std::fs::create_dir_all(&dir)
            .and_then(|_| std::fs::write(&log_path, &outcome.output))
            .map_err(|source| WfoError::Io {
                path: log_path.display().to_string(),
                source,
            })?;

        result.test_success = outcome.success;
        if outcome.success {
            result.test_metrics = parse_text_metrics(&outcome.output);
        }
        Ok(result)
    }

    fn request(&self, config: &AppConfig, timerange: String) -> BacktestRequest {
        BacktestRequest {
            config_path: config.backtest.config_path.clone(),
            strategy_name: config.strategy.name.clone(),
            strategy_dir: config.strategy.dir.clone(),
            timeframe: config.backtest.timeframe.clone(),
            timerange,
            export_trades: false,
            export_filename: None,
            verbosity: config.backtest.verbosity,
        }
    }

    /// Writes `results.json` holding the summary and every walk.
    fn save_results(&self, results: &[WalkResult]) -> Result<(), WfoError> {
        let path = self.output_dir.join("results.json");
        let document = serde_json::json!({
            "summary": summarize_walks(results),
            "periods": results,
        });
        let text = serde_json::to_string_pretty(&document)?;
        std::fs::create_dir_all(&self.output_dir)
            .and_then(|_| std::fs::write(&path, text))
            .map_err(|source| WfoError::Io {
                path: path.display().to_string(),
                source,
            })
    }
}
