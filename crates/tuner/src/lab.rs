use crate::error::TunerError;
use crate::self_loop::{backtest_request_for, read_metrics};
use backtester::BacktestRunner;
use chrono::Utc;
use configuration::AppConfig;
use core_types::BacktestMetrics;
use llm_client::ChatClient;
use std::sync::Arc;
use strategy_file::{GeneratedStrategy, save_from_reply};

/// A generated strategy and, when it was backtested, how it did.
#[derive(Debug, Clone)]
pub struct LabResult {
    pub strategy: GeneratedStrategy,
    /// `None` when backtesting is switched off.
    pub backtest: Option<LabBacktest>,
}

#[derive(Debug, Clone, Copy)]
pub struct LabBacktest {
    pub success: bool,
    pub metrics: BacktestMetrics,
}

/// Asks the model for a whole new strategy, writes it next to the tuned one and
/// optionally backtests it.
pub struct StrategyLab {
    config: AppConfig,
    chat: Arc<dyn ChatClient>,
    runner: Arc<dyn BacktestRunner>,
}

impl StrategyLab {
    pub fn new(config: AppConfig, chat: Arc<dyn ChatClient>, runner: Arc<dyn BacktestRunner>) -> Self {
        Self { config, chat, runner }
    }

    /// Writes the strategy described by `request`, or by the configured prompt.
    pub async fn generate(&self, request: Option<&str>) -> Result<GeneratedStrategy, TunerError> {
        let lab = &self.config.lab;
        let request = request.unwrap_or(&lab.user_prompt);
        let reply = self.chat.chat(&lab.system_prompt, request).await?;
        Ok(save_from_reply(&reply, &self.config.strategy.dir, Utc::now())?)
    }

    pub async fn run(&self, request: Option<&str>) -> Result<LabResult, TunerError> {
        let strategy = self.generate(request).await?;
        if !self.config.lab.backtest {
            return Ok(LabResult {
                strategy,
                backtest: None,
            });
        }

        let export = self
            .config
            .paths
            .reports_dir
            .join(format!("trades_{}.json", strategy.class_name));
        let request = backtest_request_for(&self.config, &strategy.class_name, export);
        tracing::info!(strategy = %strategy.class_name, "Backtesting generated strategy");
        let outcome = self.runner.run(&request).await?;
        let metrics = read_metrics(&outcome, &request, &self.config.paths.debug_output);
        Ok(LabResult {
            strategy,
            backtest: Some(LabBacktest {
                success: outcome.success,
                metrics,
            }),
        })
    }
}
