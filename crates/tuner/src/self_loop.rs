use crate::error::TunerError;
use crate::heartbeat::{Progress, spawn_heartbeat};
use crate::learning_log::LearningLog;
use crate::nudge::{StagnationGuard, perturb};
use crate::prompt::{STAGNATION_NOTE, build_prompt, default_prompt};
use analytics::{parse_with_debug, summarize_trades_file};
use backtester::{BacktestOutcome, BacktestRequest, BacktestRunner};
use chrono::Utc;
use configuration::AppConfig;
use core_types::{BacktestMetrics, LoopRecord, LoopStage, StrategyParameters};
use llm_client::{ChatClient, Suggester};
use memory::{MemoryStore, MemoryWindow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strategy_file::StrategyFile;
use tokio::sync::watch;

/// Everything a tuning run needs: its settings and the components it drives.
///
/// Components are trait objects so tests can swap the model, the backtester and the
/// memory store for scripted ones.
pub struct TunerContext {
    pub config: AppConfig,
    /// The prompt used while memory is empty. Defaults to [`default_prompt`].
    pub spec: Option<String>,
    pub chat: Arc<dyn ChatClient>,
    pub runner: Arc<dyn BacktestRunner>,
    /// `None` keeps memory for this run only.
    pub memory: Option<Arc<dyn MemoryStore>>,
}

impl TunerContext {
    pub fn new(config: AppConfig, chat: Arc<dyn ChatClient>, runner: Arc<dyn BacktestRunner>) -> Self {
        Self {
            config,
            spec: None,
            chat,
            runner,
            memory: None,
        }
    }

    pub fn with_memory(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(store);
        self
    }

    pub fn with_spec(mut self, spec: impl Into<String>) -> Self {
        self.spec = Some(spec.into());
        self
    }
}

/// The tuning loop: `Init`, then `Mutate → Run → Parse → Log → Persist` per
/// iteration, then `Done`.
///
/// Only structural failures end a run early: a strategy file without the expected
/// assignments, an unwritable learning log, or a runner that cannot run at all. A
/// failed model call falls back to the configured pair and a failed backtest is
/// recorded like any other iteration.
pub struct SelfLoop {
    ctx: TunerContext,
    strategy: StrategyFile,
    suggester: Suggester,
    log: LearningLog,
    window: MemoryWindow,
    spec: String,
    stagnation: Option<StagnationGuard>,
    /// Set after a nudge; the next prompt carries [`STAGNATION_NOTE`].
    nudged: bool,
    stage: LoopStage,
    progress: watch::Sender<Progress>,
}

impl SelfLoop {
    pub fn new(ctx: TunerContext) -> Self {
        let config = &ctx.config;
        let strategy = StrategyFile::new(config.strategy.file_path(), config.strategy.name.clone());
        let suggester = Suggester::new(
            ctx.chat.clone(),
            config.llm.system_prompt.clone(),
            config.tuning.bounds,
            config.tuning.fallback.to_params(),
        )
        .with_retries(
            config.tuning.llm_attempts,
            Duration::from_secs(config.tuning.retry_delay_secs),
        );
        let spec = ctx
            .spec
            .clone()
            .unwrap_or_else(|| default_prompt(&config.tuning.bounds));
        let (progress, _) = watch::channel(Progress {
            loop_index: 0,
            max_loops: config.tuning.max_loops,
            stage: LoopStage::Init,
        });

        Self {
            strategy,
            suggester,
            log: LearningLog::new(&config.paths.learning_log),
            window: MemoryWindow::new(config.memory.short_term_window),
            spec,
            stagnation: config
                .tuning
                .stagnation_after_secs
                .map(|secs| StagnationGuard::new(Duration::from_secs(secs))),
            nudged: false,
            stage: LoopStage::Init,
            progress,
            ctx,
        }
    }

    pub fn stage(&self) -> LoopStage {
        self.stage
    }

    pub fn window(&self) -> &MemoryWindow {
        &self.window
    }

    pub fn strategy(&self) -> &StrategyFile {
        &self.strategy
    }

    /// Runs `max_loops` iterations and returns their records in order.
    pub async fn run(&mut self) -> Result<Vec<LoopRecord>, TunerError> {
        let heartbeat = self
            .ctx
            .config
            .tuning
            .heartbeat_secs
            .map(|secs| spawn_heartbeat(Duration::from_secs(secs), self.progress.subscribe()));

        let result = self.run_loops().await;

        if let Some(handle) = heartbeat {
            handle.abort();
        }
        result
    }

    async fn run_loops(&mut self) -> Result<Vec<LoopRecord>, TunerError> {
        self.init().await?;

        let max_loops = self.ctx.config.tuning.max_loops;
        let sleep = Duration::from_secs(self.ctx.config.tuning.loop_sleep_secs);
        let mut records = Vec::with_capacity(max_loops as usize);

        for loop_index in 1..=max_loops {
            tracing::info!(loop_index, max_loops, "=== LOOP {}/{} ===", loop_index, max_loops);
            let record = self.iterate(loop_index).await?;
            records.push(record);

            if loop_index < max_loops && !sleep.is_zero() {
                tokio::time::sleep(sleep).await;
            }
        }

        self.enter(LoopStage::Done, max_loops);
        tracing::info!(iterations = records.len(), "Tuning run complete");
        Ok(records)
    }

    async fn init(&mut self) -> Result<(), TunerError> {
        self.enter(LoopStage::Init, 0);

        let timeframe = self.ctx.config.backtest.timeframe.clone();
        if self.strategy.ensure_exists(&timeframe)? {
            tracing::info!(path = %self.strategy.path().display(), "Created baseline strategy");
        }

        if self.ctx.config.backtest.download_data {
            let request = self.backtest_request(0);
            if !self.ctx.runner.prepare(&request).await {
                tracing::warn!("Data preparation failed; backtests may fail too");
            }
        }

        if let Some(store) = &self.ctx.memory {
            match MemoryWindow::load(store.as_ref(), self.ctx.config.memory.short_term_window).await {
                Ok(window) => self.window = window,
                Err(e) => tracing::warn!(error = %e, "Could not load memory; starting empty"),
            }
        }
        Ok(())
    }

    async fn iterate(&mut self, loop_index: u32) -> Result<LoopRecord, TunerError> {
        self.enter(LoopStage::Mutate, loop_index);
        let (parameters, used_fallback) = self.propose().await;
        let parameters = self.strategy.mutate(&parameters)?;

        self.enter(LoopStage::Run, loop_index);
        let request = self.backtest_request(loop_index);
        let outcome = self.ctx.runner.run(&request).await?;

        self.enter(LoopStage::Parse, loop_index);
        let metrics = self.parse(&outcome, &request);

        self.enter(LoopStage::Log, loop_index);
        let record = LoopRecord {
            loop_index,
            parameters,
            used_fallback,
            backtest_success: outcome.success,
            metrics,
            timestamp: Utc::now(),
        };
        self.log.append(&record)?;
        tracing::info!(summary = %record.summary(), "Recorded iteration");

        self.enter(LoopStage::Persist, loop_index);
        self.window.record(&record);
        if let Some(store) = &self.ctx.memory {
            if let Err(e) = self.window.persist(store.as_ref()).await {
                tracing::warn!(error = %e, "Could not persist memory; continuing");
            }
        }
        Ok(record)
    }

    /// Asks the model, then nudges the answer if it has been the same for too long.
    async fn propose(&mut self) -> (StrategyParameters, bool) {
        let tuning = &self.ctx.config.tuning;
        let mut prompt = build_prompt(
            &self.spec,
            &self.window,
            &self.ctx.config.strategy.name,
            &tuning.bounds,
            tuning.prompt_window,
        );
        if std::mem::take(&mut self.nudged) {
            prompt.push_str(STAGNATION_NOTE);
        }
        let proposal = self.suggester.suggest(&prompt).await;
        let used_fallback = proposal.is_fallback();
        let proposed = proposal.into_params();

        let Some(guard) = &mut self.stagnation else {
            return (proposed, used_fallback);
        };
        let now = Instant::now();
        if !guard.is_stagnant(&proposed, now) {
            return (proposed, used_fallback);
        }
        guard.reset(&proposed, now);
        self.nudged = true;
        let nudged = perturb(&proposed, &self.ctx.config.tuning.bounds, &mut rand::thread_rng());
        tracing::warn!(from = %proposed, to = %nudged, "Parameters unchanged for too long; nudging");
        (nudged, used_fallback)
    }

    fn parse(&self, outcome: &BacktestOutcome, request: &BacktestRequest) -> BacktestMetrics {
        read_metrics(outcome, request, &self.ctx.config.paths.debug_output)
    }

    /// The backtest invocation for iteration `loop_index` under the current settings.
    pub fn backtest_request(&self, loop_index: u32) -> BacktestRequest {
        let config = &self.ctx.config;
        let export = config
            .paths
            .reports_dir
            .join(format!("trades_loop_{}.json", loop_index));
        backtest_request_for(config, &config.strategy.name, export)
    }

    fn enter(&mut self, stage: LoopStage, loop_index: u32) {
        debug_assert!(
            stage == self.stage.next() || matches!(stage, LoopStage::Init | LoopStage::Done),
            "illegal transition {} -> {}",
            self.stage,
            stage
        );
        tracing::debug!(loop_index, from = %self.stage, to = %stage, "Stage transition");
        self.stage = stage;
        self.progress.send_replace(Progress {
            loop_index,
            max_loops: self.ctx.config.tuning.max_loops,
            stage,
        });
    }
}

/// A backtest of `strategy_name` under `config`, exporting trades to `export` when the
/// settings ask for an export.
pub fn backtest_request_for(config: &AppConfig, strategy_name: &str, export: PathBuf) -> BacktestRequest {
    BacktestRequest {
        config_path: config.backtest.config_path.clone(),
        strategy_name: strategy_name.to_string(),
        strategy_dir: config.strategy.dir.clone(),
        timeframe: config.backtest.timeframe.clone(),
        timerange: config.backtest.timerange.clone(),
        export_trades: config.backtest.export_trades,
        export_filename: config.backtest.export_trades.then_some(export),
        verbosity: config.backtest.verbosity,
    }
}

/// Metrics of a finished backtest: the summary table, then the trade export for
/// whatever the table left unparsed. A failed run has none.
pub fn read_metrics(outcome: &BacktestOutcome, request: &BacktestRequest, debug_output: &Path) -> BacktestMetrics {
    if !outcome.success {
        tracing::warn!(exit_code = ?outcome.exit_code, "Backtest failed; recording without metrics");
        return BacktestMetrics::default();
    }

    let mut metrics = parse_with_debug(&outcome.output, debug_output);
    if let Some(export) = &request.export_filename {
        match summarize_trades_file(export) {
            Ok(summary) if summary.trades > 0 => metrics.merge_missing(&summary.to_metrics()),
            Ok(_) => {}
            Err(e) => tracing::warn!(path = %export.display(), error = %e, "Could not read trade export"),
        }
    }
    metrics
}
