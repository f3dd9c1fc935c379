use analyzer::{
    LearningLogReader, RankFilters, export_training_jsonl, render_stats, render_summary_table,
    select, stats,
};
use analytics::{load_json_report, locate_report, summarize_trades_file};
use backtester::FreqtradeRunner;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use comfy_table::Table;
use comfy_table::presets::UTF8_FULL;
use configuration::{
    AppConfig, DEFAULT_CONFIG_PATH, LoggingConfig, MemoryBackend, PathSettings, load_config,
};
use llm_client::{OpenAiCompatClient, TranscriptLog};
use memory::MemoryStore;
use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strategy_file::PatchManager;
use tuner::{LearningLogRow, Leaderboard, SelfLoop, StrategyLab, TunerContext, run_battle};
use verifier::Verifier;
use wfo::{PeriodFormat, WalkForward, WalkResult, generate_periods, render_periods};

/// The main entry point for the tuneloop application.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A .env file is optional; real environment variables win either way.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let loaded = load_config(&cli.settings);
    let logging = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_else(|_| LoggingConfig::default());
    let _guard = logging.init()?;

    let config = || -> anyhow::Result<AppConfig> {
        loaded
            .as_ref()
            .map(Clone::clone)
            .map_err(|e| anyhow::anyhow!("{}: {}", cli.settings.display(), e))
    };

    match &cli.command {
        Commands::Run(args) => handle_run(config()?, args).await,
        Commands::MemoryServer { addr } => Ok(memory_server::run_server(*addr).await?),
        Commands::Memory(args) => handle_memory(loaded.as_ref().ok(), args).await,
        Commands::Verify { once } => handle_verify(&cli.settings, *once).await,
        Commands::Wfo(command) => handle_wfo(config, command).await,
        Commands::ParseReport { path, trades } => {
            handle_parse_report(loaded.as_ref().ok(), path.as_deref(), trades.as_deref())
        }
        Commands::Summary(args) => handle_summary(loaded.as_ref().ok(), args),
        Commands::Patch(command) => handle_patch(loaded.as_ref().ok(), command),
        Commands::Lab(args) => handle_lab(config()?, args).await,
        Commands::Battle(args) => handle_battle(config()?, args).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// LLM-guided parameter tuning around the freqtrade backtester.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The tuneloop settings file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    settings: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tuning loop.
    Run(RunArgs),
    /// Serve the key-value memory over HTTP.
    MemoryServer {
        #[arg(long, default_value = "0.0.0.0:8080")]
        addr: SocketAddr,
    },
    /// Read or write the memory store directly.
    Memory(MemoryArgs),
    /// Check the endpoint, settings, resources and model.
    Verify {
        /// Run a single cycle instead of polling.
        #[arg(long)]
        once: bool,
    },
    /// Walk-forward validation.
    #[command(subcommand)]
    Wfo(WfoCommand),
    /// Summarize a backtest JSON report.
    ParseReport {
        /// The report to read. Defaults to the newest one in the reports directory.
        path: Option<PathBuf>,
        /// Also summarize a trades export (CSV or JSON).
        #[arg(long)]
        trades: Option<PathBuf>,
    },
    /// Show the most recent learning log rows, or the best ones when filtering.
    Summary(SummaryArgs),
    /// Apply or roll back a model-suggested edit.
    #[command(subcommand)]
    Patch(PatchCommand),
    /// Have the model write a new strategy, then backtest it.
    Lab(LabArgs),
    /// Backtest several strategies and rank them into a leaderboard.
    Battle(BattleArgs),
}

#[derive(Args)]
struct LabArgs {
    /// What to build. A path to an existing file is read. Defaults to the configured prompt.
    #[arg(long)]
    spec: Option<String>,
    /// Only write the file.
    #[arg(long)]
    no_backtest: bool,
}

#[derive(Args)]
struct BattleArgs {
    /// Strategy class names. Defaults to the configured list.
    #[arg(long, num_args = 1..)]
    strategies: Vec<String>,
    #[arg(long)]
    timerange: Option<String>,
    /// Drop strategies with fewer trades from the ranking.
    #[arg(long)]
    min_trades: Option<Decimal>,
    /// Drop strategies with a deeper drawdown (percent) from the ranking.
    #[arg(long)]
    max_drawdown: Option<Decimal>,
}

#[derive(Args)]
struct SummaryArgs {
    #[arg(long)]
    log: Option<PathBuf>,
    #[arg(short, default_value_t = 20)]
    n: usize,
    /// Also write successful rows as JSON lines for fine-tuning.
    #[arg(long)]
    export: Option<PathBuf>,
    /// Rank by profit, dropping rows with fewer trades.
    #[arg(long)]
    min_trades: Option<Decimal>,
    /// Rank by profit, dropping rows with a deeper drawdown (percent).
    #[arg(long)]
    max_drawdown: Option<Decimal>,
}

impl SummaryArgs {
    fn filters(&self) -> Option<RankFilters> {
        if self.min_trades.is_none() && self.max_drawdown.is_none() {
            return None;
        }
        Some(RankFilters {
            min_trades: self.min_trades.unwrap_or_default(),
            max_drawdown_pct: self.max_drawdown,
        })
    }
}

#[derive(Args)]
struct RunArgs {
    /// The freqtrade config passed to the backtester.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    max_loops: Option<u32>,
    /// Prompt used while memory is empty. A path to an existing file is read.
    #[arg(long)]
    spec: Option<String>,
    #[arg(long)]
    strategy: Option<String>,
    #[arg(long)]
    timeframe: Option<String>,
    /// YYYYMMDD-YYYYMMDD, either side may be empty.
    #[arg(long)]
    timerange: Option<String>,
    /// Passed through to freqtrade; repeat for more.
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
    #[arg(long)]
    export_trades: bool,
    /// Keep memory for this run only.
    #[arg(long)]
    disable_memory: bool,
}

#[derive(Args)]
struct MemoryArgs {
    #[arg(long, value_enum)]
    backend: Option<MemoryBackend>,
    /// Memory file for the `file` backend.
    #[arg(long)]
    path: Option<PathBuf>,
    /// Server URL for the `http` backend.
    #[arg(long)]
    url: Option<String>,
    #[command(subcommand)]
    command: MemoryCommand,
}

#[derive(Subcommand)]
enum MemoryCommand {
    Get { key: String },
    /// Stores `value`, parsed as JSON when possible and as a string otherwise.
    Put { key: String, value: String },
    Delete { key: String },
    Append { key: String, value: String },
    Keys,
}

#[derive(Args)]
struct PeriodArgs {
    /// YYYYMMDD
    #[arg(long, value_parser = parse_yyyymmdd)]
    start: NaiveDate,
    #[arg(long, value_parser = parse_yyyymmdd)]
    end: NaiveDate,
    #[arg(long, default_value_t = 3)]
    train_months: u32,
    #[arg(long, default_value_t = 1)]
    test_months: u32,
    #[arg(long, default_value_t = 1)]
    step_months: u32,
}

#[derive(Subcommand)]
enum WfoCommand {
    /// Print the train/test periods.
    Periods {
        #[command(flatten)]
        periods: PeriodArgs,
        #[arg(long, value_enum, default_value_t = FormatArg::Bash)]
        format: FormatArg,
    },
    /// Tune on each training window and validate on the test window.
    Run {
        #[command(flatten)]
        periods: PeriodArgs,
        #[arg(long, default_value_t = 5)]
        loops_per_period: u32,
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Bash,
    Json,
    Csv,
}

impl From<FormatArg> for PeriodFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Bash => PeriodFormat::Bash,
            FormatArg::Json => PeriodFormat::Json,
            FormatArg::Csv => PeriodFormat::Csv,
        }
    }
}

#[derive(Subcommand)]
enum PatchCommand {
    /// Back up `file`, then apply the diff or replacement text in `patch`.
    Apply {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        patch: PathBuf,
    },
    /// Restore `file` from its last backup.
    Rollback {
        #[arg(long)]
        file: PathBuf,
    },
}

fn parse_yyyymmdd(text: &str) -> Result<NaiveDate, String> {
    wfo::parse_date(text).map_err(|e| e.to_string())
}

// ==============================================================================
// Command Logic
// ==============================================================================

/// The real model client and backtester, as configured.
fn components(config: &AppConfig) -> anyhow::Result<(Arc<OpenAiCompatClient>, Arc<FreqtradeRunner>)> {
    let transcript = TranscriptLog::new(&config.paths.llm_transcript)
        .with_payload_log(&config.paths.llm_payload_log);
    let chat = OpenAiCompatClient::new(&config.llm)?.with_transcript(transcript);
    let runner = FreqtradeRunner::from_settings(&config.backtest)
        .with_result_log(&config.paths.backtest_result_log)
        .with_progress(true);
    Ok((Arc::new(chat), Arc::new(runner)))
}

async fn handle_run(mut config: AppConfig, args: &RunArgs) -> anyhow::Result<()> {
    if let Some(path) = &args.config {
        config.backtest.config_path = path.clone();
    }
    if let Some(max_loops) = args.max_loops {
        config.tuning.max_loops = max_loops;
    }
    if let Some(strategy) = &args.strategy {
        config.strategy.name = strategy.clone();
    }
    if let Some(timeframe) = &args.timeframe {
        config.backtest.timeframe = timeframe.clone();
    }
    if let Some(timerange) = &args.timerange {
        config.backtest.timerange = timerange.clone();
    }
    config.backtest.verbosity = config.backtest.verbosity.max(args.verbose);
    config.backtest.export_trades |= args.export_trades;

    let (chat, runner) = components(&config)?;
    let mut ctx = TunerContext::new(config.clone(), chat, runner);
    if config.memory.enabled && !args.disable_memory {
        ctx = ctx.with_memory(memory::open_store(&config.memory)?);
    }
    if let Some(spec) = &args.spec {
        ctx = ctx.with_spec(read_spec(spec)?);
    }

    tracing::info!(
        strategy = %config.strategy.name,
        max_loops = config.tuning.max_loops,
        timerange = %config.backtest.timerange,
        "Starting tuning run"
    );
    let records = SelfLoop::new(ctx).run().await?;

    let rows: Vec<LearningLogRow> = records.iter().map(LearningLogRow::from).collect();
    println!("{}", render_summary_table(&rows.iter().rev().collect::<Vec<_>>()));
    println!("{}", render_stats(&stats(&rows)));
    Ok(())
}

async fn handle_memory(config: Option<&AppConfig>, args: &MemoryArgs) -> anyhow::Result<()> {
    let mut settings = config.map(|c| c.memory.clone()).unwrap_or_default();
    if let Some(backend) = args.backend {
        settings.backend = backend;
    }
    if let Some(path) = &args.path {
        settings.path = path.clone();
    }
    if let Some(url) = &args.url {
        settings.url = url.clone();
    }
    let store = memory::open_store(&settings)?;
    let as_json = |value: &str| {
        serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()))
    };

    match &args.command {
        MemoryCommand::Get { key } => match store.get(key).await? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => println!("null"),
        },
        MemoryCommand::Put { key, value } => {
            store.put(key, as_json(value)).await?;
            println!("ok");
        }
        MemoryCommand::Delete { key } => {
            store.delete(key).await?;
            println!("ok");
        }
        MemoryCommand::Append { key, value } => {
            store.append(key, as_json(value)).await?;
            println!("ok");
        }
        MemoryCommand::Keys => {
            for key in store.keys().await? {
                println!("{}", key);
            }
        }
    }
    Ok(())
}

async fn handle_verify(settings_path: &Path, once: bool) -> anyhow::Result<()> {
    let verifier = Verifier::from_path(settings_path)?;
    if once {
        let snapshot = verifier.verify_once().await?;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        let issues = snapshot.issues(&verifier.settings().thresholds);
        if !issues.is_empty() {
            anyhow::bail!("{} check(s) need attention: {}", issues.len(), issues.join("; "));
        }
        return Ok(());
    }

    tokio::select! {
        _ = verifier.run_continuous(None) => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("Verifier stopped"),
    }
    Ok(())
}

async fn handle_wfo(
    config: impl Fn() -> anyhow::Result<AppConfig>,
    command: &WfoCommand,
) -> anyhow::Result<()> {
    match command {
        WfoCommand::Periods { periods, format } => {
            let generated = generate_periods(
                periods.start,
                periods.end,
                periods.train_months,
                periods.test_months,
                periods.step_months,
            )?;
            print!("{}", render_periods(&generated, (*format).into())?);
        }
        WfoCommand::Run {
            periods,
            loops_per_period,
            output_dir,
        } => {
            let config = config()?;
            let generated = generate_periods(
                periods.start,
                periods.end,
                periods.train_months,
                periods.test_months,
                periods.step_months,
            )?;
            if generated.is_empty() {
                anyhow::bail!("the date range is too short for a single walk-forward period");
            }

            let (chat, runner) = components(&config)?;
            let mut walk = WalkForward::new(config, chat, runner)
                .with_loops_per_period(*loops_per_period)
                .with_progress(true);
            if let Some(dir) = output_dir {
                walk = walk.with_output_dir(dir);
            }
            let results = walk.run(&generated).await?;
            println!("{}", walk_table(&results));
            println!("Results written to {}", walk.output_dir().join("results.json").display());
        }
    }
    Ok(())
}

fn walk_table(results: &[WalkResult]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Period", "Train", "Test", "Best loop", "Train profit %", "Test profit %", "Test trades",
    ]);
    for result in results {
        let (best_loop, train_profit) = match &result.best {
            Some(best) => (best.loop_index.to_string(), best.metrics.profit_percent.to_string()),
            None => ("-".to_string(), "-".to_string()),
        };
        table.add_row(vec![
            result.period.to_string(),
            result.train_range.clone(),
            result.test_range.clone(),
            best_loop,
            train_profit,
            result.test_metrics.profit_percent.to_string(),
            result.test_metrics.trades.to_string(),
        ]);
    }
    table.to_string()
}

fn handle_parse_report(
    config: Option<&AppConfig>,
    path: Option<&Path>,
    trades: Option<&Path>,
) -> anyhow::Result<()> {
    let paths = config.map(|c| c.paths.clone()).unwrap_or_default();
    let report = locate_report(path, &paths.reports_dir)
        .ok_or_else(|| anyhow::anyhow!("no backtest report found in {}", paths.reports_dir.display()))?;
    println!("Report: {}", report.display());
    println!("{}", load_json_report(&report)?);

    if let Some(trades) = trades {
        let summary = summarize_trades_file(trades)?;
        println!(
            "Trades: {} | Wins: {} | Win rate: {}% | Profit: {}",
            summary.trades,
            summary.wins,
            summary.win_rate().round_dp(2),
            summary.profit_abs_sum
        );
    }
    Ok(())
}

fn handle_summary(config: Option<&AppConfig>, args: &SummaryArgs) -> anyhow::Result<()> {
    let default_log = config
        .map(|c| c.paths.learning_log.clone())
        .unwrap_or_else(|| PathSettings::default().learning_log);
    let rows = LearningLogReader::read(args.log.as_deref().unwrap_or(&default_log))?;
    if rows.is_empty() {
        println!("Log is empty.");
        return Ok(());
    }

    let filters = args.filters();
    let shown = select(&rows, args.n, filters.as_ref());
    if filters.is_some() && shown.is_empty() {
        println!("No rows pass the ranking filters.");
    } else {
        println!("{}", render_summary_table(&shown));
    }
    println!("{}", render_stats(&stats(&rows)));
    if let Some(out) = &args.export {
        let written = export_training_jsonl(&rows, out)?;
        println!("Exported {} samples to {}", written, out.display());
    }
    Ok(())
}

/// `spec` itself, or the content of the file it names.
fn read_spec(spec: &str) -> anyhow::Result<String> {
    let path = Path::new(spec);
    if path.is_file() {
        Ok(std::fs::read_to_string(path)?)
    } else {
        Ok(spec.to_string())
    }
}

async fn handle_lab(mut config: AppConfig, args: &LabArgs) -> anyhow::Result<()> {
    config.lab.backtest &= !args.no_backtest;
    let (_, runner) = components(&config)?;
    let transcript = TranscriptLog::new(&config.paths.llm_transcript)
        .with_payload_log(&config.paths.llm_payload_log);
    let chat = OpenAiCompatClient::new(&config.llm)?
        .with_transcript(transcript)
        .with_max_tokens(config.lab.max_tokens);

    let spec = args.spec.as_deref().map(read_spec).transpose()?;
    let result = StrategyLab::new(config, Arc::new(chat), runner)
        .run(spec.as_deref())
        .await?;

    println!(
        "Wrote {} to {}",
        result.strategy.class_name,
        result.strategy.path.display()
    );
    if let Some(backtest) = result.backtest {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_header(vec!["Metric", "Value"]);
        table.add_row(vec!["Backtest succeeded".to_string(), backtest.success.to_string()]);
        table.add_row(vec!["Trades".to_string(), backtest.metrics.trades.to_string()]);
        table.add_row(vec!["Profit %".to_string(), backtest.metrics.profit_percent.to_string()]);
        table.add_row(vec!["Win %".to_string(), backtest.metrics.win_rate.to_string()]);
        table.add_row(vec!["Drawdown".to_string(), backtest.metrics.max_drawdown.to_string()]);
        println!("{table}");
    }
    Ok(())
}

async fn handle_battle(mut config: AppConfig, args: &BattleArgs) -> anyhow::Result<()> {
    if let Some(timerange) = &args.timerange {
        config.backtest.timerange = timerange.clone();
    }
    let strategies = if args.strategies.is_empty() {
        config.battle.strategies.clone()
    } else {
        args.strategies.clone()
    };
    if strategies.is_empty() {
        anyhow::bail!("no strategies to battle");
    }
    let mut filters = config.battle.filters;
    if let Some(min_trades) = args.min_trades {
        filters.min_trades = min_trades;
    }
    if args.max_drawdown.is_some() {
        filters.max_drawdown_pct = args.max_drawdown;
    }

    let (_, runner) = components(&config)?;
    let (path, leaderboard) = run_battle(&config, runner.as_ref(), &strategies, filters).await?;
    println!("{}", render_leaderboard(&leaderboard));
    println!("Leaderboard: {}", path.display());
    Ok(())
}

fn render_leaderboard(leaderboard: &Leaderboard) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Rank", "Strategy", "Success", "Trades", "Profit %", "Drawdown", "Elapsed s",
    ]);
    let ranked = leaderboard.ranked.iter().enumerate().map(|(i, e)| ((i + 1).to_string(), e));
    let unranked = leaderboard.unranked.iter().map(|e| ("-".to_string(), e));
    for (rank, entry) in ranked.chain(unranked) {
        table.add_row(vec![
            rank,
            entry.strategy.clone(),
            entry.success.to_string(),
            entry.metrics.trades.to_string(),
            entry.metrics.profit_percent.to_string(),
            entry.metrics.max_drawdown.to_string(),
            format!("{:.1}", entry.elapsed_secs),
        ]);
    }
    table.to_string()
}

fn handle_patch(config: Option<&AppConfig>, command: &PatchCommand) -> anyhow::Result<()> {
    let paths = config.map(|c| c.paths.clone()).unwrap_or_default();
    let manager = PatchManager::new(&paths.backup_dir, &paths.patch_fail_log);

    match command {
        PatchCommand::Apply { file, patch } => {
            let suggestion = std::fs::read_to_string(patch)?;
            let outcome = manager.apply(file, &suggestion)?;
            println!("{}: {:?}", file.display(), outcome);
        }
        PatchCommand::Rollback { file } => {
            manager.rollback(file)?;
            println!("{}: restored from backup", file.display());
        }
    }
    Ok(())
}
