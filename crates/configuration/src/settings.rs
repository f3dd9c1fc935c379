use crate::logging::LoggingConfig;
use core_types::{ParameterBounds, RankFilters, ResourceThresholds, StrategyParameters};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub llm: LlmSettings,
    #[serde(default)]
    pub strategy: StrategySettings,
    #[serde(default)]
    pub backtest: BacktestSettings,
    #[serde(default)]
    pub tuning: TuningSettings,
    #[serde(default)]
    pub memory: MemorySettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub verifier: VerifierSettings,
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub lab: LabSettings,
    #[serde(default)]
    pub battle: BattleSettings,
}

/// Connection and sampling parameters for the chat-completion endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    /// Base URL of an OpenAI-compatible API, e.g. `http://127.0.0.1:1234/v1`.
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-request timeout. A hung endpoint blocks the loop for at most this long.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

/// The strategy file the loop rewrites.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategySettings {
    /// Class name, also used as the file stem.
    pub name: String,
    pub dir: PathBuf,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            name: "SimpleAlwaysBuySell".to_string(),
            dir: PathBuf::from("user_data/strategies"),
        }
    }
}

impl StrategySettings {
    pub fn file_path(&self) -> PathBuf {
        self.dir.join(format!("{}.py", self.name))
    }
}

/// How the external backtesting executable is invoked.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BacktestSettings {
    /// Path to the freqtrade JSON config passed with `-c`.
    pub config_path: PathBuf,
    pub timeframe: String,
    pub timerange: String,
    /// Explicit executable. When unset, `.venv/bin/freqtrade` is preferred over `freqtrade`.
    pub executable: Option<PathBuf>,
    /// Number of `-v` flags passed through.
    pub verbosity: u8,
    pub export_trades: bool,
    /// Run `download-data` once before the first iteration.
    pub download_data: bool,
    /// Kill the backtest after this many seconds. Unset means wait indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("user_data/config.json"),
            timeframe: "1h".to_string(),
            timerange: "20250101-".to_string(),
            executable: None,
            verbosity: 0,
            export_trades: false,
            download_data: true,
            timeout_secs: None,
        }
    }
}

/// Knobs of the tuning loop itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TuningSettings {
    pub max_loops: u32,
    pub bounds: ParameterBounds,
    pub fallback: FallbackParameters,
    /// Model calls per iteration before the fallback pair is used.
    pub llm_attempts: u32,
    pub retry_delay_secs: u64,
    pub loop_sleep_secs: u64,
    /// Number of short-term memory entries quoted in the prompt.
    pub prompt_window: usize,
    /// Perturb the parameters when they have not changed for this long.
    pub stagnation_after_secs: Option<u64>,
    /// Log a progress line at this interval from a background task.
    pub heartbeat_secs: Option<u64>,
}

impl Default for TuningSettings {
    fn default() -> Self {
        Self {
            max_loops: 10,
            bounds: ParameterBounds::default(),
            fallback: FallbackParameters::default(),
            llm_attempts: 3,
            retry_delay_secs: 2,
            loop_sleep_secs: 1,
            prompt_window: 3,
            stagnation_after_secs: None,
            heartbeat_secs: None,
        }
    }
}

/// The pair used whenever the model fails to produce a usable suggestion.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FallbackParameters {
    pub minimal_roi_0: Decimal,
    pub stoploss: Decimal,
}

impl Default for FallbackParameters {
    fn default() -> Self {
        Self {
            minimal_roi_0: dec!(0.012),
            stoploss: dec!(-0.11),
        }
    }
}

impl FallbackParameters {
    pub fn to_params(&self) -> StrategyParameters {
        StrategyParameters::new(self.minimal_roi_0, self.stoploss)
    }
}

/// Which `MemoryStore` backend the loop persists to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum MemoryBackend {
    File,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    pub enabled: bool,
    pub backend: MemoryBackend,
    pub path: PathBuf,
    pub url: String,
    /// Per-request timeout of the `http` backend.
    pub timeout_secs: u64,
    pub short_term_window: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: MemoryBackend::File,
            path: PathBuf::from("user_data/agent_memory.json"),
            url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 10,
            short_term_window: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifierSettings {
    pub interval_secs: u64,
    pub error_backoff_secs: u64,
    pub request_timeout_secs: u64,
    pub state_path: PathBuf,
    /// Environment variables that must be set for the config check to pass.
    pub required_env: Vec<String>,
    pub thresholds: ResourceThresholds,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            error_backoff_secs: 60,
            request_timeout_secs: 10,
            state_path: PathBuf::from("user_data/verification_state.json"),
            required_env: Vec::new(),
            thresholds: ResourceThresholds::default(),
        }
    }
}

/// Files the loop reads and writes besides the strategy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub learning_log: PathBuf,
    pub backtest_result_log: PathBuf,
    pub debug_output: PathBuf,
    pub llm_transcript: PathBuf,
    pub llm_payload_log: PathBuf,
    pub reports_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub patch_fail_log: PathBuf,
    /// Battle runs write `battle-<timestamp>/leaderboard.json` here.
    pub runs_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            learning_log: PathBuf::from("user_data/learning_log.csv"),
            backtest_result_log: PathBuf::from("user_data/backtest_result.log"),
            debug_output: PathBuf::from("user_data/backtest_debug_output.txt"),
            llm_transcript: PathBuf::from("user_data/llm_client.log"),
            llm_payload_log: PathBuf::from("user_data/llm_payload.log"),
            reports_dir: PathBuf::from("user_data/backtest_results"),
            backup_dir: PathBuf::from(".agent_backups"),
            patch_fail_log: PathBuf::from("last_patch_fail.log"),
            runs_dir: PathBuf::from("runs"),
        }
    }
}

/// Prompts for writing a whole new strategy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LabSettings {
    pub system_prompt: String,
    /// Used when no request is given on the command line.
    pub user_prompt: String,
    /// Code needs far more room than a parameter pair.
    pub max_tokens: u32,
    /// Backtest the new strategy right after writing it.
    pub backtest: bool,
}

impl Default for LabSettings {
    fn default() -> Self {
        Self {
            system_prompt: "You write Freqtrade strategies. Reply with one complete Python module \
                            in a single ```python fenced block. The strategy class must subclass \
                            IStrategy and define minimal_roi, stoploss, timeframe, \
                            populate_indicators, populate_entry_trend and populate_exit_trend."
                .to_string(),
            user_prompt: "Write a simple trend-following strategy for the 5m timeframe using an \
                          SMA crossover confirmed by RSI."
                .to_string(),
            max_tokens: 2048,
            backtest: true,
        }
    }
}

/// Strategies backtested against each other by `battle`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BattleSettings {
    /// Used when none are given on the command line.
    pub strategies: Vec<String>,
    pub filters: RankFilters,
}

impl Default for BattleSettings {
    fn default() -> Self {
        Self {
            strategies: vec!["SmaRsi_v2".to_string(), "BreakoutATR_v1".to_string()],
            filters: RankFilters::default(),
        }
    }
}

fn default_temperature() -> f64 {
    0.4
}

fn default_top_p() -> f64 {
    0.95
}

fn default_max_tokens() -> u32 {
    128
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_system_prompt() -> String {
    "You are a trading strategy optimizer. Reply with a single JSON object of the form \
     {\"minimal_roi_0\": <float>, \"stoploss\": <float>} and nothing else."
        .to_string()
}
