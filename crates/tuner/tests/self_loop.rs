use async_trait::async_trait;
use backtester::error::BacktestError;
use backtester::{BacktestOutcome, BacktestRequest, BacktestRunner};
use configuration::{AppConfig, load_config_from_str};
use core_types::{LoopStage, Metric};
use llm_client::{ChatClient, LlmError};
use memory::{JsonFileStore, MemoryStore};
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tuner::{STAGNATION_NOTE, SelfLoop, TunerContext, TunerError};

// --- Test doubles ---

/// Replays canned replies in order, then fails. Every user prompt is kept.
#[derive(Default)]
struct ScriptedChat {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedChat {
    fn new(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    async fn chat(&self, _system: &str, user: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(user.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyResponse))
    }
}

/// Succeeds with a summary table except on the listed call numbers.
struct ScriptedRunner {
    calls: AtomicU32,
    failing: Vec<u32>,
}

impl ScriptedRunner {
    fn failing_on(failing: Vec<u32>) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failing,
        }
    }
}

#[async_trait]
impl BacktestRunner for ScriptedRunner {
    async fn run(&self, request: &BacktestRequest) -> Result<BacktestOutcome, BacktestError> {
        assert_eq!(request.strategy_name, "SimpleAlwaysBuySell");
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.contains(&call) {
            return Ok(BacktestOutcome {
                success: false,
                exit_code: Some(2),
                output: "Impossible to load Strategy".to_string(),
                timed_out: false,
                duration: Duration::from_millis(5),
            });
        }
        Ok(BacktestOutcome {
            success: true,
            exit_code: Some(0),
            output: format!(
                "│ Total/Daily Avg Trades │ {} / 0.5 │\n│ Total profit % │ {}.5 │\n",
                10 + call,
                call
            ),
            timed_out: false,
            duration: Duration::from_millis(5),
        })
    }
}

// --- Helpers ---

fn config(root: &Path, max_loops: u32, window: usize) -> AppConfig {
    let yaml = format!(
        r#"
llm:
  base_url: "http://127.0.0.1:1/v1"
  model: "test-model"
  api_key: "not-needed"
strategy:
  name: SimpleAlwaysBuySell
  dir: "{root}/strategies"
backtest:
  config_path: "{root}/config.json"
  download_data: false
tuning:
  max_loops: {max_loops}
  llm_attempts: 2
  retry_delay_secs: 0
  loop_sleep_secs: 0
memory:
  enabled: true
  backend: file
  path: "{root}/agent_memory.json"
  short_term_window: {window}
paths:
  learning_log: "{root}/learning_log.csv"
  debug_output: "{root}/debug.txt"
  reports_dir: "{root}/reports"
"#,
        root = root.display()
    );
    load_config_from_str(&yaml, |_| None).unwrap()
}

fn valid(roi: &str, stoploss: &str) -> Result<String, LlmError> {
    Ok(format!(r#"{{"minimal_roi_0": {roi}, "stoploss": {stoploss}}}"#))
}

// --- Tests ---

#[tokio::test]
async fn failed_backtests_are_recorded_and_the_loop_continues() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 4, 2);
    let store = Arc::new(JsonFileStore::new(dir.path().join("agent_memory.json")));
    let chat = Arc::new(ScriptedChat::new(vec![
        valid("0.02", "-0.1"),
        valid("0.03", "-0.2"),
        valid("0.04", "-0.05"),
        valid("0.05", "-0.15"),
    ]));
    let ctx = TunerContext::new(config.clone(), chat, Arc::new(ScriptedRunner::failing_on(vec![2])))
        .with_memory(store.clone());

    let mut tuner = SelfLoop::new(ctx);
    let records = tuner.run().await.unwrap();

    assert_eq!(tuner.stage(), LoopStage::Done);
    assert_eq!(records.len(), 4);
    assert_eq!(
        records.iter().map(|r| r.loop_index).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );

    let failed = &records[1];
    assert!(!failed.backtest_success);
    assert!(failed.metrics.is_empty());
    assert_eq!(records.iter().filter(|r| !r.backtest_success).count(), 1);

    assert!(records[0].backtest_success);
    assert_eq!(records[0].metrics.trades, Metric::Parsed(dec!(11)));
    assert_eq!(records[0].metrics.profit_percent, Metric::Parsed(dec!(1.5)));
    assert_eq!(records[3].parameters.minimal_roi_0(), dec!(0.05));

    // One header plus one row per iteration, failed one included.
    let log = std::fs::read_to_string(&config.paths.learning_log).unwrap();
    assert_eq!(log.lines().count(), 5);

    // The strategy holds the last parameters.
    let strategy = std::fs::read_to_string(config.strategy.file_path()).unwrap();
    assert!(strategy.contains("stoploss = -0.15"));

    // Short-term memory is capped at the window; long-term keeps successes only.
    let short = store.get("short_term_memory").await.unwrap().unwrap();
    assert_eq!(short.as_array().unwrap().len(), 2);
    let long = store.get("long_term_memory").await.unwrap().unwrap();
    assert_eq!(long.as_array().unwrap().len(), 3);
    let best = store.get("best_parameters").await.unwrap().unwrap();
    assert_eq!(best["loop_index"], 4);
}

#[tokio::test]
async fn unusable_model_replies_fall_back() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 2, 10);
    let chat = Arc::new(ScriptedChat::new(vec![
        Ok("I think you should lower the stoploss.".to_string()),
        Err(LlmError::EmptyResponse),
        valid("0.5", "-0.9"),
    ]));
    let ctx = TunerContext::new(config, chat.clone(), Arc::new(ScriptedRunner::failing_on(vec![])));

    let records = SelfLoop::new(ctx).run().await.unwrap();

    assert!(records[0].used_fallback);
    assert_eq!(records[0].parameters.minimal_roi_0(), dec!(0.012));
    assert_eq!(records[0].parameters.stoploss, dec!(-0.11));

    // Out-of-range suggestions are clamped, not rejected.
    assert!(!records[1].used_fallback);
    assert_eq!(records[1].parameters.minimal_roi_0(), dec!(0.10));
    assert_eq!(records[1].parameters.stoploss, dec!(-0.30));

    // Two attempts for the first iteration, one for the second.
    assert_eq!(chat.prompts().len(), 3);
}

#[tokio::test]
async fn memory_from_a_previous_run_shapes_the_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn MemoryStore> = Arc::new(JsonFileStore::new(dir.path().join("agent_memory.json")));

    let first = Arc::new(ScriptedChat::new(vec![valid("0.02", "-0.1")]));
    let ctx = TunerContext::new(
        config(dir.path(), 1, 10),
        first.clone(),
        Arc::new(ScriptedRunner::failing_on(vec![])),
    )
    .with_memory(store.clone())
    .with_spec("Give me parameters.");
    SelfLoop::new(ctx).run().await.unwrap();
    assert_eq!(first.prompts(), vec!["Give me parameters.".to_string()]);

    let second = Arc::new(ScriptedChat::new(vec![valid("0.03", "-0.1")]));
    let ctx = TunerContext::new(
        config(dir.path(), 1, 10),
        second.clone(),
        Arc::new(ScriptedRunner::failing_on(vec![])),
    )
    .with_memory(store)
    .with_spec("Give me parameters.");
    SelfLoop::new(ctx).run().await.unwrap();

    let prompt = &second.prompts()[0];
    assert!(prompt.contains("Short-term memory"));
    assert!(prompt.contains("Loop 1: minimal_roi_0=0.020, stoploss=-0.10"));
    assert!(prompt.contains("Best so far: Loop 1:"));
}

#[tokio::test]
async fn a_strategy_without_assignments_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 3, 10);
    std::fs::create_dir_all(&config.strategy.dir).unwrap();
    std::fs::write(config.strategy.file_path(), "class SimpleAlwaysBuySell:\n    pass\n").unwrap();

    let chat = Arc::new(ScriptedChat::new(vec![valid("0.02", "-0.1")]));
    let runner = Arc::new(ScriptedRunner::failing_on(vec![]));
    let ctx = TunerContext::new(config.clone(), chat, runner.clone());

    let err = SelfLoop::new(ctx).run().await.unwrap_err();
    assert!(matches!(err, TunerError::Strategy(_)));
    assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    assert!(!config.paths.learning_log.exists());
}

#[tokio::test]
async fn an_unchanging_model_is_nudged_and_told_so_next_time() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), 3, 10);
    config.tuning.stagnation_after_secs = Some(0);
    let chat = Arc::new(ScriptedChat::new(vec![
        valid("0.02", "-0.1"),
        valid("0.02", "-0.1"),
        valid("0.02", "-0.1"),
    ]));
    let ctx = TunerContext::new(config.clone(), chat.clone(), Arc::new(ScriptedRunner::failing_on(vec![])));

    let records = SelfLoop::new(ctx).run().await.unwrap();

    // The first answer only starts the clock; the repeat crosses the threshold.
    assert_eq!(records[0].parameters.minimal_roi_0(), dec!(0.02));
    assert_eq!(records[0].parameters.stoploss, dec!(-0.1));
    assert_ne!(records[1].parameters, records[0].parameters);
    assert!(config.tuning.bounds.contains(&records[1].parameters));

    let prompts = chat.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(!prompts[0].contains(STAGNATION_NOTE));
    assert!(!prompts[1].contains(STAGNATION_NOTE));
    assert!(prompts[2].ends_with(STAGNATION_NOTE));
}

#[tokio::test]
async fn no_nudge_before_the_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), 3, 10);
    config.tuning.stagnation_after_secs = Some(3600);
    let chat = Arc::new(ScriptedChat::new(vec![
        valid("0.02", "-0.1"),
        valid("0.02", "-0.1"),
        valid("0.02", "-0.1"),
    ]));
    let ctx = TunerContext::new(config, chat.clone(), Arc::new(ScriptedRunner::failing_on(vec![])));

    let records = SelfLoop::new(ctx).run().await.unwrap();

    assert!(records.iter().all(|r| r.parameters == records[0].parameters));
    assert!(chat.prompts().iter().all(|p| !p.contains(STAGNATION_NOTE)));
}
