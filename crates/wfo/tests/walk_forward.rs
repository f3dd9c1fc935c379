use async_trait::async_trait;
use backtester::error::BacktestError;
use backtester::{BacktestOutcome, BacktestRequest, BacktestRunner};
use configuration::load_config_from_str;
use core_types::Metric;
use llm_client::{ChatClient, LlmError};
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wfo::{WalkForward, generate_periods, parse_date};

struct FixedChat;

#[async_trait]
impl ChatClient for FixedChat {
    async fn chat(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
        Ok(r#"{"minimal_roi_0": 0.03, "stoploss": -0.12}"#.to_string())
    }
}

/// Reports a profit equal to the call number and keeps every timerange it was given.
#[derive(Default)]
struct RecordingRunner {
    timeranges: Mutex<Vec<String>>,
}

#[async_trait]
impl BacktestRunner for RecordingRunner {
    async fn run(&self, request: &BacktestRequest) -> Result<BacktestOutcome, BacktestError> {
        let call = {
            let mut ranges = self.timeranges.lock().unwrap();
            ranges.push(request.timerange.clone());
            ranges.len()
        };
        Ok(BacktestOutcome {
            success: true,
            exit_code: Some(0),
            output: format!("│ Total profit % │ {}.5 │\n│ Total/Daily Avg Trades │ 7 / 1 │\n", call),
            timed_out: false,
            duration: Duration::from_millis(1),
        })
    }
}

#[tokio::test]
async fn each_walk_tunes_on_train_and_validates_on_test() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().display();
    let yaml = format!(
        r#"
llm:
  base_url: "http://127.0.0.1:1/v1"
  model: "m"
  api_key: "k"
strategy:
  dir: "{root}/strategies"
backtest:
  download_data: false
tuning:
  retry_delay_secs: 0
  loop_sleep_secs: 0
memory:
  enabled: false
paths:
  reports_dir: "{root}/reports"
"#
    );
    let config = load_config_from_str(&yaml, |_| None).unwrap();
    let periods = generate_periods(
        parse_date("20240101").unwrap(),
        parse_date("20240520").unwrap(),
        2,
        1,
        1,
    )
    .unwrap();
    assert_eq!(periods.len(), 2);

    let runner = Arc::new(RecordingRunner::default());
    let walk = WalkForward::new(config, Arc::new(FixedChat), runner.clone()).with_loops_per_period(2);
    let results = walk.run(&periods).await.unwrap();

    assert_eq!(results.len(), 2);
    let ranges = runner.timeranges.lock().unwrap().clone();
    assert_eq!(
        ranges,
        vec![
            periods[0].train_range(),
            periods[0].train_range(),
            periods[0].test_range(),
            periods[1].train_range(),
            periods[1].train_range(),
            periods[1].test_range(),
        ]
    );

    let first = &results[0];
    assert_eq!(first.iterations, 2);
    assert_eq!(first.best.as_ref().unwrap().loop_index, 2);
    assert!(first.test_success);
    assert_eq!(first.test_metrics.profit_percent, Metric::Parsed(dec!(3.5)));
    assert_eq!(results[1].test_metrics.profit_percent, Metric::Parsed(dec!(6.5)));

    let period_dir = walk.output_dir().join("period_1");
    let log = std::fs::read_to_string(period_dir.join("learning_log.csv")).unwrap();
    assert_eq!(log.lines().count(), 3);
    assert!(period_dir.join("validation_backtest.log").exists());

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(walk.output_dir().join("results.json")).unwrap())
            .unwrap();
    assert_eq!(saved["summary"]["validated_periods"], 2);
    assert_eq!(saved["summary"]["best_period"], 2);
}
