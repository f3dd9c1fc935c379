use crate::error::BacktestError;
use crate::summary::extract_summary;
use crate::{BacktestOutcome, BacktestRequest, BacktestRunner};
use async_trait::async_trait;
use configuration::BacktestSettings;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Runs backtests by shelling out to `freqtrade backtesting`.
#[derive(Debug, Clone)]
pub struct FreqtradeRunner {
    executable: PathBuf,
    timeout: Option<Duration>,
    result_log: Option<PathBuf>,
    show_progress: bool,
}

impl FreqtradeRunner {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            timeout: None,
            result_log: None,
            show_progress: false,
        }
    }

    /// Prefers a project-local virtualenv install, then whatever is on `PATH`.
    pub fn detect() -> Self {
        let venv = Path::new(".venv/bin/freqtrade");
        if venv.exists() {
            Self::new(venv)
        } else {
            Self::new("freqtrade")
        }
    }

    pub fn from_settings(settings: &BacktestSettings) -> Self {
        let runner = match &settings.executable {
            Some(executable) => Self::new(executable),
            None => Self::detect(),
        };
        runner.with_timeout(settings.timeout_secs.map(Duration::from_secs))
    }

    /// Kills the backtest after `timeout`. `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Writes the summary table of every run to `path`, replacing the previous one.
    pub fn with_result_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.result_log = Some(path.into());
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// The argument list for one backtest, without the executable.
    pub fn backtest_args(request: &BacktestRequest) -> Vec<String> {
        let mut args = vec![
            "backtesting".to_string(),
            "-c".to_string(),
            request.config_path.display().to_string(),
            "--strategy".to_string(),
            request.strategy_name.clone(),
            "--strategy-path".to_string(),
            request.strategy_dir.display().to_string(),
            "--timeframe".to_string(),
            request.timeframe.clone(),
            "--timerange".to_string(),
            request.timerange.clone(),
            "--cache".to_string(),
            "none".to_string(),
        ];
        if request.export_trades {
            args.push("--export".to_string());
            args.push("trades".to_string());
            if let Some(filename) = &request.export_filename {
                args.push("--export-filename".to_string());
                args.push(filename.display().to_string());
            }
        }
        args.extend(verbosity_flags(request.verbosity));
        args
    }

    /// Fetches candles for `timeframe`. Best effort: failures are logged, never raised.
    pub async fn download_data(
        &self,
        config_path: &Path,
        timeframe: &str,
        timerange: Option<&str>,
        verbosity: u8,
    ) -> bool {
        let mut args = vec![
            "download-data".to_string(),
            "-c".to_string(),
            config_path.display().to_string(),
            "-t".to_string(),
            timeframe.to_string(),
        ];
        if let Some(range) = timerange {
            args.push("--timerange".to_string());
            args.push(range.to_string());
        }
        args.extend(verbosity_flags(verbosity));

        tracing::info!(executable = %self.executable.display(), ?args, "Downloading data");
        match self.execute(&args).await {
            Ok(outcome) if outcome.success => true,
            Ok(outcome) => {
                tracing::warn!(exit_code = ?outcome.exit_code, "download-data failed; continuing");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "download-data could not run; continuing");
                false
            }
        }
    }

    async fn execute(&self, args: &[String]) -> Result<BacktestOutcome, BacktestError> {
        let started = Instant::now();
        let child = Command::new(&self.executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BacktestError::Spawn {
                command: format!("{} {}", self.executable.display(), args.join(" ")),
                source,
            })?;

        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output()).await,
            None => Ok(child.wait_with_output().await),
        };

        let outcome = match waited {
            Ok(output) => {
                let output = output?;
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                BacktestOutcome {
                    success: output.status.success(),
                    exit_code: output.status.code(),
                    output: text,
                    timed_out: false,
                    duration: started.elapsed(),
                }
            }
            // Dropping the wait future drops the child, and `kill_on_drop` kills it.
            Err(_) => BacktestOutcome {
                success: false,
                exit_code: None,
                output: format!(
                    "backtest killed after exceeding the {}s timeout",
                    self.timeout.map(|t| t.as_secs()).unwrap_or_default()
                ),
                timed_out: true,
                duration: started.elapsed(),
            },
        };
        Ok(outcome)
    }

    fn spinner(&self, request: &BacktestRequest) -> Result<Option<ProgressBar>, BacktestError> {
        if !self.show_progress {
            return Ok(None);
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
        spinner.set_message(format!(
            "Backtesting {} on {} ({})",
            request.strategy_name, request.timeframe, request.timerange
        ));
        spinner.enable_steady_tick(Duration::from_millis(120));
        Ok(Some(spinner))
    }

    async fn write_result_log(&self, output: &str) {
        let Some(path) = &self.result_log else {
            return;
        };
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to create the result log directory");
            }
        }
        let summary = extract_summary(output);
        if let Err(e) = tokio::fs::write(path, format!("{}\n", summary)).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write backtest result log");
        }
    }
}

#[async_trait]
impl BacktestRunner for FreqtradeRunner {
    async fn prepare(&self, request: &BacktestRequest) -> bool {
        self.download_data(&request.config_path, &request.timeframe, None, request.verbosity)
            .await
    }

    async fn run(&self, request: &BacktestRequest) -> Result<BacktestOutcome, BacktestError> {
        let args = Self::backtest_args(request);
        tracing::info!(executable = %self.executable.display(), ?args, "Starting backtest");

        let spinner = self.spinner(request)?;
        let outcome = settle(spinner.as_ref(), self.execute(&args).await)?;

        self.write_result_log(&outcome.output).await;

        if outcome.success {
            tracing::info!(duration_ms = outcome.duration.as_millis() as u64, "Backtest finished");
        } else {
            tracing::warn!(
                exit_code = ?outcome.exit_code,
                timed_out = outcome.timed_out,
                "Backtest failed"
            );
        }
        Ok(outcome)
    }
}

/// Stops the spinner whatever the result, then maps a launch failure to a failed outcome.
fn settle(
    spinner: Option<&ProgressBar>,
    executed: Result<BacktestOutcome, BacktestError>,
) -> Result<BacktestOutcome, BacktestError> {
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    match executed {
        Ok(outcome) => Ok(outcome),
        // A missing executable is a failed run for this iteration, not a reason to stop.
        Err(BacktestError::Spawn { command, source }) => Ok(BacktestOutcome {
            success: false,
            exit_code: None,
            output: format!("failed to launch `{}`: {}", command, source),
            timed_out: false,
            duration: Duration::ZERO,
        }),
        Err(e) => Err(e),
    }
}

fn verbosity_flags(verbosity: u8) -> impl Iterator<Item = String> {
    (0..verbosity.min(3)).map(|_| "-v".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BacktestRequest {
        BacktestRequest {
            config_path: PathBuf::from("user_data/config.json"),
            strategy_name: "SimpleAlwaysBuySell".to_string(),
            strategy_dir: PathBuf::from("user_data/strategies"),
            timeframe: "1h".to_string(),
            timerange: "20250101-".to_string(),
            export_trades: false,
            export_filename: None,
            verbosity: 0,
        }
    }

    #[test]
    fn builds_the_fixed_argument_list() {
        assert_eq!(
            FreqtradeRunner::backtest_args(&request()),
            vec![
                "backtesting",
                "-c",
                "user_data/config.json",
                "--strategy",
                "SimpleAlwaysBuySell",
                "--strategy-path",
                "user_data/strategies",
                "--timeframe",
                "1h",
                "--timerange",
                "20250101-",
                "--cache",
                "none",
            ]
        );
    }

    #[test]
    fn export_and_verbosity_flags_are_appended() {
        let mut req = request();
        req.export_trades = true;
        req.export_filename = Some(PathBuf::from("user_data/backtest_results/trades_loop_3.json"));
        req.verbosity = 5;
        let args = FreqtradeRunner::backtest_args(&req);
        let tail: Vec<&str> = args[13..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "--export",
                "trades",
                "--export-filename",
                "user_data/backtest_results/trades_loop_3.json",
                "-v",
                "-v",
                "-v",
            ]
        );
    }

    #[cfg(unix)]
    fn fake_executable(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("freqtrade");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_output_and_writes_result_log() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_executable(
            dir.path(),
            "echo 'STRATEGY SUMMARY'\necho '│ Total profit % │ 1.23 │'\necho '└───┘'\necho 'warn' >&2",
        );
        let log = dir.path().join("backtest_result.log");
        let runner = FreqtradeRunner::new(&exe).with_result_log(&log);

        let outcome = runner.run(&request()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.output.contains("Total profit %"));
        assert!(outcome.output.contains("warn"));

        let logged = std::fs::read_to_string(&log).unwrap();
        assert!(logged.starts_with("STRATEGY SUMMARY"));
        assert!(logged.contains("└───┘"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_failed_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_executable(dir.path(), "echo 'boom'\nexit 2");
        let outcome = FreqtradeRunner::new(&exe).run(&request()).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(2));
        assert!(!outcome.timed_out);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_a_hung_backtest() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_executable(dir.path(), "sleep 30");
        let runner = FreqtradeRunner::new(&exe).with_timeout(Some(Duration::from_millis(200)));

        let outcome = runner.run(&request()).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.timed_out);
        assert!(outcome.duration < Duration::from_secs(10));
    }

    #[test]
    fn spinner_stops_when_collecting_output_fails() {
        let spinner = ProgressBar::hidden();
        let broken = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let result = settle(Some(&spinner), Err(BacktestError::Io(broken)));
        assert!(matches!(result, Err(BacktestError::Io(_))));
        assert!(spinner.is_finished());
    }

    #[test]
    fn spinner_stops_on_launch_failure_too() {
        let spinner = ProgressBar::hidden();
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let outcome = settle(
            Some(&spinner),
            Err(BacktestError::Spawn {
                command: "freqtrade backtesting".to_string(),
                source: missing,
            }),
        )
        .unwrap();
        assert!(!outcome.success);
        assert!(outcome.output.starts_with("failed to launch `freqtrade backtesting`"));
        assert!(spinner.is_finished());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn an_unwritable_result_log_does_not_fail_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let exe = fake_executable(dir.path(), "echo 'done'");
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "x").unwrap();
        let runner = FreqtradeRunner::new(&exe).with_result_log(blocker.join("result.log"));

        let outcome = runner.run(&request()).await.unwrap();
        assert!(outcome.success);
        assert!(!blocker.join("result.log").exists());
    }

    #[tokio::test]
    async fn missing_executable_is_a_failed_outcome() {
        let runner = FreqtradeRunner::new("/definitely/not/here/freqtrade");
        let outcome = runner.run(&request()).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.output.contains("failed to launch"));
        assert!(!runner.download_data(Path::new("c.json"), "1h", None, 0).await);
    }
}
