use crate::error::StrategyFileError;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Class name used when the code declares no `IStrategy` subclass.
pub const DEFAULT_CLASS_NAME: &str = "GeneratedStrategy";

static PYTHON_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```python\s*(.*?)```").expect("python block regex"));

static STRATEGY_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"class\s+([A-Za-z0-9_]+)\s*\(\s*IStrategy\s*\)\s*:").expect("strategy class regex")
});

/// The first fenced `python` block of a model reply, trimmed. Blank blocks count as
/// missing.
pub fn extract_python_block(reply: &str) -> Option<&str> {
    PYTHON_BLOCK
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|code| code.as_str().trim())
        .filter(|code| !code.is_empty())
}

/// The first class deriving from `IStrategy`, or [`DEFAULT_CLASS_NAME`].
pub fn strategy_class_name(code: &str) -> &str {
    STRATEGY_CLASS
        .captures(code)
        .and_then(|caps| caps.get(1))
        .map_or(DEFAULT_CLASS_NAME, |name| name.as_str())
}

/// A strategy written from model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedStrategy {
    /// What freqtrade loads it by.
    pub class_name: String,
    pub path: PathBuf,
}

/// Writes `code` to `<dir>/<Class>_<unix seconds>.py`, creating `dir` as needed.
pub fn write_generated(
    code: &str,
    dir: &Path,
    at: DateTime<Utc>,
) -> Result<GeneratedStrategy, StrategyFileError> {
    let class_name = strategy_class_name(code).to_string();
    fs::create_dir_all(dir).map_err(|e| StrategyFileError::io(dir, e))?;
    let path = dir.join(format!("{}_{}.py", class_name, at.timestamp()));
    let mut text = code.to_string();
    if !text.ends_with('\n') {
        text.push('\n');
    }
    fs::write(&path, text).map_err(|e| StrategyFileError::io(&path, e))?;
    tracing::info!(class = %class_name, path = %path.display(), "Wrote generated strategy");
    Ok(GeneratedStrategy { class_name, path })
}

/// Pulls the code out of `reply` and writes it with [`write_generated`].
pub fn save_from_reply(
    reply: &str,
    dir: &Path,
    at: DateTime<Utc>,
) -> Result<GeneratedStrategy, StrategyFileError> {
    let code = extract_python_block(reply).ok_or(StrategyFileError::NoCodeBlock)?;
    write_generated(code, dir, at)
}
