use crate::baseline::baseline_strategy;
use crate::error::StrategyFileError;
use core_types::{RoiTable, StrategyParameters, parse_decimal};
use regex::{Captures, Regex};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

// Both patterns allow an optional type annotation (`stoploss: float = -0.1`), and the
// word boundary keeps `custom_stoploss` / `stoploss_on_exchange` out.
static ROI_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<head>\bminimal_roi(?:[ \t]*:[^=\n]+?)?\s*=\s*)\{(?P<body>[^}]*)\}")
        .expect("minimal_roi regex")
});

static STOPLOSS_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<head>\bstoploss(?:[ \t]*:[^=\n]+?)?[ \t]*=[ \t]*)(?P<value>-?\d+(?:\.\d+)?)")
        .expect("stoploss regex")
});

static ROI_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["'](?P<minutes>\d+)["']\s*:\s*(?P<target>-?\d+(?:\.\d+)?)"#)
        .expect("roi entry regex")
});

/// A strategy source file whose `minimal_roi` and `stoploss` assignments are
/// rewritten in place.
///
/// Only the first match of each assignment is touched; every other byte of the file
/// is preserved. Values are written as given, so the caller clamps them first.
#[derive(Debug, Clone)]
pub struct StrategyFile {
    path: PathBuf,
    class_name: String,
}

impl StrategyFile {
    pub fn new(path: impl Into<PathBuf>, class_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            class_name: class_name.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Writes the baseline strategy if the file does not exist yet.
    ///
    /// Also drops an empty `__init__.py` next to it so the directory is importable.
    /// Returns `true` when the baseline was written.
    pub fn ensure_exists(&self, timeframe: &str) -> Result<bool, StrategyFileError> {
        if self.path.exists() {
            return Ok(false);
        }
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| StrategyFileError::io(dir, e))?;
            let init = dir.join("__init__.py");
            if !init.exists() {
                fs::write(&init, "").map_err(|e| StrategyFileError::io(&init, e))?;
            }
        }
        fs::write(&self.path, baseline_strategy(&self.class_name, timeframe))
            .map_err(|e| StrategyFileError::io(&self.path, e))?;
        tracing::info!(path = %self.path.display(), "Wrote baseline strategy");
        Ok(true)
    }

    /// Rewrites both assignments and returns the parameters as they now read back.
    ///
    /// Fails without touching the file if either assignment is missing.
    pub fn mutate(&self, params: &StrategyParameters) -> Result<StrategyParameters, StrategyFileError> {
        let source = self.read()?;
        let updated = rewrite_source(&source, params, &self.path)?;
        fs::write(&self.path, &updated).map_err(|e| StrategyFileError::io(&self.path, e))?;

        let written = parse_source(&updated, &self.path)?;
        tracing::info!(path = %self.path.display(), params = %written, "Mutated strategy");
        Ok(written)
    }

    /// Reads the current parameters using the same patterns `mutate` writes with.
    pub fn read_parameters(&self) -> Result<StrategyParameters, StrategyFileError> {
        let source = self.read()?;
        parse_source(&source, &self.path)
    }

    fn read(&self) -> Result<String, StrategyFileError> {
        fs::read_to_string(&self.path).map_err(|e| StrategyFileError::io(&self.path, e))
    }
}

/// Pure text transformation behind [`StrategyFile::mutate`].
pub fn rewrite_source(
    source: &str,
    params: &StrategyParameters,
    path: &Path,
) -> Result<String, StrategyFileError> {
    let not_found = |field| StrategyFileError::PatternNotFound {
        field,
        path: path.display().to_string(),
    };
    if !ROI_ASSIGNMENT.is_match(source) {
        return Err(not_found("minimal_roi"));
    }
    if !STOPLOSS_ASSIGNMENT.is_match(source) {
        return Err(not_found("stoploss"));
    }

    let roi_literal = params.minimal_roi.to_source_literal();
    let with_roi = ROI_ASSIGNMENT.replacen(source, 1, |caps: &Captures| {
        format!("{}{}", &caps["head"], roi_literal)
    });

    let stoploss_literal = format!("{:.2}", params.stoploss.round_dp(2));
    let with_stoploss = STOPLOSS_ASSIGNMENT.replacen(&with_roi, 1, |caps: &Captures| {
        format!("{}{}", &caps["head"], stoploss_literal)
    });

    Ok(with_stoploss.into_owned())
}

/// Pure parse behind [`StrategyFile::read_parameters`].
pub fn parse_source(source: &str, path: &Path) -> Result<StrategyParameters, StrategyFileError> {
    let path_str = || path.display().to_string();

    let roi_caps = ROI_ASSIGNMENT
        .captures(source)
        .ok_or_else(|| StrategyFileError::PatternNotFound {
            field: "minimal_roi",
            path: path_str(),
        })?;
    let mut minimal_roi = RoiTable::default();
    for entry in ROI_ENTRY.captures_iter(&roi_caps["body"]) {
        let minutes: u32 = entry["minutes"]
            .parse()
            .map_err(|e: std::num::ParseIntError| StrategyFileError::Unparsable {
                field: "minimal_roi",
                path: path_str(),
                reason: e.to_string(),
            })?;
        let target = parse_decimal(&entry["target"]).ok_or_else(|| StrategyFileError::Unparsable {
            field: "minimal_roi",
            path: path_str(),
            reason: format!("bad target {:?}", &entry["target"]),
        })?;
        minimal_roi.insert(minutes, target);
    }
    if minimal_roi.is_empty() {
        return Err(StrategyFileError::Unparsable {
            field: "minimal_roi",
            path: path_str(),
            reason: "no entries".to_string(),
        });
    }

    let stop_caps = STOPLOSS_ASSIGNMENT
        .captures(source)
        .ok_or_else(|| StrategyFileError::PatternNotFound {
            field: "stoploss",
            path: path_str(),
        })?;
    let stoploss = parse_decimal(&stop_caps["value"]).ok_or_else(|| StrategyFileError::Unparsable {
        field: "stoploss",
        path: path_str(),
        reason: format!("bad value {:?}", &stop_caps["value"]),
    })?;

    Ok(StrategyParameters {
        minimal_roi,
        stoploss,
    })
}
