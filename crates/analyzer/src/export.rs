use crate::error::AnalyzerError;
use serde_json::json;
use std::io::Write;
use std::path::Path;
use tuner::LearningLogRow;

/// Writes successful rows as prompt/response JSON lines for fine-tuning a model.
///
/// The prompt restates the outcome, the response is the parameter pair that produced
/// it. Returns the number of lines written.
pub fn export_training_jsonl(rows: &[LearningLogRow], out: &Path) -> Result<usize, AnalyzerError> {
    let io = |source| AnalyzerError::Io {
        path: out.display().to_string(),
        source,
    };
    if let Some(dir) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(io)?;
    }
    let mut file = std::io::BufWriter::new(std::fs::File::create(out).map_err(io)?);

    let mut written = 0;
    for row in rows.iter().filter(|row| row.backtest_success) {
        let prompt = format!(
            "Learning log: loop {} trades={} profit%={} win_rate={} max_drawdown={}",
            row.loop_index, row.trades, row.profit_percent, row.win_rate, row.max_drawdown
        );
        let response = json!({
            "minimal_roi_0": row.minimal_roi_0,
            "stoploss": row.stoploss,
        });
        let line = json!({ "prompt": prompt, "response": response.to_string() });
        serde_json::to_writer(&mut file, &line)?;
        file.write_all(b"\n").map_err(io)?;
        written += 1;
    }
    file.flush().map_err(io)?;

    tracing::info!(path = %out.display(), lines = written, "Exported training samples");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::fixtures::row;
    use rust_decimal_macros::dec;

    #[test]
    fn only_successful_rows_are_exported() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("export/train.jsonl");
        let rows = vec![
            row(1, true, Some(dec!(1.5)), Some(dec!(4))),
            row(2, false, None, None),
        ];

        assert_eq!(export_training_jsonl(&rows, &out).unwrap(), 1);
        let text = std::fs::read_to_string(&out).unwrap();
        let line: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert!(line["prompt"].as_str().unwrap().contains("profit%=1.5"));
        let response: serde_json::Value =
            serde_json::from_str(line["response"].as_str().unwrap()).unwrap();
        assert_eq!(response["stoploss"], "-0.10");
    }
}
