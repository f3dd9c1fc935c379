use crate::error::AnalyzerError;
use std::path::Path;
use tuner::LearningLogRow;

/// Reads learning logs written by the tuner.
pub struct LearningLogReader;

impl LearningLogReader {
    /// Returns every well-formed row in file order. Malformed rows are skipped with a
    /// warning so one bad line does not hide the rest of the history.
    pub fn read(path: &Path) -> Result<Vec<LearningLogRow>, AnalyzerError> {
        if !path.is_file() {
            return Err(AnalyzerError::NotFound(path.display().to_string()));
        }
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|source| AnalyzerError::Csv {
                path: path.display().to_string(),
                source,
            })?;

        let mut rows = Vec::new();
        let mut skipped = 0usize;
        for result in reader.deserialize::<LearningLogRow>() {
            match result {
                Ok(row) => rows.push(row),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(path = %path.display(), error = %e, "Skipping malformed learning log row");
                }
            }
        }
        tracing::debug!(rows = rows.len(), skipped, "Read learning log");
        Ok(rows)
    }
}
