use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyFileError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Pattern for `{field}` not found in {path}")]
    PatternNotFound { field: &'static str, path: String },

    #[error("Could not parse `{field}` in {path}: {reason}")]
    Unparsable {
        field: &'static str,
        path: String,
        reason: String,
    },

    #[error("No backup found for {0}")]
    NoBackup(String),

    #[error("Model reply has no ```python block")]
    NoCodeBlock,

    #[error("Patch could not be applied to {path}: {reason}")]
    PatchRejected { path: String, reason: String },
}

impl StrategyFileError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StrategyFileError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
