use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("No learning log found at {0}")]
    NotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed learning log {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
