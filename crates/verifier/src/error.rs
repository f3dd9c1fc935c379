use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerifierError {
    #[error("Failed to build the HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to write state file {path}: {source}")]
    StateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize snapshot: {0}")]
    Json(#[from] serde_json::Error),
}
