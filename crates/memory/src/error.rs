use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Failed to access memory file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("An error occurred during JSON serialization/deserialization: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Memory server request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Memory server rejected the request ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error("Operation '{0}' is not supported by this backend")]
    Unsupported(&'static str),
}
