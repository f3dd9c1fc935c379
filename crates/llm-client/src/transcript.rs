use crate::responses::ChatRequest;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Flat-file record of every exchange with the model.
///
/// Two files: the transcript (one human-readable block per call) and the payload log
/// (one JSON line per request body). Write failures are logged and swallowed so a full
/// disk never stops a tuning run.
#[derive(Debug, Clone)]
pub struct TranscriptLog {
    transcript_path: PathBuf,
    payload_path: Option<PathBuf>,
}

impl TranscriptLog {
    pub fn new(transcript_path: impl Into<PathBuf>) -> Self {
        Self {
            transcript_path: transcript_path.into(),
            payload_path: None,
        }
    }

    pub fn with_payload_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.payload_path = Some(path.into());
        self
    }

    pub fn transcript_path(&self) -> &Path {
        &self.transcript_path
    }

    pub async fn record_payload(&self, request: &ChatRequest) {
        let Some(path) = &self.payload_path else {
            return;
        };
        match serde_json::to_string(request) {
            Ok(line) => append(path, &format!("{}\n", line)).await,
            Err(e) => tracing::warn!(error = %e, "Failed to serialise chat payload"),
        }
    }

    /// Appends one `---` delimited block. `response` is the reply text or the error.
    pub async fn record_exchange(&self, system: &str, user: &str, response: Result<&str, &str>) {
        let response = match response {
            Ok(text) => text.to_string(),
            Err(error) => format!("[ERROR] {}", error),
        };
        let block = format!(
            "---\nTIMESTAMP: {}\nSYSTEM: {}\nUSER: {}\nRESPONSE: {}\n",
            Utc::now().to_rfc3339(),
            system,
            user,
            response
        );
        append(&self.transcript_path, &block).await;
    }
}

async fn append(path: &Path, text: &str) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent).await {
                tracing::warn!(path = %path.display(), error = %e, "Failed to create log directory");
                return;
            }
        }
    }
    let result = async {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await
    }
    .await;
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "Failed to append to LLM log");
    }
}
