use crate::error::MemoryError;
use crate::store::{MemoryStore, appended};
use async_trait::async_trait;
use configuration::MemorySettings;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

#[derive(Deserialize)]
struct GetResponse {
    #[serde(default)]
    value: Option<Value>,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(default)]
    reason: Option<String>,
}

/// Talks to a memory server over `/put`, `/get` and `/delete`.
///
/// The server has no list endpoint, so `keys` is unsupported, and `append` is a
/// `get` followed by a `put` with no atomicity between them.
#[derive(Debug, Clone)]
pub struct HttpMemoryStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMemoryStore {
    /// Every request gives up after `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, MemoryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &MemorySettings) -> Result<Self, MemoryError> {
        Self::new(&settings.url, Duration::from_secs(settings.timeout_secs))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<(), MemoryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let reason = response
            .json::<StatusResponse>()
            .await
            .ok()
            .and_then(|body| body.reason)
            .unwrap_or_else(|| status.to_string());
        Err(MemoryError::Rejected {
            status: status.as_u16(),
            reason,
        })
    }
}

#[async_trait]
impl MemoryStore for HttpMemoryStore {
    async fn put(&self, key: &str, value: Value) -> Result<(), MemoryError> {
        let response = self
            .client
            .post(self.url("put"))
            .json(&json!({ "key": key, "value": value }))
            .send()
            .await?;
        Self::check(response).await?;
        tracing::debug!(key, "PUT");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, MemoryError> {
        let response = self
            .client
            .get(self.url("get"))
            .query(&[("key", key)])
            .send()
            .await?
            .error_for_status()?;
        let body: GetResponse = response.json().await?;
        Ok(body.value.filter(|v| !v.is_null()))
    }

    async fn delete(&self, key: &str) -> Result<(), MemoryError> {
        let response = self
            .client
            .post(self.url("delete"))
            .json(&json!({ "key": key }))
            .send()
            .await?;
        match Self::check(response).await {
            // Unknown keys are fine, as with the file store.
            Err(MemoryError::Rejected { status: 404, .. }) => Ok(()),
            other => other,
        }
    }

    async fn append(&self, key: &str, value: Value) -> Result<(), MemoryError> {
        let existing = self.get(key).await?;
        self.put(key, appended(existing, value)).await
    }

    async fn keys(&self) -> Result<Vec<String>, MemoryError> {
        Err(MemoryError::Unsupported("keys"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalised() {
        let store = HttpMemoryStore::new("http://127.0.0.1:8080/", Duration::from_secs(10)).unwrap();
        assert_eq!(store.url("get"), "http://127.0.0.1:8080/get");
    }

    #[tokio::test]
    async fn keys_is_unsupported() {
        let store = HttpMemoryStore::new("http://127.0.0.1:9", Duration::from_secs(10)).unwrap();
        assert!(matches!(
            store.keys().await,
            Err(MemoryError::Unsupported("keys"))
        ));
    }

    #[tokio::test]
    async fn a_silent_server_times_out_after_the_configured_limit() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accepts connections and never answers.
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let settings = MemorySettings {
            url: format!("http://{}", addr),
            timeout_secs: 1,
            ..MemorySettings::default()
        };
        let store = HttpMemoryStore::from_settings(&settings).unwrap();
        let started = std::time::Instant::now();
        match store.get("k").await {
            Err(MemoryError::Http(e)) => assert!(e.is_timeout(), "{e}"),
            other => panic!("expected a timeout, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
        server.abort();
    }

    #[tokio::test]
    async fn unreachable_server_is_an_http_error() {
        let store = HttpMemoryStore::new("http://127.0.0.1:9", Duration::from_secs(10)).unwrap();
        assert!(matches!(store.get("k").await, Err(MemoryError::Http(_))));
    }
}
