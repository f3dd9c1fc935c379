//! # Verifier
//!
//! Periodic health checks for the tuning setup: is the model endpoint up, is the settings
//! file usable, is there memory and disk to spare, does the model answer.
//!
//! ## Architectural Principles
//!
//! - **Report, don't repair:** a cycle produces a `VerificationSnapshot` and logs what
//!   needs attention. It never restarts services or rewrites files other than its own
//!   state file.
//! - **Latest only:** the state file is overwritten on every cycle.
//!
//! ## Public API
//!
//! - `Verifier`: `cycle`, `verify_once` and `run_continuous`.
//! - `resources`: memory, disk and CPU readings.
//! - `VerifierError`: The specific error types that can be returned from this crate.

pub mod error;
pub mod resources;

pub use error::VerifierError;

use configuration::env::process_env;
use configuration::{
    AppConfig, LlmSettings, VerifierSettings, expand_env_placeholders, load_config,
    top_level_sections, unresolved_placeholders,
};
use core_types::VerificationSnapshot;
use llm_client::{ChatClient, OpenAiCompatClient};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Sections a settings file must spell out; the rest have usable defaults.
pub const REQUIRED_SECTIONS: [&str; 3] = ["llm", "strategy", "backtest"];

pub struct Verifier {
    config_path: PathBuf,
    settings: VerifierSettings,
    endpoint: Option<String>,
    http: reqwest::Client,
    chat: Option<Arc<dyn ChatClient>>,
    lookup: fn(&str) -> Option<String>,
}

impl Verifier {
    /// Builds a verifier for the settings file at `config_path`.
    ///
    /// An unloadable file is not an error here: the verifier falls back to default
    /// settings and the endpoint and model checks simply fail.
    pub fn from_path(config_path: impl Into<PathBuf>) -> Result<Self, VerifierError> {
        let config_path = config_path.into();
        match load_config(&config_path) {
            Ok(config) => Self::new(config_path, &config),
            Err(e) => {
                tracing::warn!(path = %config_path.display(), error = %e, "Settings unusable; verifying with defaults");
                Self::build(config_path, VerifierSettings::default(), None)
            }
        }
    }

    pub fn new(config_path: impl Into<PathBuf>, config: &AppConfig) -> Result<Self, VerifierError> {
        Self::build(config_path.into(), config.verifier.clone(), Some(&config.llm))
    }

    fn build(
        config_path: PathBuf,
        settings: VerifierSettings,
        llm: Option<&LlmSettings>,
    ) -> Result<Self, VerifierError> {
        let timeout = Duration::from_secs(settings.request_timeout_secs);
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        let chat: Option<Arc<dyn ChatClient>> = match llm {
            Some(llm) => match OpenAiCompatClient::new(llm) {
                Ok(client) => Some(Arc::new(client.with_max_tokens(10))),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not build the chat client; model check will fail");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            config_path,
            settings,
            endpoint: llm.map(|llm| llm.base_url.trim_end_matches('/').to_string()),
            http,
            chat,
            lookup: process_env,
        })
    }

    /// Replaces the model client, e.g. with a scripted one.
    pub fn with_chat(mut self, chat: Arc<dyn ChatClient>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_endpoint(mut self, base_url: impl Into<String>) -> Self {
        self.endpoint = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    /// Resolves environment variables through `lookup` instead of the process environment.
    pub fn with_env_lookup(mut self, lookup: fn(&str) -> Option<String>) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn with_settings(mut self, settings: VerifierSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &VerifierSettings {
        &self.settings
    }

    /// Runs every check once.
    pub async fn cycle(&self) -> VerificationSnapshot {
        let mut snapshot = VerificationSnapshot::new();
        snapshot.services = self.verify_services().await;
        snapshot.config = self.verify_configuration();
        snapshot.resources = resources::collect(Path::new(".")).await;
        snapshot.model = self.verify_model().await;

        let issues = snapshot.issues(&self.settings.thresholds);
        if issues.is_empty() {
            tracing::info!("Verification passed");
        } else {
            for issue in &issues {
                tracing::warn!(issue = %issue, "Needs attention");
            }
        }
        snapshot
    }

    /// One cycle, then the snapshot is written over the state file.
    pub async fn verify_once(&self) -> Result<VerificationSnapshot, VerifierError> {
        let snapshot = self.cycle().await;
        self.write_state(&snapshot)?;
        Ok(snapshot)
    }

    /// Verifies every `interval_secs`, or after `error_backoff_secs` when a cycle fails.
    /// Stops after `max_cycles` cycles when given, otherwise runs until cancelled.
    pub async fn run_continuous(&self, max_cycles: Option<usize>) {
        let interval = Duration::from_secs(self.settings.interval_secs);
        let backoff = Duration::from_secs(self.settings.error_backoff_secs);
        tracing::info!(interval_secs = self.settings.interval_secs, "Continuous verification started");

        let mut completed = 0usize;
        loop {
            let pause = match self.verify_once().await {
                Ok(_) => interval,
                Err(e) => {
                    tracing::error!(error = %e, "Verification cycle failed; backing off");
                    backoff
                }
            };
            completed += 1;
            if max_cycles.is_some_and(|max| completed >= max) {
                break;
            }
            tokio::time::sleep(pause).await;
        }
    }

    async fn verify_services(&self) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        // Any HTTP response at all counts as reachable.
        let reachable = match &self.endpoint {
            Some(base) => match self.http.get(format!("{}/health", base)).send().await {
                Ok(response) => {
                    tracing::debug!(status = %response.status(), "Endpoint answered");
                    true
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Endpoint unreachable");
                    false
                }
            },
            None => false,
        };
        results.insert("api_endpoint".to_string(), reachable);
        results
    }

    fn verify_configuration(&self) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        let exists = self.config_path.is_file();
        results.insert("config_exists".to_string(), exists);

        let raw = if exists {
            std::fs::read_to_string(&self.config_path).ok()
        } else {
            None
        };
        let Some(raw) = raw else {
            for key in ["config_valid", "config_complete", "env_vars_set"] {
                results.insert(key.to_string(), false);
            }
            return results;
        };

        let sections = top_level_sections(&raw);
        let complete = sections
            .as_ref()
            .map(|present| REQUIRED_SECTIONS.iter().all(|s| present.iter().any(|p| p == s)))
            .unwrap_or(false);
        let valid = sections.is_ok()
            && configuration::load_config_from_str(&raw, self.lookup)
                .inspect_err(|e| tracing::debug!(error = %e, "Settings failed validation"))
                .is_ok();

        let expanded = expand_env_placeholders(&raw, self.lookup);
        let env_ok = unresolved_placeholders(&expanded).is_empty()
            && self
                .settings
                .required_env
                .iter()
                .all(|name| (self.lookup)(name).is_some_and(|v| !v.is_empty()));

        results.insert("config_valid".to_string(), valid);
        results.insert("config_complete".to_string(), complete);
        results.insert("env_vars_set".to_string(), env_ok);
        results
    }

    async fn verify_model(&self) -> BTreeMap<String, bool> {
        let responsive = match &self.chat {
            Some(chat) => match chat.chat("You are a health check.", "Reply with OK.").await {
                Ok(_) => true,
                Err(e) => {
                    tracing::debug!(error = %e, "Model did not respond");
                    false
                }
            },
            None => false,
        };
        BTreeMap::from([("model_responsive".to_string(), responsive)])
    }

    fn write_state(&self, snapshot: &VerificationSnapshot) -> Result<(), VerifierError> {
        let path = &self.settings.state_path;
        let state_err = |source| VerifierError::StateFile {
            path: path.display().to_string(),
            source,
        };
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(state_err)?;
        }
        let text = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(path, text).map_err(state_err)
    }
}
