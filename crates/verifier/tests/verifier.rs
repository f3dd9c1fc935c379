use async_trait::async_trait;
use axum::Router;
use axum::routing::get;
use configuration::VerifierSettings;
use llm_client::{ChatClient, LlmError};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use verifier::Verifier;

struct Answering(bool);

#[async_trait]
impl ChatClient for Answering {
    async fn chat(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
        if self.0 { Ok("OK".to_string()) } else { Err(LlmError::EmptyResponse) }
    }
}

async fn start_endpoint() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/v1/health", get(|| async { "ok" }));
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

fn write_settings(dir: &Path, base_url: &str, api_key: &str) -> std::path::PathBuf {
    let path = dir.join("agents.yaml");
    let yaml = format!(
        "llm:\n  base_url: \"{base_url}\"\n  model: m\n  api_key: \"{api_key}\"\n\
         strategy:\n  name: S\n\
         backtest:\n  timeframe: 5m\n\
         verifier:\n  interval_secs: 0\n  error_backoff_secs: 0\n  state_path: \"{}\"\n",
        dir.join("state/verification_state.json").display()
    );
    std::fs::write(&path, yaml).unwrap();
    path
}

#[tokio::test]
async fn healthy_setup_passes_every_check() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_endpoint().await;
    let path = write_settings(dir.path(), &format!("http://{}/v1", addr), "k");

    let verifier = Verifier::from_path(&path)
        .unwrap()
        .with_chat(Arc::new(Answering(true)));
    let snapshot = verifier.verify_once().await.unwrap();

    assert_eq!(snapshot.services["api_endpoint"], true);
    assert!(snapshot.config.values().all(|ok| *ok), "{:?}", snapshot.config);
    assert_eq!(snapshot.model["model_responsive"], true);

    let saved: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(&verifier.settings().state_path).unwrap(),
    )
    .unwrap();
    assert_eq!(saved["services"]["api_endpoint"], true);
}

#[tokio::test]
async fn missing_settings_fail_config_and_remote_checks() {
    let dir = tempfile::tempdir().unwrap();
    let verifier = Verifier::from_path(dir.path().join("absent.yaml")).unwrap();

    let snapshot = verifier.cycle().await;
    assert_eq!(snapshot.config["config_exists"], false);
    assert_eq!(snapshot.config["config_valid"], false);
    assert_eq!(snapshot.services["api_endpoint"], false);
    assert_eq!(snapshot.model["model_responsive"], false);
    assert!(snapshot.needs_attention(&verifier.settings().thresholds));
}

#[tokio::test]
async fn unresolved_placeholders_and_silent_model_are_flagged() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_settings(dir.path(), "http://127.0.0.1:1/v1", "${NOT_SET_ANYWHERE}");

    let verifier = Verifier::from_path(&path)
        .unwrap()
        .with_env_lookup(|_| None)
        .with_endpoint("http://127.0.0.1:1/v1")
        .with_chat(Arc::new(Answering(false)));
    let snapshot = verifier.cycle().await;

    assert_eq!(snapshot.config["config_exists"], true);
    assert_eq!(snapshot.config["config_complete"], true);
    assert_eq!(snapshot.config["env_vars_set"], false);
    assert_eq!(snapshot.config["config_valid"], false);
    assert_eq!(snapshot.services["api_endpoint"], false);
    assert_eq!(snapshot.model["model_responsive"], false);
}

#[tokio::test]
async fn continuous_mode_keeps_only_the_latest_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state.json");
    let verifier = Verifier::from_path(dir.path().join("absent.yaml"))
        .unwrap()
        .with_settings(VerifierSettings {
            interval_secs: 0,
            error_backoff_secs: 0,
            state_path: state.clone(),
            ..VerifierSettings::default()
        });

    verifier.run_continuous(Some(2)).await;

    let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&state).unwrap()).unwrap();
    assert!(saved.is_object());
    assert_eq!(saved["config"]["config_exists"], false);
}
