use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use configuration::LlmSettings;
use core_types::StrategyParameters;
use core_types::ParameterBounds;
use llm_client::error::LlmError;
use llm_client::{ChatClient, OpenAiCompatClient, Suggester, TranscriptLog};
use rust_decimal_macros::dec;
use serde_json::{Value, json};

async fn completions(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let authorised = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some("Bearer test-key");
    if !authorised {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "bad key"}})),
        );
    }
    let user = body["messages"][1]["content"].as_str().unwrap_or_default();
    let content = if user.contains("garbage") {
        "I'd rather not say.".to_string()
    } else {
        format!(
            "Here you go:\n```json\n{{\"minimal_roi_0\": 0.021, \"stoploss\": -0.07, \"max_tokens\": {}}}\n```",
            body["max_tokens"]
        )
    };
    (
        StatusCode::OK,
        Json(json!({"choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]})),
    )
}

async fn spawn_endpoint() -> SocketAddr {
    let app = Router::new().route("/v1/chat/completions", post(completions));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn settings(addr: SocketAddr, api_key: &str) -> LlmSettings {
    LlmSettings {
        base_url: format!("http://{}/v1/", addr),
        model: "local-model".to_string(),
        api_key: api_key.to_string(),
        temperature: 0.4,
        top_p: 0.95,
        max_tokens: 128,
        timeout_secs: 5,
        system_prompt: "system".to_string(),
    }
}

#[tokio::test]
async fn chat_returns_first_choice_and_logs_transcript() {
    let addr = spawn_endpoint().await;
    let dir = tempfile::tempdir().unwrap();
    let transcript = TranscriptLog::new(dir.path().join("llm_client.log"))
        .with_payload_log(dir.path().join("llm_payload.log"));
    let client = OpenAiCompatClient::new(&settings(addr, "test-key"))
        .unwrap()
        .with_transcript(transcript);

    let reply = client.chat("system", "tune please").await.unwrap();
    assert!(reply.contains("\"stoploss\": -0.07"));
    assert!(reply.contains("\"max_tokens\": 128"));

    let log = std::fs::read_to_string(dir.path().join("llm_client.log")).unwrap();
    assert!(log.contains("USER: tune please"));
    assert!(log.contains("RESPONSE: Here you go:"));
    assert!(dir.path().join("llm_payload.log").exists());
}

#[tokio::test]
async fn api_errors_carry_status_and_message() {
    let addr = spawn_endpoint().await;
    let client = OpenAiCompatClient::new(&settings(addr, "wrong")).unwrap();

    match client.chat("system", "hello").await {
        Err(LlmError::Api { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "bad key");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn max_tokens_override_is_sent() {
    let addr = spawn_endpoint().await;
    let client = OpenAiCompatClient::new(&settings(addr, "test-key"))
        .unwrap()
        .with_max_tokens(10);
    let reply = client.chat("system", "ping").await.unwrap();
    assert!(reply.contains("\"max_tokens\": 10"));
}

#[tokio::test]
async fn suggester_over_http_clamps_or_falls_back() {
    let addr = spawn_endpoint().await;
    let client: Arc<dyn ChatClient> =
        Arc::new(OpenAiCompatClient::new(&settings(addr, "test-key")).unwrap());
    let fallback = StrategyParameters::new(dec!(0.012), dec!(-0.11));
    let suggester = Suggester::new(client, "system", ParameterBounds::default(), fallback.clone())
        .with_retries(2, Duration::from_millis(1));

    let good = suggester.suggest("tune please").await;
    assert!(!good.is_fallback());
    assert_eq!(good.params(), &StrategyParameters::new(dec!(0.021), dec!(-0.07)));

    let bad = suggester.suggest("send garbage").await;
    assert!(bad.is_fallback());
    assert_eq!(bad.params(), &fallback);
}

#[tokio::test]
async fn unreachable_endpoint_is_a_request_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = OpenAiCompatClient::new(&settings(addr, "test-key")).unwrap();
    assert!(matches!(
        client.chat("system", "hello").await,
        Err(LlmError::Request(_))
    ));
}
