//! Gemini transport tests against a local stand-in endpoint

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use maxgrade::client::{GeminiClient, GeminiSettings, GenerativeModel, GradingClient, GradingError};
use maxgrade::intake::{FileIntake, SubmissionFile};
use maxgrade::prompt;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the stand-in endpoint received, and what it answers with
#[derive(Clone)]
struct Endpoint {
    status: StatusCode,
    reply: Value,
    delay: Duration,
    received: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
}

async fn generate_content(
    State(endpoint): State<Endpoint>,
    Path(model_action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let api_key = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    endpoint
        .received
        .lock()
        .unwrap()
        .push((model_action, api_key, body));

    tokio::time::sleep(endpoint.delay).await;
    (endpoint.status, Json(endpoint.reply.clone()))
}

/// Start the stand-in on an ephemeral port; returns its base URL
async fn spawn_endpoint(endpoint: Endpoint) -> String {
    let app = Router::new()
        .route("/v1beta/models/:model_action", post(generate_content))
        .with_state(endpoint);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/v1beta", addr)
}

fn endpoint(status: StatusCode, reply: Value) -> Endpoint {
    Endpoint {
        status,
        reply,
        delay: Duration::ZERO,
        received: Arc::new(Mutex::new(Vec::new())),
    }
}

fn text_reply(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}

fn client(base_url: String, api_key: Option<&str>, timeout: Option<Duration>) -> GradingClient {
    let gemini = GeminiClient::new(GeminiSettings {
        api_key: api_key.map(str::to_string),
        model: "test-model".to_string(),
        endpoint: base_url,
        timeout,
    })
    .unwrap();
    GradingClient::new(Arc::new(gemini))
}

async fn submission() -> SubmissionFile {
    FileIntake::new()
        .accept_bytes(
            "22305011_张三_期末作业.mp4",
            Some("video/mp4".to_string()),
            b"mp4 frames",
        )
        .await
        .unwrap()
}

const VALID: &str = r#"{"overallScore": 91, "studentNameGuess": "张三", "summary": "优秀",
    "categories": [{"name": "主题内容", "score": 10, "maxScore": 10, "feedback": "很好"}]}"#;

#[tokio::test]
async fn test_request_shape_and_success() {
    let ep = endpoint(StatusCode::OK, text_reply(VALID));
    let received = ep.received.clone();
    let base = spawn_endpoint(ep).await;

    let file = submission().await;
    let grading_prompt = prompt::build(file.filename());
    let result = client(base, Some("test-key"), None)
        .grade(&file, &grading_prompt)
        .await
        .unwrap();
    assert_eq!(result.overall_score, 91.0);
    assert_eq!(result.student_name(), Some("张三"));

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    let (model_action, api_key, body) = &received[0];
    assert_eq!(model_action, "test-model:generateContent");
    assert_eq!(api_key.as_deref(), Some("test-key"));

    let parts = &body["contents"][0]["parts"];
    assert_eq!(parts[0]["inlineData"]["mimeType"], "video/mp4");
    assert_eq!(parts[0]["inlineData"]["data"], file.base64_payload());
    assert_eq!(parts[1]["text"], grading_prompt.instruction_text.as_str());
    assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    assert_eq!(
        body["generationConfig"]["responseSchema"],
        grading_prompt.output_schema
    );
}

#[tokio::test]
async fn test_multi_part_text_is_concatenated() {
    let reply = json!({
        "candidates": [{
            "content": {"parts": [{"text": &VALID[..20]}, {"text": &VALID[20..]}]}
        }]
    });
    let base = spawn_endpoint(endpoint(StatusCode::OK, reply)).await;

    let file = submission().await;
    let result = client(base, Some("k"), None)
        .grade(&file, &prompt::build(file.filename()))
        .await
        .unwrap();
    assert_eq!(result.categories.len(), 1);
}

#[tokio::test]
async fn test_http_error_status() {
    let base = spawn_endpoint(endpoint(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"error": {"message": "boom"}}),
    ))
    .await;

    let file = submission().await;
    let err = client(base, Some("k"), None)
        .grade(&file, &prompt::build(file.filename()))
        .await
        .unwrap_err();
    assert!(matches!(err, GradingError::Api { status: 500, .. }));
}

#[tokio::test]
async fn test_blocked_prompt() {
    let base = spawn_endpoint(endpoint(
        StatusCode::OK,
        json!({"promptFeedback": {"blockReason": "SAFETY"}}),
    ))
    .await;

    let file = submission().await;
    let err = client(base, Some("k"), None)
        .grade(&file, &prompt::build(file.filename()))
        .await
        .unwrap_err();
    assert!(matches!(err, GradingError::Blocked(ref reason) if reason == "SAFETY"));
}

#[tokio::test]
async fn test_no_candidates_is_generation_failure() {
    let base = spawn_endpoint(endpoint(StatusCode::OK, json!({"candidates": []}))).await;

    let file = submission().await;
    let err = client(base, Some("k"), None)
        .grade(&file, &prompt::build(file.filename()))
        .await
        .unwrap_err();
    assert!(matches!(err, GradingError::GenerationFailed(_)));
}

#[tokio::test]
async fn test_non_json_text_is_malformed() {
    let base = spawn_endpoint(endpoint(StatusCode::OK, text_reply("分数：90"))).await;

    let file = submission().await;
    let err = client(base, Some("k"), None)
        .grade(&file, &prompt::build(file.filename()))
        .await
        .unwrap_err();
    assert!(matches!(err, GradingError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_missing_key_makes_no_request() {
    let ep = endpoint(StatusCode::OK, text_reply(VALID));
    let received = ep.received.clone();
    let base = spawn_endpoint(ep).await;

    let file = submission().await;
    let err = client(base, None, None)
        .grade(&file, &prompt::build(file.filename()))
        .await
        .unwrap_err();
    assert!(matches!(err, GradingError::NotConfigured(_)));
    assert!(received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_transport_timeout() {
    let mut ep = endpoint(StatusCode::OK, text_reply(VALID));
    ep.delay = Duration::from_secs(2);
    let base = spawn_endpoint(ep).await;

    let file = submission().await;
    let err = client(base, Some("k"), Some(Duration::from_millis(200)))
        .grade(&file, &prompt::build(file.filename()))
        .await
        .unwrap_err();
    assert!(matches!(err, GradingError::Transport(_)));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    // Bind then drop to get a port with nothing listening
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let file = submission().await;
    let err = client(format!("http://{}/v1beta", addr), Some("k"), None)
        .grade(&file, &prompt::build(file.filename()))
        .await
        .unwrap_err();
    assert!(matches!(err, GradingError::Transport(_)));
}

#[test]
fn test_request_url() {
    let gemini = GeminiClient::new(GeminiSettings {
        api_key: Some("k".to_string()),
        model: "gemini-3-flash-preview".to_string(),
        endpoint: "https://example.invalid/v1beta/".to_string(),
        timeout: None,
    })
    .unwrap();
    assert_eq!(
        gemini.request_url(),
        "https://example.invalid/v1beta/models/gemini-3-flash-preview:generateContent"
    );
    assert_eq!(gemini.name(), "gemini-3-flash-preview");
}
