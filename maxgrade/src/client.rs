//! Grading client
//!
//! Sends one multimodal request (inline file data + instruction text, constrained to
//! the output schema with a JSON-only response format), awaits exactly one response,
//! and parses it into a [`GradingResult`]. No streaming, no retries.
//!
//! # API Reference
//! - Endpoint: `{endpoint}/models/{model}:generateContent`
//! - Documentation: https://ai.google.dev/api/generate-content

use crate::intake::SubmissionFile;
use crate::model::GradingResult;
use crate::prompt::GradingPrompt;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

/// Default generation endpoint
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default multimodal model
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

/// Error category shared by every remote-call failure
pub const TRANSPORT_OR_MODEL_FAILURE: &str = "TransportOrModelFailure";

/// The one message users see for any grading failure
pub const GRADING_FAILED_MESSAGE: &str = "分析失败，请检查网络或文件格式。";

/// Grading call errors
///
/// The variants exist for diagnostics only; all of them collapse into
/// [`TRANSPORT_OR_MODEL_FAILURE`] with [`GRADING_FAILED_MESSAGE`] for users.
#[derive(Debug, Error)]
pub enum GradingError {
    /// No credential configured
    #[error("AI service not configured: {0}")]
    NotConfigured(String),

    /// Network communication error
    #[error("Network error: {0}")]
    Transport(String),

    /// Endpoint returned a non-2xx status
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Request or response blocked by safety filters
    #[error("Generation blocked: {0}")]
    Blocked(String),

    /// Model returned no text
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// Text did not match the grading contract
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl GradingError {
    /// Category tag exposed to the presentation layer
    pub fn category(&self) -> &'static str {
        TRANSPORT_OR_MODEL_FAILURE
    }

    /// Localized user-facing message (never the underlying cause)
    pub fn user_message(&self) -> &'static str {
        GRADING_FAILED_MESSAGE
    }

    /// Diagnostic summary without upstream bodies or model output
    pub fn summary(&self) -> String {
        match self {
            GradingError::NotConfigured(_) => "AI service not configured".to_string(),
            GradingError::Transport(_) => "Network error".to_string(),
            GradingError::Api { status, .. } => format!("API error {}", status),
            GradingError::Blocked(_) => "Generation blocked".to_string(),
            GradingError::GenerationFailed(_) => "Generation failed".to_string(),
            GradingError::MalformedResponse(_) => "Malformed response".to_string(),
        }
    }
}

/// One multimodal generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// MIME type of the inline payload
    pub mime_type: String,
    /// Base64-encoded file bytes
    pub inline_data: String,
    /// Grading instructions
    pub instruction_text: String,
    /// Structured-output schema
    pub response_schema: Value,
}

impl GenerationRequest {
    pub fn new(file: &SubmissionFile, prompt: &GradingPrompt) -> Self {
        Self {
            mime_type: file.mime_type().to_string(),
            inline_data: file.base64_payload(),
            instruction_text: prompt.instruction_text.clone(),
            response_schema: prompt.output_schema.clone(),
        }
    }
}

/// Seam between the grading pipeline and a concrete generation service
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Model identifier for logging
    fn name(&self) -> &str;

    /// Issue one request; `Ok(None)` means the service answered without text
    async fn generate(&self, request: &GenerationRequest) -> Result<Option<String>, GradingError>;
}

/// Gemini client settings
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    /// Transport timeout; `None` leaves the call unbounded
    pub timeout: Option<Duration>,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: None,
        }
    }
}

/// Gemini `generateContent` client
pub struct GeminiClient {
    http_client: Client,
    settings: GeminiSettings,
}

impl GeminiClient {
    /// Create new Gemini client
    pub fn new(settings: GeminiSettings) -> Result<Self, GradingError> {
        let mut builder =
            Client::builder().user_agent(concat!("maxgrade/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| GradingError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            settings,
        })
    }

    /// Full `generateContent` URL for the configured model
    pub fn request_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.model
        )
    }

    pub fn is_configured(&self) -> bool {
        self.settings.api_key.is_some()
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    fn name(&self) -> &str {
        &self.settings.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Option<String>, GradingError> {
        let Some(api_key) = self.settings.api_key.as_deref() else {
            return Err(GradingError::NotConfigured(
                "API key missing; set MAXGRADE_API_KEY".to_string(),
            ));
        };

        let body = GenerateContentRequest::from_request(request);
        let url = self.request_url();

        debug!(
            url = %url,
            mime_type = %request.mime_type,
            payload_len = request.inline_data.len(),
            "Sending generateContent request"
        );

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GradingError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GradingError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: GenerateContentResponse = response.json().await.map_err(|e| {
            GradingError::MalformedResponse(format!("Invalid response envelope: {}", e))
        })?;

        envelope.into_text()
    }
}

/// Runs grading calls against a [`GenerativeModel`]
#[derive(Clone)]
pub struct GradingClient {
    model: Arc<dyn GenerativeModel>,
}

impl GradingClient {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Grade one submission
    ///
    /// Fails as a whole on any transport, model, or parse problem; partial results
    /// are never returned.
    pub async fn grade(
        &self,
        file: &SubmissionFile,
        prompt: &GradingPrompt,
    ) -> Result<GradingResult, GradingError> {
        info!(
            filename = %file.filename(),
            bytes = file.byte_len(),
            model = %self.model.name(),
            "Grading submission"
        );

        let request = GenerationRequest::new(file, prompt);
        let outcome = self.run(&request).await;

        match &outcome {
            Ok(result) => info!(
                filename = %file.filename(),
                overall_score = result.overall_score,
                categories = result.categories.len(),
                "Grading complete"
            ),
            Err(e) => error!(
                filename = %file.filename(),
                error = %e,
                "Grading failed"
            ),
        }

        outcome
    }

    async fn run(&self, request: &GenerationRequest) -> Result<GradingResult, GradingError> {
        let text = self
            .model
            .generate(request)
            .await?
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| GradingError::GenerationFailed("No data returned from AI".to_string()))?;

        GradingResult::from_json(&text).map_err(|e| GradingError::MalformedResponse(e.to_string()))
    }
}

// ============================================================================
// generateContent wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum RequestPart<'a> {
    InlineData(InlineData<'a>),
    Text(&'a str),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Value,
}

impl<'a> GenerateContentRequest<'a> {
    fn from_request(request: &'a GenerationRequest) -> Self {
        Self {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![
                    RequestPart::InlineData(InlineData {
                        mime_type: &request.mime_type,
                        data: &request.inline_data,
                    }),
                    RequestPart::Text(&request.instruction_text),
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: &request.response_schema,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate
    fn into_text(self) -> Result<Option<String>, GradingError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(GradingError::Blocked(reason));
        }

        let Some(candidate) = self.candidates.into_iter().next() else {
            return Ok(None);
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            let blocked = candidate
                .finish_reason
                .filter(|r| r == "SAFETY" || r == "PROHIBITED_CONTENT");
            if let Some(reason) = blocked {
                return Err(GradingError::Blocked(reason));
            }
            return Ok(None);
        }

        Ok(Some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::FileIntake;
    use crate::prompt;
    use std::sync::Mutex;

    /// Model that replays a fixed outcome and records the requests it saw
    struct ScriptedModel {
        reply: Mutex<Option<Result<Option<String>, GradingError>>>,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedModel {
        fn new(reply: Result<Option<String>, GradingError>) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Some(reply)),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GenerativeModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> Result<Option<String>, GradingError> {
            self.seen.lock().unwrap().push(request.clone());
            self.reply.lock().unwrap().take().unwrap_or(Ok(None))
        }
    }

    async fn sample_file() -> SubmissionFile {
        FileIntake::new()
            .accept_bytes(
                "22305011_张三_期末作业.mp4",
                Some("video/mp4".to_string()),
                b"frames",
            )
            .await
            .unwrap()
    }

    const VALID: &str = r#"{"overallScore": 88, "summary": "好",
        "categories": [{"name": "主题内容", "score": 9, "maxScore": 10, "feedback": "明确"}]}"#;

    #[tokio::test]
    async fn test_grade_success_passes_payload_and_prompt() {
        let model = ScriptedModel::new(Ok(Some(VALID.to_string())));
        let client = GradingClient::new(model.clone());
        let file = sample_file().await;
        let prompt = prompt::build(file.filename());

        let result = client.grade(&file, &prompt).await.unwrap();
        assert_eq!(result.overall_score, 88.0);

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].mime_type, "video/mp4");
        assert_eq!(seen[0].inline_data, file.base64_payload());
        assert_eq!(seen[0].instruction_text, prompt.instruction_text);
    }

    #[tokio::test]
    async fn test_empty_response_is_generation_failure() {
        let client = GradingClient::new(ScriptedModel::new(Ok(None)));
        let file = sample_file().await;
        let err = client.grade(&file, &prompt::build(file.filename())).await.unwrap_err();
        assert!(matches!(err, GradingError::GenerationFailed(_)));
        assert_eq!(err.category(), TRANSPORT_OR_MODEL_FAILURE);
    }

    #[tokio::test]
    async fn test_whitespace_response_is_generation_failure() {
        let client = GradingClient::new(ScriptedModel::new(Ok(Some("  \n".to_string()))));
        let file = sample_file().await;
        let err = client.grade(&file, &prompt::build(file.filename())).await.unwrap_err();
        assert!(matches!(err, GradingError::GenerationFailed(_)));
    }

    #[tokio::test]
    async fn test_non_json_response_is_malformed() {
        let reply = Ok(Some("抱歉，我无法评分".to_string()));
        let client = GradingClient::new(ScriptedModel::new(reply));
        let file = sample_file().await;
        let err = client.grade(&file, &prompt::build(file.filename())).await.unwrap_err();
        assert!(matches!(err, GradingError::MalformedResponse(_)));
        assert_eq!(err.user_message(), GRADING_FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let client = GradingClient::new(ScriptedModel::new(Err(GradingError::Transport(
            "connection reset".to_string(),
        ))));
        let file = sample_file().await;
        let err = client.grade(&file, &prompt::build(file.filename())).await.unwrap_err();
        assert!(matches!(err, GradingError::Transport(_)));
        // Cause is not leaked into the user message
        assert!(!err.user_message().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_gemini_without_key_is_not_configured() {
        let client = GeminiClient::new(GeminiSettings::default()).unwrap();
        assert!(!client.is_configured());
        let file = sample_file().await;
        let request = GenerationRequest::new(&file, &prompt::build(file.filename()));
        let err = client.generate(&request).await.unwrap_err();
        assert!(matches!(err, GradingError::NotConfigured(_)));
    }

    #[test]
    fn test_request_url() {
        let client = GeminiClient::new(GeminiSettings {
            endpoint: "http://localhost:1234/v1beta/".to_string(),
            model: "gemini-test".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            client.request_url(),
            "http://localhost:1234/v1beta/models/gemini-test:generateContent"
        );
    }

    #[tokio::test]
    async fn test_wire_request_shape() {
        let file = sample_file().await;
        let prompt = prompt::build(file.filename());
        let request = GenerationRequest::new(&file, &prompt);
        let json = serde_json::to_value(GenerateContentRequest::from_request(&request)).unwrap();

        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "video/mp4");
        assert_eq!(parts[0]["inlineData"]["data"], file.base64_payload());
        assert_eq!(parts[1]["text"], prompt.instruction_text);
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(json["generationConfig"]["responseSchema"], prompt.output_schema);
    }

    #[test]
    fn test_response_text_concatenates_parts() {
        let envelope: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "{\"a\":"}, {"text": "1}"}]},
                "finishReason": "STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(envelope.into_text().unwrap().as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_response_block_reason() {
        let envelope: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        assert!(matches!(envelope.into_text(), Err(GradingError::Blocked(_))));
    }

    #[test]
    fn test_response_without_candidates_is_empty() {
        let envelope: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(envelope.into_text().unwrap().is_none());
    }

    #[test]
    fn test_safety_finish_without_text_is_blocked() {
        let envelope: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap();
        assert!(matches!(envelope.into_text(), Err(GradingError::Blocked(_))));
    }

    #[test]
    fn test_summary_omits_upstream_detail() {
        let err = GradingError::Api {
            status: 503,
            body: "{\"error\": \"quota for project 1234\"}".to_string(),
        };
        assert_eq!(err.summary(), "API error 503");

        let err = GradingError::MalformedResponse("学生张三 overallScore".to_string());
        assert!(!err.summary().contains("张三"));
    }
}
