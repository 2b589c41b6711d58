//! OpenAI-compatible chat-completions client.
//!
//! Works against any endpoint that speaks the `/v1/chat/completions` wire
//! format (OpenAI, OpenRouter, local proxies). Error responses are classified
//! into the [`CompletionError`] taxonomy so the caller can distinguish
//! context overflow from transient failures.

use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::types::{CompletionRequest, CompletionResponse};
use super::CompletionService;
use crate::errors::CompletionError;
use crate::session::Message;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CompletionError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
        })
    }

    /// Read `VERSO_API_KEY` (falling back to `OPENAI_API_KEY`) and the
    /// optional `VERSO_BASE_URL` override from the environment.
    pub fn from_env() -> Result<Self, CompletionError> {
        let api_key = std::env::var("VERSO_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| {
                CompletionError::Config(
                    "no API key: set VERSO_API_KEY or OPENAI_API_KEY".to_string(),
                )
            })?;
        let base_url = std::env::var("VERSO_BASE_URL").ok();
        Self::new(api_key, base_url)
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait::async_trait]
impl CompletionService for OpenAiClient {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        let api_messages: Vec<ApiMessage> = request.messages.iter().map(ApiMessage::from).collect();
        let body = ChatApiRequest {
            model: &request.model,
            messages: &api_messages,
            temperature: request.temperature,
            max_completion_tokens: Some(request.max_output_tokens),
            reasoning_effort: request.reasoning_effort.map(|e| e.as_str()),
        };

        let start = Instant::now();
        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(CompletionError::Network)?;

        let status = response.status();
        let text = response.text().await.map_err(CompletionError::Network)?;

        if !status.is_success() {
            return Err(classify_http_error(&request.model, status, &text));
        }

        let parsed: ChatApiResponse = serde_json::from_str(&text)
            .map_err(|e| CompletionError::MalformedResponse(format!("{e}: {}", snippet(&text))))?;

        if let Some(err) = parsed.error {
            return Err(classify_api_error(&request.model, &err));
        }

        let choice = parsed
            .choices
            .and_then(|mut c| if c.is_empty() { None } else { Some(c.remove(0)) })
            .ok_or_else(|| CompletionError::MalformedResponse("no choices in response".into()))?;
        let content = choice
            .message
            .and_then(|m| m.content)
            .ok_or_else(|| CompletionError::MalformedResponse("choice has no content".into()))?;

        let usage = parsed.usage.unwrap_or_default();

        Ok(CompletionResponse {
            text: content,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            duration: start.elapsed(),
        })
    }
}

/// Whether an error payload indicates the request blew the context window.
fn is_context_length_error(code: Option<&str>, message: &str) -> bool {
    if code == Some("context_length_exceeded") {
        return true;
    }
    let lower = message.to_lowercase();
    lower.contains("context length")
        || lower.contains("context window")
        || lower.contains("maximum context")
        || lower.contains("too many tokens")
}

fn classify_http_error(model: &str, status: StatusCode, body: &str) -> CompletionError {
    let (code, message) = match serde_json::from_str::<ChatApiResponse>(body) {
        Ok(parsed) => match parsed.error {
            Some(err) => (err.code, err.message),
            None => (None, snippet(body)),
        },
        Err(_) => (None, snippet(body)),
    };

    if is_context_length_error(code.as_deref(), &message) {
        return CompletionError::ContextLengthExceeded {
            model: model.to_string(),
            message,
        };
    }

    match status.as_u16() {
        429 => CompletionError::RateLimited { message },
        s if s >= 500 => CompletionError::Provider { status: s, message },
        s => CompletionError::InvalidRequest { status: s, message },
    }
}

fn classify_api_error(model: &str, err: &ApiError) -> CompletionError {
    if is_context_length_error(err.code.as_deref(), &err.message) {
        CompletionError::ContextLengthExceeded {
            model: model.to_string(),
            message: err.message.clone(),
        }
    } else {
        CompletionError::InvalidRequest {
            status: 200,
            message: err.message.clone(),
        }
    }
}

fn snippet(text: &str) -> String {
    text.chars().take(300).collect()
}

// Wire types.

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<&'a str>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

impl From<&Message> for ApiMessage {
    fn from(m: &Message) -> Self {
        Self {
            role: m.role.as_str(),
            content: m.content.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ChatApiResponse {
    choices: Option<Vec<Choice>>,
    usage: Option<Usage>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
    code: Option<String>,
}
