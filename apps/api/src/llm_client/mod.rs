/// LLM Client — the single point of entry for all completion API calls.
///
/// ARCHITECTURAL RULE: No other module may call the completion endpoint directly.
/// Talks to an OpenRouter-compatible chat-completions endpoint.
///
/// One attempt per call. Failures are classified and returned, never retried.
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::errors::AppError;
use crate::models::enhancement::EnhancementRequest;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const UNKNOWN_API_ERROR: &str = "Unknown API error";

/// Anything that can turn an [`EnhancementRequest`] into generated text.
///
/// Carried in `AppState` as `Arc<dyn CompletionBackend>`.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &EnhancementRequest) -> Result<String, AppError>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

// Every field is optional so a short body becomes MalformedResponse, not a parse panic.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Option<Vec<Choice>>,
    usage: Option<Usage>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

/// The completion client used by the enhancement pipeline.
///
/// Holds the bearer credential and attribution headers read once at startup.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    referer: String,
    app_title: String,
}

impl LlmClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: config.openrouter_api_url.clone(),
            api_key: config.openrouter_api_key.clone(),
            model: config.model.clone(),
            referer: config.referer.clone(),
            app_title: config.app_title.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    async fn complete(&self, request: &EnhancementRequest) -> Result<String, AppError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: request.prompt(),
            }],
            temperature: request.temperature(),
            max_tokens: request.max_output_tokens(),
        };

        debug!(
            "Sending completion request: model={}, prompt_chars={}, timeout={:?}",
            self.model,
            request.prompt().len(),
            request.timeout()
        );

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.app_title)
            .header("content-type", "application/json")
            .timeout(request.timeout())
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let text = response.text().await.map_err(network_error)?;

        if !status.is_success() {
            return Err(AppError::Api {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| AppError::MalformedResponse(format!("response is not valid JSON: {e}")))?;

        if let Some(usage) = &parsed.usage {
            info!(
                "Completion succeeded: model={}, prompt_tokens={:?}, completion_tokens={:?}",
                self.model, usage.prompt_tokens, usage.completion_tokens
            );
        }

        first_choice_content(parsed)
    }
}

fn network_error(e: reqwest::Error) -> AppError {
    AppError::Network {
        timed_out: e.is_timeout(),
        cause: e.to_string(),
    }
}

/// Pulls `error.message` out of an error body, if there is one.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_API_ERROR.to_string())
}

/// Returns `choices[0].message.content` untouched.
fn first_choice_content(response: ChatCompletionResponse) -> Result<String, AppError> {
    let choices = match response.choices {
        Some(choices) => choices,
        None => {
            let detail = response
                .error
                .and_then(|e| e.message)
                .map(|m| format!("missing 'choices' field (upstream said: {m})"))
                .unwrap_or_else(|| "missing 'choices' field".to_string());
            return Err(AppError::MalformedResponse(detail));
        }
    };

    let first = choices
        .into_iter()
        .next()
        .ok_or_else(|| AppError::MalformedResponse("'choices' list is empty".into()))?;

    let content = first
        .message
        .and_then(|m| m.content)
        .ok_or_else(|| AppError::MalformedResponse("first choice has no message content".into()))?;

    if content.is_empty() {
        return Err(AppError::MalformedResponse(
            "first choice has empty message content".into(),
        ));
    }

    Ok(content)
}
