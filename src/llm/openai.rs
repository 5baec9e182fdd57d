use std::time::Duration;

use agent_core::{LlmError, LlmProvider, LlmRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LlmSettings;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_keys: Vec<String>,
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl OpenAiConfig {
    /// `None` when no API key is configured. Several keys may be given
    /// comma-separated; they are tried in order when one is rate limited.
    pub fn from_settings(settings: &LlmSettings) -> Option<Self> {
        let api_keys: Vec<String> = settings
            .api_key
            .as_deref()?
            .split(',')
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .collect();
        if api_keys.is_empty() {
            return None;
        }
        Some(Self {
            api_keys,
            model: settings.model.clone(),
            api_base: settings.api_base.clone(),
            temperature: settings.temperature,
            timeout: Duration::from_secs(settings.timeout_secs),
        })
    }
}

/// Chat-completions client in JSON mode.
pub struct OpenAiLlmProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiLlmProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        if config.api_keys.is_empty() {
            return Err(LlmError::unavailable("missing OpenAI API key"));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| LlmError::unavailable(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        )
    }

    fn body(&self, request: &LlmRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                r#type: "json_object".to_string(),
            },
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: format!(
                        "{}\nJSON schema of the reply:\n{}",
                        request.system_prompt, request.response_schema
                    ),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.instruction.clone(),
                },
            ],
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiLlmProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let url = self.endpoint();
        let body = self.body(request);

        let mut last_error: Option<LlmError> = None;
        for (index, key) in self.config.api_keys.iter().enumerate() {
            let sent = self
                .client
                .post(&url)
                .bearer_auth(key)
                .json(&body)
                .send()
                .await;
            let response = match sent {
                Ok(resp) => resp,
                Err(err) if err.is_timeout() => {
                    return Err(LlmError::Timeout(self.config.timeout.as_millis() as u64))
                }
                Err(err) => {
                    last_error = Some(LlmError::unavailable(format!(
                        "openai request failed: {err}"
                    )));
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<response unavailable>".to_string());
                if status.as_u16() == 429 {
                    let remaining = self.config.api_keys.len() - index - 1;
                    warn!(
                        target: "openai",
                        attempt = index + 1,
                        remaining,
                        "OpenAI rate limited interpretation request"
                    );
                    last_error = Some(LlmError::RateLimited(rate_limit_message(&text)));
                    if remaining > 0 {
                        continue;
                    }
                    break;
                }
                return Err(LlmError::unavailable(format!("openai returned {status}: {text}")));
            }

            let response: ChatCompletionResponse = response.json().await.map_err(|err| {
                LlmError::invalid_response(format!("openai response invalid: {err}"))
            })?;
            let content = response
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .filter(|content| !content.trim().is_empty())
                .ok_or_else(|| LlmError::invalid_response("openai response missing content"))?;
            debug!(target: "openai", chars = content.len(), "Completion received");
            return Ok(content);
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::unavailable("OpenAI request exhausted all API keys")))
    }
}

/// Pull `error.message` out of an OpenAI error body, else return it as is.
fn rate_limit_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .unwrap_or_else(|| body.trim().to_string())
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}
