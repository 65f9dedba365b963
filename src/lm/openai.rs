//! OpenAI-compatible chat completions client.
use super::ModelQuery;
use crate::config::OpenAiConfig;
use crate::util::truncate_string;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const RETRY_BACKOFF: Duration = Duration::from_millis(500);
const ERROR_BODY_BYTES: usize = 500;

pub struct OpenAiClient {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    model: String,
    system_prompt: String,
    max_tokens: u32,
    temperature: Option<f32>,
    max_retries: u32,
    retry_backoff: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// A failed attempt and whether trying again could help.
struct AttemptError {
    transient: bool,
    error: anyhow::Error,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set"))?
            .to_string();

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            agent,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
            retry_backoff: RETRY_BACKOFF,
        })
    }

    fn request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    fn attempt(&self, body: &ChatRequest<'_>) -> std::result::Result<String, AttemptError> {
        let mut response = self
            .agent
            .post(self.endpoint.as_str())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send_json(body)
            .map_err(|e| AttemptError {
                transient: true,
                error: anyhow!(e).context("send chat completion request"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.body_mut().read_to_string().unwrap_or_default();
            return Err(AttemptError {
                transient: status.as_u16() == 429 || status.is_server_error(),
                error: anyhow!(
                    "chat completion returned {}: {}",
                    status,
                    truncate_string(text.trim(), ERROR_BODY_BYTES)
                ),
            });
        }

        let parsed: ChatResponse = response.body_mut().read_json().map_err(|e| AttemptError {
            transient: false,
            error: anyhow!(e).context("decode chat completion response"),
        })?;
        extract_reply(parsed).map_err(|error| AttemptError {
            transient: false,
            error,
        })
    }
}

impl ModelQuery for OpenAiClient {
    fn query(&self, prompt: &str) -> Result<String> {
        let body = self.request(prompt);
        let mut attempt = 0;
        loop {
            match self.attempt(&body) {
                Ok(answer) => return Ok(answer),
                Err(failure) if failure.transient && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        error = %format!("{:#}", failure.error),
                        "chat completion failed; retrying"
                    );
                    std::thread::sleep(self.retry_backoff * attempt);
                }
                Err(failure) => {
                    return Err(failure.error).with_context(|| {
                        format!("chat completion failed after {} attempt(s)", attempt + 1)
                    })
                }
            }
        }
    }
}

fn extract_reply(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| anyhow!("chat completion contained no message content"))
}
