use std::time::Duration;

use async_trait::async_trait;
use parley_shared::{ChatMessage, ChatResponse};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ChatBackend, CompletionParams, Provider};
use crate::error::ApiError;

/// Models advertised on the models endpoint. A static list; these would
/// normally be fetched from the server.
const DEFAULT_MODELS: &[&str] = &["llama3", "mistral", "gemma", "falcon", "phi3"];

/// Local adapter over the Ollama chat API.
///
/// Ollama's wire format differs from OpenAI's: the generation parameters are
/// nested under `options`, and the reply carries no token usage at all.
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    default_model: String,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Default, Deserialize)]
struct OllamaChatReply {
    #[serde(default)]
    message: OllamaReplyMessage,
}

#[derive(Debug, Default, Deserialize)]
struct OllamaReplyMessage {
    #[serde(default)]
    content: String,
}

impl OllamaBackend {
    pub fn new(
        base_url: impl Into<String>,
        default_model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_model: default_model.into(),
        }
    }

    /// Names served on the local models endpoint.
    pub fn models(&self) -> Vec<String> {
        DEFAULT_MODELS.iter().map(|m| m.to_string()).collect()
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<ChatResponse, ApiError> {
        let payload = OllamaChatRequest {
            model: &params.model,
            messages,
            stream: false,
            options: OllamaOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
            },
        };

        info!(
            "Requesting Ollama completion with model {} at {}",
            params.model, self.base_url
        );
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                ApiError::provider(
                    Provider::Ollama,
                    format!("error communicating with Ollama API: {err}"),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::provider(
                Provider::Ollama,
                format!("Ollama API returned error {status}: {body}"),
            ));
        }

        let reply: OllamaChatReply = response.json().await.map_err(|err| {
            ApiError::provider(
                Provider::Ollama,
                format!("unexpected response from Ollama API: {err}"),
            )
        })?;

        Ok(ChatResponse {
            message: ChatMessage::assistant(reply.message.content),
            // Ollama doesn't report token usage.
            usage: None,
            model: params.model.clone(),
        })
    }
}
