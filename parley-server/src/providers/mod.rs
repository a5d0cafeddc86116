mod ollama;
mod openai;

pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use std::fmt;

use async_trait::async_trait;
use parley_shared::{ChatMessage, ChatResponse};

use crate::error::ApiError;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Which backend a request is routed to. Selection is always explicit,
/// never inferred from the model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Ollama,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAi => write!(f, "openai"),
            Provider::Ollama => write!(f, "ollama"),
        }
    }
}

/// Generation parameters with defaults already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// One completion backend. Implementations translate the common turn list
/// into their provider's wire format, call it once, and normalize the reply.
/// They never retry; failures propagate to the caller as [`ApiError`].
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn provider(&self) -> Provider;

    /// Model used when the request doesn't name one.
    fn default_model(&self) -> &str;

    async fn generate(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<ChatResponse, ApiError>;
}
