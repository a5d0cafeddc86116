use serde::{Deserialize, Serialize};

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Who authored a turn. Anything outside these three is rejected at
/// deserialization time, before it can reach a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Request from client to server.
///
/// `conversation_id` is a caller-chosen opaque key. When present, the server
/// keeps the conversation's turns and replays them on the next request; when
/// absent the call is a stateless one-shot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub conversation_id: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Token accounting as reported by the provider. Copied verbatim, never
/// recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub completion_tokens: u32,
    pub prompt_tokens: u32,
    pub total_tokens: u32,
}

/// Normalized completion returned to the client.
///
/// `usage` is `null` for backends that don't report token counts (Ollama);
/// the field is always present in the JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
    pub usage: Option<Usage>,
    pub model: String,
}

/// Recorded turns for one conversation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub conversation_id: String,
    pub messages: Vec<ChatMessage>,
    pub message_count: usize,
}

/// Model names a provider can serve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
}
