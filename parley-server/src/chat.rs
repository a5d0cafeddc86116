use std::sync::Arc;

use parley_shared::{ChatMessage, ChatRequest, ChatResponse};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::history::HistoryStore;
use crate::providers::{
    ChatBackend, CompletionParams, Provider, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
};

/// Instruction turn prepended to every outbound request. Synthesized fresh
/// per call; it is never written to history.
const SYSTEM_PREAMBLE: &str =
    "You are a helpful assistant. Answer the user's questions clearly and concisely.";

/// Request orchestration over both backends.
///
/// One service handles every provider namespace. A request resolves its
/// conversation history, assembles the outbound turn sequence, dispatches to
/// the selected backend, and records the new user/assistant pair. The whole
/// span runs under the conversation's guard, so concurrent requests on one
/// id serialize while other conversations proceed.
pub struct ChatService {
    history: Arc<HistoryStore>,
    openai: Arc<dyn ChatBackend>,
    ollama: Arc<dyn ChatBackend>,
    history_warn_turns: usize,
}

impl ChatService {
    pub fn new(
        history: Arc<HistoryStore>,
        openai: Arc<dyn ChatBackend>,
        ollama: Arc<dyn ChatBackend>,
        history_warn_turns: usize,
    ) -> Self {
        Self {
            history,
            openai,
            ollama,
            history_warn_turns,
        }
    }

    fn backend(&self, provider: Provider) -> &dyn ChatBackend {
        match provider {
            Provider::OpenAi => self.openai.as_ref(),
            Provider::Ollama => self.ollama.as_ref(),
        }
    }

    /// Recorded turns for a conversation, `None` if the id has none.
    pub fn history(&self, conversation_id: &str) -> Option<Vec<ChatMessage>> {
        self.history.snapshot(conversation_id)
    }

    pub async fn complete(
        &self,
        provider: Provider,
        request: ChatRequest,
    ) -> Result<ChatResponse, ApiError> {
        if request.message.is_empty() {
            return Err(ApiError::Validation("No message provided".to_string()));
        }

        let backend = self.backend(provider);
        let params = CompletionParams {
            model: request
                .model
                .unwrap_or_else(|| backend.default_model().to_string()),
            temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        };
        let user_turn = ChatMessage::user(request.message);

        // Held across read, provider call and append; a concurrent request
        // on the same conversation cannot interleave and lose turns.
        let _guard = match request.conversation_id.as_deref() {
            Some(id) => Some(self.history.lock(id).await),
            None => None,
        };

        let prior = request
            .conversation_id
            .as_deref()
            .map(|id| self.history.get(id))
            .unwrap_or_default();
        if prior.len() > self.history_warn_turns {
            // The full history is still sent; nothing is ever truncated.
            warn!(
                "conversation {} has {} stored turns (warn threshold {})",
                request.conversation_id.as_deref().unwrap_or_default(),
                prior.len(),
                self.history_warn_turns
            );
        }

        let mut outbound = Vec::with_capacity(prior.len() + 2);
        outbound.push(ChatMessage::system(SYSTEM_PREAMBLE));
        outbound.extend(prior);
        outbound.push(user_turn.clone());

        info!(
            "{} chat: {} outbound turns, model {}",
            provider,
            outbound.len(),
            params.model
        );
        let response = backend.generate(&outbound, &params).await?;

        // Only a successful call is recorded, and only for callers that
        // asked for a conversation.
        if let Some(id) = request.conversation_id.as_deref() {
            self.history
                .append(id, vec![user_turn, response.message.clone()]);
        }

        Ok(response)
    }
}
