use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use parley_shared::{ChatMessage, ChatResponse, MessageRole, Usage};
use tracing::info;

use super::{ChatBackend, CompletionParams, Provider};
use crate::error::ApiError;

/// Cloud adapter over the OpenAI chat completions API.
///
/// Constructed without a client when no API key is configured; calls then
/// fail fast with a configuration error instead of ever hitting the network.
pub struct OpenAiBackend {
    client: Option<Client<OpenAIConfig>>,
    default_model: String,
}

impl OpenAiBackend {
    pub fn new(api_key: Option<String>, default_model: impl Into<String>) -> Self {
        let client = api_key.map(|key| {
            let config = OpenAIConfig::new().with_api_key(key);
            Client::with_config(config)
        });
        Self {
            client,
            default_model: default_model.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<ChatResponse, ApiError> {
        let client = self.client.as_ref().ok_or_else(|| {
            ApiError::Configuration(
                "OpenAI API key is not configured. Please set the OPENAI_API_KEY environment variable.".to_string(),
            )
        })?;

        let outbound = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()
            .map_err(as_provider_error)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&params.model)
            .messages(outbound)
            .temperature(params.temperature)
            .max_tokens(params.max_tokens)
            .build()
            .map_err(as_provider_error)?;

        info!("Requesting OpenAI completion with model {}", params.model);
        let response = client
            .chat()
            .create(request)
            .await
            .map_err(as_provider_error)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        // Token counts come straight from the provider's accounting.
        let usage = response.usage.map(|usage| Usage {
            completion_tokens: usage.completion_tokens,
            prompt_tokens: usage.prompt_tokens,
            total_tokens: usage.total_tokens,
        });

        Ok(ChatResponse {
            message: ChatMessage::assistant(content),
            usage,
            model: params.model.clone(),
        })
    }
}

fn to_request_message(msg: &ChatMessage) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let converted = match msg.role {
        MessageRole::System => ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(msg.content.clone())
                .build()?,
        ),
        MessageRole::User => ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(msg.content.clone())
                .build()?,
        ),
        MessageRole::Assistant => ChatCompletionRequestMessage::Assistant(
            ChatCompletionRequestAssistantMessageArgs::default()
                .content(msg.content.clone())
                .build()?,
        ),
    };
    Ok(converted)
}

fn as_provider_error(err: OpenAIError) -> ApiError {
    let detail = match &err {
        OpenAIError::ApiError(api_err) => format!(
            "{} (code: {:?}, type: {:?})",
            api_err.message, api_err.code, api_err.r#type
        ),
        other => other.to_string(),
    };
    ApiError::provider(Provider::OpenAi, detail)
}
