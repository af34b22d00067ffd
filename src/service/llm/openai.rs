//! OpenAI implementation of the completion client.
//!
//! A thin wrapper around `async-openai`: one chat completion per question,
//! bounded by the configured timeout. There are no retries.

use std::{sync::Arc, time::Duration};

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{ChatCompletionRequestMessage, ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs},
};
use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, instrument};

use crate::base::config::Config;

use super::{GenericLlmClient, LlmClient, LlmError};

// Extra methods on `LlmClient` applied by the openai implementation.

impl LlmClient {
    pub fn openai(config: &Config) -> Self {
        let client = OpenAiLlmClient::new(config);
        Self { inner: Arc::new(client) }
    }
}

// Specific implementations.

/// OpenAI LLM client implementation.
#[derive(Clone)]
pub struct OpenAiLlmClient {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl OpenAiLlmClient {
    /// Create a new OpenAI LLM client.
    #[instrument(name = "OpenAiLlmClient::new", skip_all)]
    pub fn new(config: &Config) -> Self {
        let cfg = OpenAIConfig::new().with_api_key(config.openai_api_key.clone());

        Self {
            client: Client::with_config(cfg),
            model: config.openai_model.clone(),
            max_tokens: config.openai_max_tokens,
            temperature: config.openai_temperature,
            timeout: Duration::from_secs(config.openai_timeout_secs),
        }
    }
}

#[async_trait]
impl GenericLlmClient for OpenAiLlmClient {
    #[instrument(name = "OpenAiLlmClient::complete", skip(self, prompt))]
    async fn complete(&self, prompt: &str, user_tag: &str) -> Result<String, LlmError> {
        let messages = vec![ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
            name: None,
        })];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_completion_tokens(self.max_tokens)
            .temperature(self.temperature)
            .user(user_tag)
            .build()?;

        let response = timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))??;

        debug!("Completion returned {} choices.", response.choices.len());

        let choice = response.choices.into_iter().next().ok_or(LlmError::NoChoices)?;
        let text = choice.message.content.unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::EmptyText);
        }

        Ok(text)
    }
}
