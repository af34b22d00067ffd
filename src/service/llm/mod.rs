pub mod openai;

use std::{ops::Deref, sync::Arc, time::Duration};

use async_trait::async_trait;

// Errors.

/// Failures of a single completion call.
///
/// `Timeout` is kept apart from everything else, since users are told about it
/// differently.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("AI request timed out after {0:?}")]
    Timeout(Duration),
    #[error("the response has no choices")]
    NoChoices,
    #[error("the response choice text is empty")]
    EmptyText,
    #[error(transparent)]
    Api(#[from] async_openai::error::OpenAIError),
}

impl LlmError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LlmError::Timeout(_))
    }
}

// Traits.

/// Generic LLM client trait that clients must implement.
///
/// Implementations apply their own request timeout.
#[async_trait]
pub trait GenericLlmClient: Send + Sync + 'static {
    /// Ask the model a question and get the response text.
    ///
    /// The `user_tag` is a stable identifier for the end user, which helps the
    /// provider to monitor and detect abuse.
    async fn complete(&self, prompt: &str, user_tag: &str) -> Result<String, LlmError>;
}

// Structs.

/// LLM client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct LlmClient {
    inner: Arc<dyn GenericLlmClient>,
}

impl Deref for LlmClient {
    type Target = dyn GenericLlmClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl LlmClient {
    pub fn new(inner: Arc<dyn GenericLlmClient>) -> Self {
        Self { inner }
    }
}
