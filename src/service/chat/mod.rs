pub mod telegram;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{ChatAction, Res, Void};

// Traits.

/// Generic "chat" trait that transports must implement.
///
/// Every send may fail; callers log the failure and carry on.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Send a message to a chat.
    async fn send_message(&self, chat_id: i64, text: &str) -> Void;

    /// Send a message to a chat as a reply to one of its messages.
    async fn send_reply(&self, chat_id: i64, message_id: i64, text: &str) -> Void;

    /// Show a presence action (e.g., typing) in a chat.
    ///
    /// The platform clears the action after a few seconds, so long-running
    /// work must repeat it.
    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Void;

    /// Forward a message from one chat into another.
    async fn forward_message(&self, to_chat_id: i64, from_chat_id: i64, message_id: i64) -> Void;

    /// Get the currently configured webhook URL, if any.
    ///
    /// A webhook conflicts with long-polling for updates.
    async fn webhook_url(&self) -> Res<Option<String>>;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }
}
