//! Command and text routing.
//!
//! The [`Router`] is built once before the dispatcher starts and is read-only
//! afterwards, so workers share it without locking.

use std::{collections::HashMap, future::Future, sync::Arc};

use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::{
    base::types::Void,
    service::chat::ChatClient,
};

use super::event::{InboundEvent, Payload};

// Traits.

/// Something that can serve one request.
///
/// Implemented directly by stateful handlers, and for free by any
/// `async fn(Request) -> Void` (or closure returning such a future).
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, request: Request) -> Void;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Void> + Send + 'static,
{
    async fn handle(&self, request: Request) -> Void {
        (self)(request).await
    }
}

// Structs.

/// A single event handed to a handler, along with the worker serving it.
#[derive(Clone)]
pub struct Request {
    pub event: Arc<InboundEvent>,
    pub worker_id: usize,
    chat: ChatClient,
}

impl Request {
    pub fn new(event: InboundEvent, worker_id: usize, chat: ChatClient) -> Self {
        Self {
            event: Arc::new(event),
            worker_id,
            chat,
        }
    }

    /// The transport this request arrived on.
    pub fn chat(&self) -> &ChatClient {
        &self.chat
    }

    /// Send a message as a reply to the triggering message.
    ///
    /// Failures are logged and swallowed.
    #[instrument(skip_all, fields(chat_id = self.event.chat_id))]
    pub async fn reply(&self, text: &str) {
        if let Err(err) = self.chat.send_reply(self.event.chat_id, self.event.message_id, text).await {
            warn!("Failed to send reply: {err}");
        }
    }

    /// Send a plain message to the originating chat.
    ///
    /// Failures are logged and swallowed.
    #[instrument(skip_all, fields(chat_id = self.event.chat_id))]
    pub async fn send(&self, text: &str) {
        if let Err(err) = self.chat.send_message(self.event.chat_id, text).await {
            warn!("Failed to send message: {err}");
        }
    }
}

/// How an event was classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Command(String),
    NotFound(String),
    Text,
}

/// Mapping from command name to handler, plus the fallbacks.
#[derive(Clone, Default)]
pub struct Router {
    commands: HashMap<String, Arc<dyn Handler>>,
    not_found: Option<Arc<dyn Handler>>,
    text: Option<Arc<dyn Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `/name`. Names are case-sensitive.
    pub fn command(mut self, name: impl Into<String>, handler: impl Handler) -> Self {
        let name = name.into();

        if self.commands.insert(name.clone(), Arc::new(handler)).is_some() {
            warn!("Command handler for `{name}` was registered twice; keeping the last one.");
        }

        self
    }

    /// Register the handler for unrecognized commands.
    pub fn not_found(mut self, handler: impl Handler) -> Self {
        self.not_found = Some(Arc::new(handler));
        self
    }

    /// Register the handler for free text.
    pub fn text(mut self, handler: impl Handler) -> Self {
        self.text = Some(Arc::new(handler));
        self
    }

    /// Select the single handler for an event, if any.
    pub fn resolve(&self, event: &InboundEvent) -> Option<(Route, Arc<dyn Handler>)> {
        match &event.payload {
            Payload::Command { name, .. } => match self.commands.get(name) {
                Some(handler) => Some((Route::Command(name.clone()), handler.clone())),
                None => self.not_found.clone().map(|handler| (Route::NotFound(name.clone()), handler)),
            },
            Payload::Text(_) => self.text.clone().map(|handler| (Route::Text, handler)),
            Payload::Empty => None,
        }
    }

    /// Names of the registered commands, sorted.
    pub fn command_names(&self) -> Vec<&str> {
        let mut names = self.commands.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}

// Tests.
