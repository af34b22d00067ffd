//! Telegram Bot API transport for the bot.
//!
//! This module talks to the Bot API over plain JSON-over-HTTPS:
//! - Sending messages, replies, forwards, and chat actions
//! - Long-polling `getUpdates` for inbound messages
//! - Checking the webhook state at startup
//!
//! The [`TelegramEventSource`] turns the polled updates into [`InboundEvent`]s
//! for the dispatcher.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{ChatAction, Res, Void},
    },
    engine::event::{EventSource, InboundEvent, Payload, Sender},
};

use super::{ChatClient, GenericChatClient};

/// Pause between failed polls.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Margin added to the HTTP timeout on top of the long-poll timeout.
const HTTP_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

// Extra methods on `ChatClient` applied by the telegram implementation.

impl ChatClient {
    /// Creates a new Telegram chat client.
    pub fn telegram(api: TelegramApi) -> Self {
        Self::new(Arc::new(TelegramChatClient { api }))
    }
}

// Wire types.

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    from: Option<User>,
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    is_bot: bool,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct WebhookInfo {
    url: String,
}

impl Update {
    /// Convert into an inbound event; non-message updates and anonymous
    /// messages yield `None`.
    fn into_event(self) -> Option<InboundEvent> {
        let message = self.message?;
        let from = message.from?;

        Some(InboundEvent {
            chat_id: message.chat.id,
            message_id: message.message_id,
            sender: Sender {
                id: from.id,
                username: from.username,
                is_bot: from.is_bot,
            },
            payload: Payload::parse(message.text.as_deref()),
        })
    }
}

// Structs.

/// Thin Bot API caller shared by the chat client and the event source.
#[derive(Clone)]
pub struct TelegramApi {
    http: reqwest::Client,
    base_url: String,
}

impl TelegramApi {
    /// Create a new API caller from the configuration.
    #[instrument(name = "TelegramApi::new", skip_all)]
    pub fn new(config: &Config) -> Res<Self> {
        if config.telegram_api_token.is_empty() {
            return Err(anyhow::anyhow!("The Telegram API token is not set."));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.telegram_poll_timeout_secs) + HTTP_TIMEOUT_MARGIN)
            .build()?;

        let base_url = format!("{}/bot{}", config.telegram_api_url.trim_end_matches('/'), config.telegram_api_token);

        Ok(Self { http, base_url })
    }

    /// Call a Bot API method and unwrap the response envelope.
    async fn call<T>(&self, method: &str, body: &Value) -> Res<T>
    where
        T: DeserializeOwned,
    {
        let envelope: ApiEnvelope<T> = self.http.post(format!("{}/{method}", self.base_url)).json(body).send().await?.json().await?;

        if !envelope.ok {
            return Err(anyhow::anyhow!(
                "Telegram `{method}` failed ({}): {}",
                envelope.error_code.unwrap_or_default(),
                envelope.description.unwrap_or_default()
            ));
        }

        envelope.result.ok_or_else(|| anyhow::anyhow!("Telegram `{method}` returned no result."))
    }

    /// Long-poll for updates after `offset`.
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Res<Vec<Update>> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }
}

/// Telegram chat client implementation.
struct TelegramChatClient {
    api: TelegramApi,
}

#[async_trait]
impl GenericChatClient for TelegramChatClient {
    #[instrument(skip(self, text))]
    async fn send_message(&self, chat_id: i64, text: &str) -> Void {
        let _: Value = self.api.call("sendMessage", &json!({ "chat_id": chat_id, "text": text })).await?;
        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn send_reply(&self, chat_id: i64, message_id: i64, text: &str) -> Void {
        let _: Value = self
            .api
            .call(
                "sendMessage",
                &json!({
                    "chat_id": chat_id,
                    "text": text,
                    "reply_to_message_id": message_id,
                }),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Void {
        let _: Value = self.api.call("sendChatAction", &json!({ "chat_id": chat_id, "action": action.as_str() })).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn forward_message(&self, to_chat_id: i64, from_chat_id: i64, message_id: i64) -> Void {
        let _: Value = self
            .api
            .call(
                "forwardMessage",
                &json!({
                    "chat_id": to_chat_id,
                    "from_chat_id": from_chat_id,
                    "message_id": message_id,
                }),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn webhook_url(&self) -> Res<Option<String>> {
        let info: WebhookInfo = self.api.call("getWebhookInfo", &json!({})).await?;
        Ok(Some(info.url).filter(|url| !url.is_empty()))
    }
}

/// Poll cursor and the events fetched but not yet handed out.
#[derive(Default)]
struct PollState {
    offset: i64,
    pending: VecDeque<InboundEvent>,
}

/// Event source backed by `getUpdates` long-polling.
pub struct TelegramEventSource {
    api: TelegramApi,
    poll_timeout_secs: u64,
    state: Mutex<PollState>,
    stopped: CancellationToken,
}

impl TelegramEventSource {
    pub fn new(api: TelegramApi, config: &Config) -> Self {
        Self {
            api,
            poll_timeout_secs: config.telegram_poll_timeout_secs,
            state: Mutex::new(PollState::default()),
            stopped: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl EventSource for TelegramEventSource {
    async fn next(&self) -> Option<InboundEvent> {
        let mut state = self.state.lock().await;

        loop {
            if self.stopped.is_cancelled() {
                return None;
            }

            if let Some(event) = state.pending.pop_front() {
                return Some(event);
            }

            let poll = tokio::select! {
                _ = self.stopped.cancelled() => return None,
                poll = self.api.get_updates(state.offset, self.poll_timeout_secs) => poll,
            };

            match poll {
                Ok(updates) => {
                    debug!("Received {} updates.", updates.len());

                    for update in updates {
                        state.offset = update.update_id + 1;

                        if let Some(event) = update.into_event() {
                            state.pending.push_back(event);
                        }
                    }
                }
                Err(err) => {
                    warn!("Telegram poll failed, retrying: {err}");

                    tokio::select! {
                        _ = self.stopped.cancelled() => return None,
                        _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                    }
                }
            }
        }
    }

    fn stop(&self) {
        if !self.stopped.is_cancelled() {
            info!("Stop receiving updates.");
        }

        self.stopped.cancel();
    }
}

// Tests.
