//! Free-text handler: relays a question to the LLM.
//!
//! The chat shows "typing" for as long as the completion is running.

use std::sync::Arc;

use crate::{
    engine::presence::PresenceCoordinator,
    prelude::*,
    service::{
        llm::LlmClient,
        stats::{Outcome, Stats},
    },
};

/// Shortest accepted question, in characters.
pub const MIN_TEXT_CHARS: usize = 2;

/// Longest accepted question, in characters.
pub const MAX_TEXT_CHARS: usize = 1024;

/// Check a question's length, returning the reply for a rejected one.
pub fn validate_text(text: &str) -> Result<(), &'static str> {
    let length = text.chars().count();

    if length < MIN_TEXT_CHARS {
        return Err(messages::TEXT_TOO_SHORT);
    }

    if length > MAX_TEXT_CHARS {
        return Err(messages::TEXT_TOO_LONG);
    }

    Ok(())
}

pub struct AskHandler {
    pub llm: LlmClient,
    pub stats: Stats,
    pub presence: Arc<PresenceCoordinator>,
}

#[async_trait]
impl Handler for AskHandler {
    #[instrument(name = "AskHandler::handle", skip_all, fields(chat_id = request.event.chat_id))]
    async fn handle(&self, request: Request) -> Void {
        let Some(text) = request.event.text() else {
            return Ok(());
        };
        let user_id = request.event.sender.id;

        if let Err(reply) = validate_text(text) {
            self.stats.record(user_id, Outcome::Invalid);
            request.reply(reply).await;
            return Ok(());
        }

        let answer = {
            let typing = self.presence.acquire(request.event.chat_id).await;
            let answer = self.llm.complete(text, &user_id.to_string()).await;
            typing.release();
            answer
        };

        match answer {
            Ok(answer) => {
                request.reply(&answer).await;
                self.stats.record(user_id, Outcome::Response);
            }
            Err(err) if err.is_timeout() => {
                warn!("AI request failed: {err}");
                request.reply(messages::AI_TIMEOUT).await;
                self.stats.record(user_id, Outcome::Timeout);
            }
            Err(err) => {
                warn!("AI request failed: {err}");
                request.reply(messages::AI_UNAVAILABLE).await;
                self.stats.record(user_id, Outcome::Error);
            }
        }

        Ok(())
    }
}

// Tests.
