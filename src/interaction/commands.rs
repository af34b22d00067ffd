//! Slash-command handlers.

use crate::{prelude::*, service::stats::Stats};

/// Minimum length of a `/feedback` message, in characters.
pub const MIN_FEEDBACK_CHARS: usize = 16;

/// `/start`: greet the user.
pub async fn start(request: Request) -> Void {
    request.send(messages::WELCOME).await;
    Ok(())
}

/// `/help`: explain what the bot does.
pub async fn help(request: Request) -> Void {
    request.send(messages::HELP).await;
    Ok(())
}

/// `/me`: show the sender's identity.
pub async fn me(request: Request) -> Void {
    let sender = &request.event.sender;
    let reply = messages::user_identity(sender.username.as_deref(), sender.id);

    request.reply(&reply).await;
    Ok(())
}

/// `/who`: show which worker served the request.
pub async fn who(request: Request) -> Void {
    request.reply(&messages::worker_identity(request.worker_id)).await;
    Ok(())
}

/// Fallback for unknown commands.
pub async fn not_found(request: Request) -> Void {
    request.reply(messages::COMMAND_NOT_FOUND).await;
    Ok(())
}

/// `/feedback <text>`: forward the message to the admin chat.
pub struct FeedbackHandler {
    pub admin_chat_id: Option<i64>,
}

#[async_trait]
impl Handler for FeedbackHandler {
    #[instrument(name = "FeedbackHandler::handle", skip_all)]
    async fn handle(&self, request: Request) -> Void {
        let Some(admin_chat_id) = self.admin_chat_id else {
            request.reply(messages::FEEDBACK_UNAVAILABLE).await;
            return Ok(());
        };

        if request.event.command_args().chars().count() < MIN_FEEDBACK_CHARS {
            request.reply(messages::FEEDBACK_TOO_SHORT).await;
            return Ok(());
        }

        request
            .chat()
            .forward_message(admin_chat_id, request.event.chat_id, request.event.message_id)
            .await
            .context("Failed to forward feedback")?;

        info!("Forwarded feedback from user {}.", request.event.sender.id);
        request.reply(messages::FEEDBACK_DELIVERED).await;

        Ok(())
    }
}

/// `/stats`: show the usage counters.
pub struct StatsHandler {
    pub stats: Stats,
}

#[async_trait]
impl Handler for StatsHandler {
    async fn handle(&self, request: Request) -> Void {
        match self.stats.render() {
            Ok(rendered) => request.reply(&rendered).await,
            Err(err) => {
                request.reply(messages::STATS_FAILED).await;
                return Err(err.context("Failed to render the stats"));
            }
        }

        Ok(())
    }
}
