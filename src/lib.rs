//! Library root for `tg-ai-bot`.
//!
//! The bot relays Telegram messages to an OpenAI model:
//! - Slash commands are answered directly (`/start`, `/help`, `/who`, ...)
//! - Free text is validated and sent to the model, and the answer is replied
//! - The chat shows "typing" while the model is working
//!
//! Events are served by a fixed pool of workers behind a bounded queue, and
//! shutdown waits for queued and in-flight work to finish.

pub mod base;
pub mod engine;
pub mod interaction;
pub mod prelude;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the bot runtime:
/// - Creates the runtime context with the chat and LLM clients
/// - Serves events until a termination signal arrives
pub async fn start(config: Config) -> Void {
    info!("Starting tg-ai-bot ...");

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    info!("Exit.");

    Ok(())
}
