//! Runtime services and shared state for the bot.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    engine::{dispatcher::Dispatcher, event::EventSource, presence::PresenceCoordinator},
    interaction,
    service::{
        chat::{
            ChatClient,
            telegram::{TelegramApi, TelegramEventSource},
        },
        llm::LlmClient,
        stats::Stats,
    },
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the clients, the statistics, and configuration.
/// It is designed to be trivially cloneable.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The chat transport.
    pub chat: ChatClient,
    /// The LLM client instance.
    pub llm: LlmClient,
    /// Usage statistics.
    pub stats: Stats,
    /// Typing indicator shared by all handlers.
    pub presence: Arc<PresenceCoordinator>,
    /// Where inbound events come from.
    pub source: Arc<dyn EventSource>,
}

impl Runtime {
    /// Create a new runtime instance backed by Telegram and OpenAI.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the Telegram transport.
        let api = TelegramApi::new(&config)?;
        let chat = ChatClient::telegram(api.clone());
        let source: Arc<dyn EventSource> = Arc::new(TelegramEventSource::new(api, &config));

        // Long-polling does not work while a webhook is set.
        if let Some(url) = chat.webhook_url().await? {
            return Err(anyhow::anyhow!(
                "Conflict: can't use getUpdates while a webhook ({url}) is active; delete the webhook and try again."
            ));
        }

        // Initialize the LLM client.
        let llm = LlmClient::openai(&config);

        Self::with_services(config, chat, llm, source).await
    }

    /// Create a runtime around already-built services.
    pub async fn with_services(config: Config, chat: ChatClient, llm: LlmClient, source: Arc<dyn EventSource>) -> Res<Self> {
        let stats = Stats::new(config.stats_file.clone());

        if let Some(path) = stats.file() {
            info!("Load the statistics from the file ({}) ...", path.display());
            stats.load().await?;
        }

        let presence = Arc::new(PresenceCoordinator::new(chat.clone()));

        Ok(Self {
            config,
            chat,
            llm,
            stats,
            presence,
            source,
        })
    }

    /// Build the dispatcher wired to this runtime's handlers.
    pub fn dispatcher(&self) -> Dispatcher {
        let router = interaction::build_router(&self.config, self.llm.clone(), self.stats.clone(), self.presence.clone());
        Dispatcher::new(router, self.source.clone(), self.chat.clone())
    }

    /// Serve events until `shutdown` resolves, then stop everything in order.
    pub async fn run_until<F>(&self, shutdown: F) -> Void
    where
        F: Future<Output = ()>,
    {
        let dispatcher = self.dispatcher();

        self.presence.start();

        if let Err(err) = dispatcher.start(self.config.workers, self.config.queue_capacity) {
            self.presence.shutdown().await;
            return Err(err);
        }

        shutdown.await;
        info!("Graceful shutdown in progress ...");

        let drained = dispatcher.shutdown().await;
        self.presence.shutdown().await;

        if self.stats.file().is_some() {
            info!("Write the statistics to the file ...");
            if let Err(err) = self.stats.save().await {
                warn!("Failed to write the statistics: {err}");
            }
        }

        drained
    }

    /// Serve events until SIGINT or SIGTERM.
    pub async fn start(&self) -> Void {
        self.run_until(shutdown_signal()).await
    }
}

/// Resolve on the first termination signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
