//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, path::PathBuf, sync::Arc};

use serde::Deserialize;

use super::types::Res;

/// Default Telegram Bot API base URL.
fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

/// Default long-poll timeout for `getUpdates`, in seconds.
fn default_telegram_poll_timeout_secs() -> u64 {
    30
}

/// Default OpenAI model to use.
fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Default max output tokens for the OpenAI model.
fn default_openai_max_tokens() -> u32 {
    512
}

/// Default sampling temperature for the OpenAI model.
fn default_openai_temperature() -> f32 {
    0.7
}

/// Default timeout applied to a single AI request, in seconds.
fn default_openai_timeout_secs() -> u64 {
    30
}

/// Number of message workers which process the messages in parallel.
fn default_workers() -> usize {
    4
}

/// Maximum number of events held in the queue consumed by the workers.
fn default_queue_capacity() -> usize {
    10
}

/// Configuration for the bot application.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<ConfigInner> for Config {
    fn from(inner: ConfigInner) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// Telegram bot token (`TG_BOT_TELEGRAM_API_TOKEN`).
    pub telegram_api_token: String,
    /// Telegram Bot API base URL (`TG_BOT_TELEGRAM_API_URL`).
    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,
    /// Long-poll timeout in seconds (`TG_BOT_TELEGRAM_POLL_TIMEOUT_SECS`).
    #[serde(default = "default_telegram_poll_timeout_secs")]
    pub telegram_poll_timeout_secs: u64,
    /// Chat that receives `/feedback` forwards (`TG_BOT_ADMIN_CHAT_ID`).
    /// The command is disabled when unset.
    #[serde(default)]
    pub admin_chat_id: Option<i64>,
    /// OpenAI API key (`TG_BOT_OPENAI_API_KEY`).
    pub openai_api_key: String,
    /// OpenAI model to use (`TG_BOT_OPENAI_MODEL`).
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    /// Max output tokens for the OpenAI model (`TG_BOT_OPENAI_MAX_TOKENS`).
    #[serde(default = "default_openai_max_tokens")]
    pub openai_max_tokens: u32,
    /// Sampling temperature (`TG_BOT_OPENAI_TEMPERATURE`).
    /// Value between 0 and 2. Higher values like 0.8 make output more random,
    /// while lower values like 0.2 make it more focused and deterministic.
    #[serde(default = "default_openai_temperature")]
    pub openai_temperature: f32,
    /// Per-request AI timeout in seconds (`TG_BOT_OPENAI_TIMEOUT_SECS`).
    #[serde(default = "default_openai_timeout_secs")]
    pub openai_timeout_secs: u64,
    /// Dispatcher pool size (`TG_BOT_WORKERS`).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Dispatcher queue capacity (`TG_BOT_QUEUE_CAPACITY`).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Optional statistics file (`TG_BOT_STATS_FILE`).
    #[serde(default)]
    pub stats_file: Option<PathBuf>,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            telegram_api_token: String::new(),
            telegram_api_url: default_telegram_api_url(),
            telegram_poll_timeout_secs: default_telegram_poll_timeout_secs(),
            admin_chat_id: None,
            openai_api_key: String::new(),
            openai_model: default_openai_model(),
            openai_max_tokens: default_openai_max_tokens(),
            openai_temperature: default_openai_temperature(),
            openai_timeout_secs: default_openai_timeout_secs(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            stats_file: None,
        }
    }
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("TG_BOT"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Check the value ranges that deserialization cannot express.
    pub fn validate(&self) -> Res<()> {
        if self.openai_temperature < 0.0 || self.openai_temperature > 2.0 {
            return Err(anyhow::anyhow!("OpenAI temperature must be between 0 and 2."));
        }

        if self.openai_max_tokens < 1 || self.openai_max_tokens > 128000 {
            return Err(anyhow::anyhow!("OpenAI max tokens must be between 1 and 128000."));
        }

        if self.openai_timeout_secs < 1 {
            return Err(anyhow::anyhow!("OpenAI timeout must be at least one second."));
        }

        if self.workers < 1 {
            return Err(anyhow::anyhow!("At least one worker is required."));
        }

        if self.queue_capacity < 1 {
            return Err(anyhow::anyhow!("Queue capacity must be at least 1."));
        }

        Ok(())
    }
}
