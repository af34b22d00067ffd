//! Usage statistics with optional file persistence.
//!
//! Counters are kept globally and per user. Users are stored under a hash of
//! their id, so the file never holds raw Telegram ids.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::{info, instrument};

use crate::base::types::{Res, Void};

// Types.

/// The outcome of one free-text message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Response,
    Invalid,
    Error,
    Timeout,
}

/// Counters shared by the global and per-user sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonStats {
    #[serde(default)]
    pub ai_all_messages: u32,
    #[serde(default)]
    pub ai_responses: u32,
    #[serde(default)]
    pub ai_invalid_errors: u32,
    #[serde(default)]
    pub ai_errors: u32,
    #[serde(default)]
    pub ai_timeout_errors: u32,
}

impl CommonStats {
    fn record(&mut self, outcome: Outcome) {
        self.ai_all_messages += 1;

        match outcome {
            Outcome::Response => self.ai_responses += 1,
            Outcome::Invalid => self.ai_invalid_errors += 1,
            Outcome::Error => self.ai_errors += 1,
            Outcome::Timeout => self.ai_timeout_errors += 1,
        }
    }
}

/// The full statistics document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsData {
    #[serde(flatten)]
    pub common: CommonStats,
    #[serde(default)]
    pub users: BTreeMap<String, CommonStats>,
}

// Structs.

struct StatsInner {
    data: RwLock<StatsData>,
    file: Option<PathBuf>,
}

/// Statistics store for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Stats {
    inner: Arc<StatsInner>,
}

impl Stats {
    pub fn new(file: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(StatsInner {
                data: RwLock::new(StatsData::default()),
                file,
            }),
        }
    }

    /// The backing file, if persistence is enabled.
    pub fn file(&self) -> Option<&std::path::Path> {
        self.inner.file.as_deref()
    }

    /// Count one message outcome for a user.
    pub fn record(&self, user_id: i64, outcome: Outcome) {
        let key = hash_user_id(user_id);
        let mut data = self.inner.data.write();

        data.common.record(outcome);
        data.users.entry(key).or_default().record(outcome);
    }

    /// A copy of the current counters.
    pub fn snapshot(&self) -> StatsData {
        self.inner.data.read().clone()
    }

    /// Pretty-printed JSON of all counters.
    pub fn render(&self) -> Res<String> {
        let data = self.inner.data.read();
        Ok(serde_json::to_string_pretty(&*data)?)
    }

    /// Load the counters from the file.
    ///
    /// A missing file is not an error: the counters start from zero.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Void {
        let Some(path) = self.file() else {
            return Err(anyhow::anyhow!("No statistics file is configured."));
        };

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("Statistics file `{}` does not exist yet.", path.display());
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let loaded: StatsData = serde_json::from_slice(&bytes)?;
        *self.inner.data.write() = loaded;

        Ok(())
    }

    /// Write the counters to the file.
    #[instrument(skip(self))]
    pub async fn save(&self) -> Void {
        let Some(path) = self.file() else {
            return Err(anyhow::anyhow!("No statistics file is configured."));
        };

        let json = self.render()?;
        tokio::fs::write(path, json).await?;

        Ok(())
    }
}

/// Hex SHA-1 of the decimal user id.
pub fn hash_user_id(user_id: i64) -> String {
    let digest = Sha1::digest(user_id.to_string().as_bytes());
    hex::encode(digest)
}

// Tests.
