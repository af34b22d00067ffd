//! Common imports for handler code.

pub use crate::{
    base::{
        config::Config,
        messages,
        types::{ChatAction, Err, Res, Void},
    },
    engine::router::{Handler, Request},
};
pub use anyhow::{Context, anyhow};
pub use async_trait::async_trait;
pub use tracing::{debug, error, info, instrument, warn};
