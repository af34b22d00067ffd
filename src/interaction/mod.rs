//! Handlers for user interactions.
//!
//! This module provides the bodies behind each route:
//! - Slash commands (`/start`, `/help`, `/feedback`, `/me`, `/who`, `/stats`)
//! - A fallback for unknown commands
//! - Free-text questions relayed to the LLM

pub mod ask;
pub mod commands;

use std::sync::Arc;

use crate::{
    base::config::Config,
    engine::{presence::PresenceCoordinator, router::Router},
    service::{llm::LlmClient, stats::Stats},
};

/// Build the router with every handler registered.
pub fn build_router(config: &Config, llm: LlmClient, stats: Stats, presence: Arc<PresenceCoordinator>) -> Router {
    Router::new()
        .command("start", commands::start)
        .command("help", commands::help)
        .command("feedback", commands::FeedbackHandler { admin_chat_id: config.admin_chat_id })
        .command("me", commands::me)
        .command("who", commands::who)
        .command("stats", commands::StatsHandler { stats: stats.clone() })
        .not_found(commands::not_found)
        .text(ask::AskHandler { llm, stats, presence })
}
