//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for the services used by the bot:
//! - Chat transport (e.g., Telegram)
//! - LLM completions (e.g., OpenAI)
//! - Usage statistics
//!
//! The chat and LLM modules define both generic traits and concrete
//! implementations, allowing for extensibility and easy testing.

pub mod chat;
pub mod llm;
pub mod stats;
