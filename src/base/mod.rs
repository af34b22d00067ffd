//! Core components, types, and utilities for the bot.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Reply copy shown to chat users.
//! - Common types and result handling.

pub mod config;
pub mod messages;
pub mod types;
