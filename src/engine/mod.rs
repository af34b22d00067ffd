//! Event dispatch core for the bot.
//!
//! - [`event`]: inbound events and the sources that produce them.
//! - [`router`]: command/text classification and the handler registry.
//! - [`dispatcher`]: the bounded worker pool and its shutdown protocol.
//! - [`presence`]: the per-chat "typing" indicator for long-running handlers.

pub mod dispatcher;
pub mod event;
pub mod presence;
pub mod router;
