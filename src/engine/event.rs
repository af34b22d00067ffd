//! Inbound chat events and the sources that produce them.

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

// Types.

/// The user who sent an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: i64,
    pub username: Option<String>,
    pub is_bot: bool,
}

/// What an event asks the bot to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A `/command` with its (possibly empty) arguments.
    Command { name: String, args: String },
    /// Free text.
    Text(String),
    /// Neither a command nor text (stickers, photos, service messages).
    Empty,
}

impl Payload {
    /// Classify a raw message text.
    ///
    /// `/name@bot rest of line` becomes a command named `name` with the
    /// arguments `rest of line`. A lone `/` is treated as text.
    pub fn parse(text: Option<&str>) -> Self {
        let Some(text) = text.filter(|t| !t.is_empty()) else {
            return Payload::Empty;
        };

        let Some(rest) = text.strip_prefix('/') else {
            return Payload::Text(text.to_string());
        };

        let (token, args) = match rest.find(char::is_whitespace) {
            Some(index) => {
                let (token, tail) = rest.split_at(index);
                let mut chars = tail.chars();
                chars.next();
                (token, chars.as_str())
            }
            None => (rest, ""),
        };

        let name = token.split('@').next().unwrap_or_default();
        if name.is_empty() {
            return Payload::Text(text.to_string());
        }

        Payload::Command {
            name: name.to_string(),
            args: args.to_string(),
        }
    }
}

/// One unit of incoming chat traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub chat_id: i64,
    pub message_id: i64,
    pub sender: Sender,
    pub payload: Payload,
}

impl InboundEvent {
    /// Whether the event should be queued for a worker at all.
    pub fn is_dispatchable(&self) -> bool {
        !self.sender.is_bot && self.payload != Payload::Empty
    }

    /// The command name, if this is a command.
    pub fn command(&self) -> Option<&str> {
        match &self.payload {
            Payload::Command { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The command arguments, or an empty string for non-commands.
    pub fn command_args(&self) -> &str {
        match &self.payload {
            Payload::Command { args, .. } => args,
            _ => "",
        }
    }

    /// The free text, if this is a text event.
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }
}

// Traits.

/// A sequential stream of inbound events.
///
/// `next` yields until an event is available or the source has been stopped,
/// in which case it returns `None` and keeps returning `None`.
#[async_trait]
pub trait EventSource: Send + Sync + 'static {
    /// Wait for the next event.
    async fn next(&self) -> Option<InboundEvent>;

    /// Terminate the stream. Idempotent.
    fn stop(&self);
}

// Structs.

/// In-process event source fed through a channel.
///
/// Events already accepted by the channel are still yielded after `stop`;
/// further sends are rejected.
pub struct ChannelEventSource {
    receiver: Mutex<mpsc::Receiver<InboundEvent>>,
    stopped: CancellationToken,
}

impl ChannelEventSource {
    /// Create a source and the sender that feeds it.
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<InboundEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);

        let source = Self {
            receiver: Mutex::new(receiver),
            stopped: CancellationToken::new(),
        };

        (source, sender)
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn next(&self) -> Option<InboundEvent> {
        let mut receiver = self.receiver.lock().await;

        tokio::select! {
            biased;
            event = receiver.recv() => event,
            _ = self.stopped.cancelled() => {
                receiver.close();
                receiver.recv().await
            }
        }
    }

    fn stop(&self) {
        self.stopped.cancel();
    }
}

// Tests.
