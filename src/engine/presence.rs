//! Per-chat "typing" presence while handlers are working.
//!
//! Each chat with at least one active handler is tracked in a [`PresenceState`]
//! with a reference count and the time the last signal was sent. A signal goes
//! out on the first acquire, and the background ticker repeats it for as long
//! as the chat stays active, never more often than the debounce interval.
//!
//! Entries are removed as soon as the count returns to zero, so a later
//! acquire starts fresh.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{base::types::ChatAction, service::chat::ChatClient};

/// Minimum spacing between two signals for the same chat.
pub const DEBOUNCE_INTERVAL: Duration = Duration::from_secs(3);

/// Period of the background resend ticker.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

// State.

#[derive(Debug, Default, Clone, Copy)]
struct ChatPresence {
    active: u32,
    last_sent: Option<Instant>,
}

/// Active-handler counts and last-signal times, keyed by chat id.
///
/// Owned by one coordinator; several coordinators never share a state.
#[derive(Debug)]
pub struct PresenceState {
    chats: RwLock<HashMap<i64, ChatPresence>>,
    debounce: Duration,
}

impl Default for PresenceState {
    fn default() -> Self {
        Self::new(DEBOUNCE_INTERVAL)
    }
}

impl PresenceState {
    pub fn new(debounce: Duration) -> Self {
        Self {
            chats: RwLock::new(HashMap::new()),
            debounce,
        }
    }

    /// Count one more active handler for the chat, returning the new count.
    pub fn increment(&self, chat_id: i64) -> u32 {
        let mut chats = self.chats.write();
        let chat = chats.entry(chat_id).or_default();
        chat.active += 1;
        chat.active
    }

    /// Count one handler fewer, returning the remaining count.
    ///
    /// The entry is removed when the count reaches zero. Returns `None` if the
    /// chat was not tracked.
    pub fn decrement(&self, chat_id: i64) -> Option<u32> {
        let mut chats = self.chats.write();
        let chat = chats.get_mut(&chat_id)?;

        chat.active = chat.active.saturating_sub(1);
        let remaining = chat.active;

        if remaining == 0 {
            chats.remove(&chat_id);
        }

        Some(remaining)
    }

    /// Decide whether a signal should go out for the chat at `now`, and if so
    /// record `now` as the last send.
    ///
    /// Untracked chats never get a signal. A tracked chat gets one when it has
    /// never been signalled, when more than the debounce interval has passed,
    /// or when `force` is set.
    pub fn try_mark_sent(&self, chat_id: i64, now: Instant, force: bool) -> bool {
        let mut chats = self.chats.write();
        let Some(chat) = chats.get_mut(&chat_id) else {
            return false;
        };

        let due = match chat.last_sent {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.debounce,
        };

        if !due && !force {
            return false;
        }

        chat.last_sent = Some(now);
        true
    }

    /// The number of active handlers for the chat.
    pub fn active(&self, chat_id: i64) -> u32 {
        self.chats.read().get(&chat_id).map(|chat| chat.active).unwrap_or_default()
    }

    /// Ids of every tracked chat.
    pub fn active_chats(&self) -> Vec<i64> {
        self.chats.read().keys().copied().collect()
    }

    /// Whether no chat is tracked.
    pub fn is_empty(&self) -> bool {
        self.chats.read().is_empty()
    }
}

// Coordinator.

struct PresenceInner {
    chat: ChatClient,
    action: ChatAction,
    state: PresenceState,
}

impl PresenceInner {
    /// Send a signal if the debounce rule allows it. The transport call
    /// happens outside the state lock; failures are only logged.
    async fn signal(&self, chat_id: i64, force: bool) {
        if !self.state.try_mark_sent(chat_id, Instant::now(), force) {
            return;
        }

        debug!("Sending `{}` to chat {chat_id}.", self.action);

        if let Err(err) = self.chat.send_chat_action(chat_id, self.action).await {
            warn!("Failed to send `{}` to chat {chat_id}: {err}", self.action);
        }
    }

    async fn tick(&self) {
        for chat_id in self.state.active_chats() {
            self.signal(chat_id, false).await;
        }
    }
}

struct Ticker {
    handle: JoinHandle<()>,
    stop: CancellationToken,
}

/// Keeps a presence action alive in chats with active handlers.
pub struct PresenceCoordinator {
    inner: Arc<PresenceInner>,
    ticker: Mutex<Option<Ticker>>,
    period: Duration,
}

impl PresenceCoordinator {
    /// Create a coordinator that shows "typing" using the default intervals.
    pub fn new(chat: ChatClient) -> Self {
        Self::with_state(chat, ChatAction::Typing, PresenceState::default(), TICK_INTERVAL)
    }

    /// Create a coordinator around an explicit state and ticker period.
    pub fn with_state(chat: ChatClient, action: ChatAction, state: PresenceState, period: Duration) -> Self {
        Self {
            inner: Arc::new(PresenceInner { chat, action, state }),
            ticker: Mutex::new(None),
            period,
        }
    }

    /// The tracked state.
    pub fn state(&self) -> &PresenceState {
        &self.inner.state
    }

    /// Start the background ticker. Does nothing if it is already running.
    pub fn start(&self) {
        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            return;
        }

        let stop = CancellationToken::new();
        let inner = self.inner.clone();
        let period = self.period;
        let cancelled = stop.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => inner.tick().await,
                }
            }

            debug!("Presence ticker stopped.");
        });

        info!("Presence ticker started.");
        *ticker = Some(Ticker { handle, stop });
    }

    /// Mark a handler as active in the chat and return its release guard.
    ///
    /// Sends the presence action right away unless one was sent for this chat
    /// within the debounce interval.
    pub async fn acquire(&self, chat_id: i64) -> PresenceGuard {
        let active = self.inner.state.increment(chat_id);
        debug!("Chat {chat_id} now has {active} active handlers.");

        self.inner.signal(chat_id, false).await;

        PresenceGuard {
            inner: self.inner.clone(),
            chat_id,
            released: AtomicBool::new(false),
        }
    }

    /// Stop the ticker and wait for it to exit.
    ///
    /// Outstanding guards stay valid; releasing them still updates the state.
    pub async fn shutdown(&self) {
        let Some(Ticker { handle, stop }) = self.ticker.lock().take() else {
            return;
        };

        stop.cancel();

        if let Err(err) = handle.await {
            warn!("Presence ticker ended abnormally: {err}");
        }

        info!("Presence ticker has been stopped.");
    }
}

/// Release token returned by [`PresenceCoordinator::acquire`].
///
/// The first call to [`release`](Self::release) decrements the chat's count;
/// later calls do nothing. Dropping an unreleased guard releases it.
pub struct PresenceGuard {
    inner: Arc<PresenceInner>,
    chat_id: i64,
    released: AtomicBool,
}

impl PresenceGuard {
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(remaining) = self.inner.state.decrement(self.chat_id) {
            debug!("Chat {} now has {remaining} active handlers.", self.chat_id);
        }
    }
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

// Tests.
