#![cfg(test)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use mockall::mock;
use parking_lot::Mutex;
use tg_ai_bot::{
    base::{
        config::{Config, ConfigInner},
        messages,
        types::{ChatAction, Res, Void},
    },
    engine::{
        event::{ChannelEventSource, InboundEvent, Payload, Sender},
        presence::PresenceCoordinator,
        router::{Request, Router},
    },
    interaction::build_router,
    runtime::Runtime,
    service::{
        chat::{ChatClient, GenericChatClient},
        llm::{GenericLlmClient, LlmClient, LlmError},
        stats::{Stats, hash_user_id},
    },
};

// Mocks.

mock! {
    pub Chat {}

    #[async_trait]
    impl GenericChatClient for Chat {
        async fn send_message(&self, chat_id: i64, text: &str) -> Void;
        async fn send_reply(&self, chat_id: i64, message_id: i64, text: &str) -> Void;
        async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Void;
        async fn forward_message(&self, to_chat_id: i64, from_chat_id: i64, message_id: i64) -> Void;
        async fn webhook_url(&self) -> Res<Option<String>>;
    }
}

mock! {
    pub Llm {}

    #[async_trait]
    impl GenericLlmClient for Llm {
        async fn complete(&self, prompt: &str, user_tag: &str) -> Result<String, LlmError>;
    }
}

/// Everything the mocked chat was asked to do.
#[derive(Default)]
struct Outbox {
    replies: Mutex<Vec<(i64, i64, String)>>,
    messages: Mutex<Vec<(i64, String)>>,
    actions: Mutex<Vec<(i64, ChatAction)>>,
    forwards: Mutex<Vec<(i64, i64, i64)>>,
}

impl Outbox {
    fn reply_texts(&self) -> Vec<String> {
        self.replies.lock().iter().map(|(_, _, text)| text.clone()).collect()
    }
}

/// A chat mock that records every call into the returned outbox.
fn get_mock_chat() -> (MockChat, Arc<Outbox>) {
    let outbox = Arc::new(Outbox::default());
    let mut mock = MockChat::new();

    let replies = outbox.clone();
    mock.expect_send_reply().returning(move |chat_id, message_id, text| {
        replies.replies.lock().push((chat_id, message_id, text.to_string()));
        Ok(())
    });

    let messages = outbox.clone();
    mock.expect_send_message().returning(move |chat_id, text| {
        messages.messages.lock().push((chat_id, text.to_string()));
        Ok(())
    });

    let actions = outbox.clone();
    mock.expect_send_chat_action().returning(move |chat_id, action| {
        actions.actions.lock().push((chat_id, action));
        Ok(())
    });

    let forwards = outbox.clone();
    mock.expect_forward_message().returning(move |to, from, message_id| {
        forwards.forwards.lock().push((to, from, message_id));
        Ok(())
    });

    mock.expect_webhook_url().returning(|| Ok(None));

    (mock, outbox)
}

/// An LLM mock that must never be called.
fn get_unused_llm() -> MockLlm {
    let mut mock = MockLlm::new();
    mock.expect_complete().never();
    mock
}

fn test_config(admin_chat_id: Option<i64>) -> Config {
    Config::from(ConfigInner {
        telegram_api_token: "123:test".to_string(),
        openai_api_key: "sk-test".to_string(),
        admin_chat_id,
        workers: 4,
        queue_capacity: 2,
        ..Default::default()
    })
}

fn event(chat_id: i64, message_id: i64, text: &str) -> InboundEvent {
    InboundEvent {
        chat_id,
        message_id,
        sender: Sender {
            id: 1001,
            username: Some("alice".to_string()),
            is_bot: false,
        },
        payload: Payload::parse(Some(text)),
    }
}

/// Helper to build the full router around mocked collaborators.
struct Harness {
    router: Router,
    chat: ChatClient,
    outbox: Arc<Outbox>,
    stats: Stats,
}

fn setup_test_environment(llm: MockLlm, admin_chat_id: Option<i64>) -> Harness {
    let (chat, outbox) = get_mock_chat();
    let chat = ChatClient::new(Arc::new(chat));
    let llm = LlmClient::new(Arc::new(llm));
    let stats = Stats::new(None);
    let presence = Arc::new(PresenceCoordinator::new(chat.clone()));

    let router = build_router(&test_config(admin_chat_id), llm, stats.clone(), presence);

    Harness { router, chat, outbox, stats }
}

impl Harness {
    /// Route and run one event on the given worker, as a worker would.
    async fn handle(&self, event: InboundEvent, worker_id: usize) -> Void {
        let Some((_, handler)) = self.router.resolve(&event) else {
            return Ok(());
        };

        handler.handle(Request::new(event, worker_id, self.chat.clone())).await
    }
}

// Command tests.

#[tokio::test]
async fn test_who_reports_worker_id() {
    let harness = setup_test_environment(get_unused_llm(), None);

    harness.handle(event(10, 5, "/who"), 2).await.unwrap();

    assert_eq!(*harness.outbox.replies.lock(), vec![(10, 5, "I am worker #2".to_string())]);
}

#[tokio::test]
async fn test_unknown_command_gets_not_found() {
    let harness = setup_test_environment(get_unused_llm(), None);

    harness.handle(event(10, 6, "/foo bar"), 0).await.unwrap();

    assert_eq!(harness.outbox.reply_texts(), vec!["Command not found.".to_string()]);
}

#[tokio::test]
async fn test_start_and_help_send_without_reply() {
    let harness = setup_test_environment(get_unused_llm(), None);

    harness.handle(event(10, 1, "/start"), 0).await.unwrap();
    harness.handle(event(10, 2, "/help@tg_ai_bot"), 0).await.unwrap();

    let messages = harness.outbox.messages.lock();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0], (10, messages::WELCOME.to_string()));
    assert_eq!(messages[1], (10, messages::HELP.to_string()));
    assert!(harness.outbox.replies.lock().is_empty());
}

#[tokio::test]
async fn test_me_shows_sender() {
    let harness = setup_test_environment(get_unused_llm(), None);

    harness.handle(event(10, 1, "/me"), 0).await.unwrap();

    assert_eq!(harness.outbox.reply_texts(), vec!["Username: alice\nUser ID: 1001".to_string()]);
}

#[tokio::test]
async fn test_feedback_paths() {
    let disabled = setup_test_environment(get_unused_llm(), None);
    disabled.handle(event(10, 1, "/feedback this is long enough text"), 0).await.unwrap();
    assert_eq!(disabled.outbox.reply_texts(), vec![messages::FEEDBACK_UNAVAILABLE.to_string()]);
    assert!(disabled.outbox.forwards.lock().is_empty());

    let enabled = setup_test_environment(get_unused_llm(), Some(-500));
    enabled.handle(event(10, 2, "/feedback too short"), 0).await.unwrap();
    enabled.handle(event(10, 3, "/feedback this is long enough text"), 0).await.unwrap();

    assert_eq!(
        enabled.outbox.reply_texts(),
        vec![messages::FEEDBACK_TOO_SHORT.to_string(), messages::FEEDBACK_DELIVERED.to_string()]
    );
    assert_eq!(*enabled.outbox.forwards.lock(), vec![(-500, 10, 3)]);
}

#[tokio::test]
async fn test_stats_command_renders_counters() {
    let harness = setup_test_environment(get_unused_llm(), None);

    harness.handle(event(10, 1, "x"), 0).await.unwrap();
    harness.handle(event(10, 2, "/stats"), 0).await.unwrap();

    let replies = harness.outbox.reply_texts();
    assert_eq!(replies.len(), 2);

    let rendered: serde_json::Value = serde_json::from_str(&replies[1]).unwrap();
    assert_eq!(rendered["ai_all_messages"], 1);
    assert_eq!(rendered["ai_invalid_errors"], 1);
}

// Free-text tests.

#[tokio::test]
async fn test_short_text_skips_the_llm() {
    let harness = setup_test_environment(get_unused_llm(), None);

    harness.handle(event(10, 1, "a"), 0).await.unwrap();

    assert_eq!(harness.outbox.reply_texts(), vec!["The message is too short.".to_string()]);
    assert!(harness.outbox.actions.lock().is_empty());
    assert_eq!(harness.stats.snapshot().common.ai_invalid_errors, 1);
}

#[tokio::test]
async fn test_long_text_skips_the_llm() {
    let harness = setup_test_environment(get_unused_llm(), None);

    harness.handle(event(10, 1, &"x".repeat(1025)), 0).await.unwrap();

    assert_eq!(harness.outbox.reply_texts(), vec!["The message is too long (max: 1024 characters).".to_string()]);
    assert!(harness.outbox.actions.lock().is_empty());
    assert_eq!(harness.stats.snapshot().common.ai_invalid_errors, 1);
}

#[tokio::test]
async fn test_text_is_answered_by_the_llm() {
    let mut llm = MockLlm::new();
    llm.expect_complete()
        .withf(|prompt, user_tag| prompt == "what is the answer?" && user_tag == "1001")
        .times(1)
        .returning(|_, _| Ok("42".to_string()));

    let harness = setup_test_environment(llm, None);

    harness.handle(event(10, 7, "what is the answer?"), 0).await.unwrap();

    assert_eq!(*harness.outbox.replies.lock(), vec![(10, 7, "42".to_string())]);
    assert_eq!(*harness.outbox.actions.lock(), vec![(10, ChatAction::Typing)]);

    let stats = harness.stats.snapshot();
    assert_eq!(stats.common.ai_responses, 1);
    assert_eq!(stats.users[&hash_user_id(1001)].ai_responses, 1);
}

#[tokio::test]
async fn test_llm_timeout_gets_distinct_reply() {
    let mut llm = MockLlm::new();
    llm.expect_complete().times(1).returning(|_, _| Err(LlmError::Timeout(Duration::from_secs(30))));

    let harness = setup_test_environment(llm, None);

    harness.handle(event(10, 1, "hello there"), 0).await.unwrap();

    assert_eq!(harness.outbox.reply_texts(), vec![messages::AI_TIMEOUT.to_string()]);
    assert_eq!(harness.stats.snapshot().common.ai_timeout_errors, 1);
}

#[tokio::test]
async fn test_llm_failure_gets_unavailable_reply() {
    let mut llm = MockLlm::new();
    llm.expect_complete().times(1).returning(|_, _| Err(LlmError::NoChoices));

    let harness = setup_test_environment(llm, None);

    harness.handle(event(10, 1, "hello there"), 0).await.unwrap();

    assert_eq!(harness.outbox.reply_texts(), vec![messages::AI_UNAVAILABLE.to_string()]);
    assert_eq!(harness.stats.snapshot().common.ai_errors, 1);
}

// End-to-end tests.

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_runtime_drains_all_events_on_shutdown() {
    let mut llm = MockLlm::new();
    llm.expect_complete().times(3).returning(|prompt, _| Ok(format!("echo: {prompt}")));

    let (chat, outbox) = get_mock_chat();
    let chat = ChatClient::new(Arc::new(chat));
    let (source, sender) = ChannelEventSource::new(16);

    let runtime = Runtime::with_services(test_config(None), chat, LlmClient::new(Arc::new(llm)), Arc::new(source))
        .await
        .unwrap();

    let mut from_bot = event(30, 99, "/who");
    from_bot.sender.is_bot = true;

    let events = vec![
        event(10, 1, "question one"),
        event(20, 2, "question two"),
        event(10, 3, "/who"),
        event(10, 4, "/foo"),
        event(30, 5, "question three"),
        event(30, 6, "?"),
        from_bot,
    ];
    for event in events {
        sender.send(event).await.unwrap();
    }

    // Shut down right away; everything already accepted must still be served.
    runtime.run_until(async {}).await.unwrap();

    let mut replies = outbox.replies.lock().clone();
    replies.sort_by_key(|(_, message_id, _)| *message_id);

    let ids = replies.iter().map(|(_, message_id, _)| *message_id).collect::<Vec<_>>();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);

    assert_eq!(replies[0].2, "echo: question one");
    assert!(replies[2].2.starts_with("I am worker #"));
    assert_eq!(replies[3].2, "Command not found.");
    assert_eq!(replies[5].2, "The message is too short.");

    let stats = runtime.stats.snapshot();
    assert_eq!(stats.common.ai_all_messages, 4);
    assert_eq!(stats.common.ai_responses, 3);
    assert!(runtime.presence.state().is_empty());
}

#[tokio::test]
async fn test_single_worker_runtime_is_worker_zero() {
    let (chat, outbox) = get_mock_chat();
    let (source, sender) = ChannelEventSource::new(4);
    let config = Config::from(ConfigInner {
        workers: 1,
        ..(*test_config(None).inner).clone()
    });

    let runtime = Runtime::with_services(config, ChatClient::new(Arc::new(chat)), LlmClient::new(Arc::new(get_unused_llm())), Arc::new(source))
        .await
        .unwrap();

    sender.send(event(10, 1, "/who")).await.unwrap();
    runtime.run_until(async {}).await.unwrap();

    assert_eq!(outbox.reply_texts(), vec!["I am worker #0".to_string()]);
}

#[tokio::test]
async fn test_runtime_persists_stats() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stats.json");

    let (chat, _outbox) = get_mock_chat();
    let (source, sender) = ChannelEventSource::new(4);
    let config = Config::from(ConfigInner {
        stats_file: Some(path.clone()),
        ..(*test_config(None).inner).clone()
    });

    let runtime = Runtime::with_services(config, ChatClient::new(Arc::new(chat)), LlmClient::new(Arc::new(get_unused_llm())), Arc::new(source))
        .await
        .unwrap();

    sender.send(event(10, 1, "a")).await.unwrap();
    runtime.run_until(async {}).await.unwrap();

    let reloaded = Stats::new(Some(path));
    reloaded.load().await.unwrap();
    assert_eq!(reloaded.snapshot().common.ai_invalid_errors, 1);
}
