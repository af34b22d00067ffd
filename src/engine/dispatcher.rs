//! Bounded worker pool that fans inbound events out to handlers.
//!
//! An ingress task pulls events from the [`EventSource`], drops the ones that
//! should never be handled, and pushes the rest onto a bounded queue. A fixed
//! set of workers pull from that queue and run exactly one handler per event.
//!
//! Shutdown is close-and-drain: the source is stopped, the ingress task ends
//! and closes the queue, the workers finish whatever is still queued, and
//! [`Dispatcher::shutdown`] returns once every worker has exited.

use std::{
    any::Any,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::{
    base::types::{Res, Void},
    service::chat::ChatClient,
};

use super::{
    event::{EventSource, InboundEvent},
    router::{Request, Router},
};

type SharedQueue = Arc<tokio::sync::Mutex<mpsc::Receiver<InboundEvent>>>;

struct Running {
    ingress: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

/// Owns the queue and the worker pool.
pub struct Dispatcher {
    router: Arc<Router>,
    source: Arc<dyn EventSource>,
    chat: ChatClient,
    started: AtomicBool,
    running: Mutex<Option<Running>>,
}

impl Dispatcher {
    pub fn new(router: Router, source: Arc<dyn EventSource>, chat: ChatClient) -> Self {
        Self {
            router: Arc::new(router),
            source,
            chat,
            started: AtomicBool::new(false),
            running: Mutex::new(None),
        }
    }

    /// Allocate the queue, launch `pool_size` workers and the ingress task.
    ///
    /// A dispatcher can only be started once; later calls fail.
    pub fn start(&self, pool_size: usize, queue_capacity: usize) -> Void {
        if pool_size == 0 || queue_capacity == 0 {
            return Err(anyhow::anyhow!("Pool size and queue capacity must both be at least 1."));
        }

        if self.started.swap(true, Ordering::AcqRel) {
            error!("Dispatcher::start called more than once.");
            return Err(anyhow::anyhow!("The dispatcher has already been started."));
        }

        info!("Start listener with {pool_size} workers (queue capacity {queue_capacity}).");

        let (sender, receiver) = mpsc::channel(queue_capacity);
        let queue: SharedQueue = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..pool_size)
            .map(|worker_id| {
                let worker = worker_loop(worker_id, queue.clone(), self.router.clone(), self.chat.clone());
                tokio::spawn(worker.instrument(info_span!("worker", id = worker_id)))
            })
            .collect();

        let ingress = tokio::spawn(ingress_loop(self.source.clone(), sender).instrument(info_span!("ingress")));

        *self.running.lock() = Some(Running { ingress, workers });

        Ok(())
    }

    /// Stop the source, drain the queue, and wait for every worker to exit.
    ///
    /// Does nothing if the dispatcher is not running.
    pub async fn shutdown(&self) -> Void {
        let Some(Running { ingress, workers }) = self.running.lock().take() else {
            warn!("Dispatcher::shutdown called while not running.");
            return Ok(());
        };

        info!("Shutting down the dispatcher ...");
        self.source.stop();

        let mut failures = 0;

        if let Err(err) = ingress.await {
            error!("Ingress task ended abnormally: {err}");
            failures += 1;
        }

        for worker in workers {
            if let Err(err) = worker.await {
                error!("Worker task ended abnormally: {err}");
                failures += 1;
            }
        }

        info!("Listener has been stopped.");

        if failures > 0 {
            return Err(anyhow::anyhow!("{failures} dispatcher tasks ended abnormally."));
        }

        Ok(())
    }
}

/// Move events from the source onto the queue until the source ends.
///
/// Dropping `sender` on exit closes the queue.
async fn ingress_loop(source: Arc<dyn EventSource>, sender: mpsc::Sender<InboundEvent>) {
    while let Some(event) = source.next().await {
        if event.sender.is_bot {
            debug!("Ignoring message from bot {}.", event.sender.id);
            continue;
        }

        if !event.is_dispatchable() {
            debug!("Ignoring message {} without command or text.", event.message_id);
            continue;
        }

        // Blocks while the queue is full.
        if sender.send(event).await.is_err() {
            warn!("Queue closed while the source was still producing.");
            break;
        }
    }

    debug!("Event source ended; closing the queue.");
}

/// Serve events until the queue is closed and drained.
async fn worker_loop(worker_id: usize, queue: SharedQueue, router: Arc<Router>, chat: ChatClient) {
    info!("Worker #{worker_id} started.");

    loop {
        let event = { queue.lock().await.recv().await };
        let Some(event) = event else {
            break;
        };

        let Some((route, handler)) = router.resolve(&event) else {
            debug!("No handler for message {}; discarding.", event.message_id);
            continue;
        };

        debug!("Worker #{worker_id} handling {route:?} for chat {}.", event.chat_id);

        let request = Request::new(event, worker_id, chat.clone());
        if let Err(err) = supervised(handler.handle(request)).await {
            error!("Error while handling {route:?}: {err:#}");
        }
    }

    info!("Worker #{worker_id} ended.");
}

/// Run a handler future, turning a panic into an error.
pub async fn supervised<F>(future: F) -> Res<()>
where
    F: Future<Output = Res<()>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!("handler panicked: {}", panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::atomic::AtomicUsize, time::Duration};

    use async_trait::async_trait;

    use crate::{
        base::types::ChatAction,
        engine::event::{ChannelEventSource, Payload, Sender},
        service::chat::GenericChatClient,
    };

    use super::*;

    struct SilentChat;

    #[async_trait]
    impl GenericChatClient for SilentChat {
        async fn send_message(&self, _chat_id: i64, _text: &str) -> Void {
            Ok(())
        }

        async fn send_reply(&self, _chat_id: i64, _message_id: i64, _text: &str) -> Void {
            Ok(())
        }

        async fn send_chat_action(&self, _chat_id: i64, _action: ChatAction) -> Void {
            Ok(())
        }

        async fn forward_message(&self, _to_chat_id: i64, _from_chat_id: i64, _message_id: i64) -> Void {
            Ok(())
        }

        async fn webhook_url(&self) -> Res<Option<String>> {
            Ok(None)
        }
    }

    fn event(message_id: i64, payload: Payload) -> InboundEvent {
        InboundEvent {
            chat_id: 1,
            message_id,
            sender: Sender {
                id: 1,
                username: None,
                is_bot: false,
            },
            payload,
        }
    }

    fn text(message_id: i64) -> InboundEvent {
        event(message_id, Payload::Text(format!("message {message_id}")))
    }

    /// Records every handled message id and the worker that served it.
    #[derive(Default)]
    struct Recorder {
        seen: parking_lot::Mutex<Vec<(i64, usize)>>,
        in_flight: AtomicUsize,
    }

    fn recording_router(recorder: Arc<Recorder>, delay: Duration) -> Router {
        Router::new().text(move |request: Request| {
            let recorder = recorder.clone();
            async move {
                recorder.in_flight.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                recorder.seen.lock().push((request.event.message_id, request.worker_id));
                recorder.in_flight.fetch_sub(1, Ordering::SeqCst);
                Void::Ok(())
            }
        })
    }

    fn dispatcher(router: Router, capacity: usize) -> (Dispatcher, mpsc::Sender<InboundEvent>) {
        let (source, sender) = ChannelEventSource::new(capacity);
        let dispatcher = Dispatcher::new(router, Arc::new(source), ChatClient::new(Arc::new(SilentChat)));
        (dispatcher, sender)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_event_is_handled_exactly_once() {
        const EVENTS: i64 = 50;

        let recorder = Arc::new(Recorder::default());
        let (dispatcher, sender) = dispatcher(recording_router(recorder.clone(), Duration::from_millis(2)), EVENTS as usize);

        for id in 0..EVENTS {
            sender.send(text(id)).await.unwrap();
        }

        dispatcher.start(4, 3).unwrap();
        dispatcher.shutdown().await.unwrap();

        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), EVENTS as usize);

        let ids = seen.iter().map(|(id, _)| *id).collect::<HashSet<_>>();
        assert_eq!(ids.len(), EVENTS as usize);
        assert!(seen.iter().all(|(_, worker)| *worker < 4));
        assert_eq!(recorder.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_start_twice_is_an_error() {
        let (dispatcher, _sender) = dispatcher(Router::new(), 1);

        dispatcher.start(2, 2).unwrap();
        assert!(dispatcher.start(2, 2).is_err());

        dispatcher.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_rejects_empty_pool() {
        let (dispatcher, _sender) = dispatcher(Router::new(), 1);

        assert!(dispatcher.start(0, 2).is_err());
        assert!(dispatcher.start(2, 0).is_err());
    }

    #[tokio::test]
    async fn test_shutdown_without_start_is_a_no_op() {
        let (dispatcher, _sender) = dispatcher(Router::new(), 1);

        dispatcher.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bot_and_empty_events_are_dropped() {
        let recorder = Arc::new(Recorder::default());
        let (dispatcher, sender) = dispatcher(recording_router(recorder.clone(), Duration::ZERO), 8);

        let mut from_bot = text(1);
        from_bot.sender.is_bot = true;

        sender.send(from_bot).await.unwrap();
        sender.send(event(2, Payload::Empty)).await.unwrap();
        sender.send(text(3)).await.unwrap();

        dispatcher.start(2, 2).unwrap();
        dispatcher.shutdown().await.unwrap();

        let ids = recorder.seen.lock().iter().map(|(id, _)| *id).collect::<Vec<_>>();
        assert_eq!(ids, vec![3]);
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_kill_the_pool() {
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = handled.clone();

        let router = Router::new().text(move |request: Request| {
            let counter = counter.clone();
            async move {
                if request.event.message_id % 2 == 0 {
                    panic!("boom on {}", request.event.message_id);
                }
                counter.fetch_add(1, Ordering::SeqCst);
                Void::Ok(())
            }
        });

        let (dispatcher, sender) = dispatcher(router, 16);
        for id in 0..10 {
            sender.send(text(id)).await.unwrap();
        }

        // A single worker must survive all five panics.
        dispatcher.start(1, 4).unwrap();
        dispatcher.shutdown().await.unwrap();

        assert_eq!(handled.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_waits_for_in_flight_handlers() {
        let recorder = Arc::new(Recorder::default());
        let (dispatcher, sender) = dispatcher(recording_router(recorder.clone(), Duration::from_millis(200)), 4);

        sender.send(text(1)).await.unwrap();
        dispatcher.start(2, 2).unwrap();

        // Give the worker time to pick the event up.
        while recorder.in_flight.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        dispatcher.shutdown().await.unwrap();

        assert_eq!(recorder.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_supervised_converts_panics() {
        let ok = supervised(async { Ok(()) }).await;
        assert!(ok.is_ok());

        let failed = supervised(async { Err(anyhow::anyhow!("nope")) }).await;
        assert_eq!(failed.unwrap_err().to_string(), "nope");

        let panicked = supervised(async {
            if true {
                panic!("kaboom");
            }
            Ok(())
        })
        .await;
        assert!(panicked.unwrap_err().to_string().contains("kaboom"));
    }
}
