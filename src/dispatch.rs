use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::queue::TimedQueue;
use crate::subscriptions::SubscriptionRegistry;
use crate::waapi::WaapiClient;

tokio::task_local! {
    /// Set for the whole lifetime of the dispatcher's consumer task; used
    /// to reject re-entrant submissions that would deadlock on their own
    /// reply.
    static CONSUMER_TASK: ();
}

/// Whether the current task is a dispatcher consumer.
#[must_use]
pub fn is_consumer_task() -> bool {
    CONSUMER_TASK.try_with(|()| ()).is_ok()
}

/// Result delivered on a call's reply channel.
pub type CallResult = Result<Value, AppError>;

/// A scheduled unit of work for the consumer.
enum Request {
    Call {
        uri: String,
        args: Option<Value>,
        options: Option<Value>,
        /// Single-slot reply; absent for fire-and-forget.
        reply: Option<oneshot::Sender<CallResult>>,
    },
    Subscribe {
        uri: String,
        options: Option<Value>,
        reply: oneshot::Sender<Result<Uuid, AppError>>,
    },
    Unsubscribe {
        id: Uuid,
        reply: oneshot::Sender<Result<bool, AppError>>,
    },
}

/// Tunables for the dispatcher and its queue.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Backpressure bound on the scheduled-request queue.
    pub max_queue_size: usize,
    /// Upper bound on the consumer's wait between stop-flag checks.
    pub poll_interval: Duration,
    /// How long `stop` waits for the consumer before abandoning it.
    pub shutdown_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 100_000,
            poll_interval: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

/// Single-consumer executor for Authoring API requests.
///
/// Many producers enqueue; exactly one long-lived task drains the timed
/// queue in `(due_at, seq)` order and performs the RPC. No other task
/// ever touches the WAAPI client's call/subscribe/unsubscribe surface.
pub struct Dispatcher {
    client: Arc<WaapiClient>,
    queue: Arc<TimedQueue<Request>>,
    registry: Arc<SubscriptionRegistry>,
    stop: Arc<AtomicBool>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    processed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl Dispatcher {
    /// Construct a dispatcher and start its consumer task.
    #[must_use]
    pub fn start(client: Arc<WaapiClient>, config: &DispatcherConfig) -> Arc<Self> {
        let queue = Arc::new(TimedQueue::new(config.max_queue_size, config.poll_interval));
        let registry = Arc::new(SubscriptionRegistry::new());
        let stop = Arc::new(AtomicBool::new(false));
        let processed = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicU64::new(0));

        let consumer = {
            let client = Arc::clone(&client);
            let queue = Arc::clone(&queue);
            let registry = Arc::clone(&registry);
            let stop = Arc::clone(&stop);
            let processed = Arc::clone(&processed);
            let failed = Arc::clone(&failed);
            tokio::spawn(CONSUMER_TASK.scope((), async move {
                consume(&client, &queue, &registry, &stop, &processed, &failed).await;
            }))
        };

        Arc::new(Self {
            client,
            queue,
            registry,
            stop,
            consumer: Mutex::new(Some(consumer)),
            processed,
            failed,
        })
    }

    /// Schedule a WAAPI call.
    ///
    /// `due_at` of `None` means as-soon-as-possible. Returns the reply
    /// receiver iff `want_reply`; fire-and-forget failures are logged by
    /// the consumer instead.
    ///
    /// # Errors
    ///
    /// `QueueFull` when the backpressure bound is hit, or an internal
    /// error when invoked from the consumer task itself.
    pub fn enqueue_call(
        &self,
        uri: &str,
        args: Option<Value>,
        options: Option<Value>,
        due_at: Option<Instant>,
        want_reply: bool,
    ) -> Result<Option<oneshot::Receiver<CallResult>>, AppError> {
        self.check_reentrancy()?;

        let (reply, reply_rx) = if want_reply {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        self.push(
            due_at,
            Request::Call {
                uri: uri.to_owned(),
                args,
                options,
                reply,
            },
        )?;
        Ok(reply_rx)
    }

    /// Schedule a topic subscription; the reply carries the new
    /// subscription id.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`enqueue_call`](Self::enqueue_call).
    pub fn enqueue_subscribe(
        &self,
        uri: &str,
        options: Option<Value>,
    ) -> Result<oneshot::Receiver<Result<Uuid, AppError>>, AppError> {
        self.check_reentrancy()?;
        let (reply, reply_rx) = oneshot::channel();
        self.push(
            None,
            Request::Subscribe {
                uri: uri.to_owned(),
                options,
                reply,
            },
        )?;
        Ok(reply_rx)
    }

    /// Schedule removal of a subscription; the reply carries whether the
    /// authoring app acknowledged it.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`enqueue_call`](Self::enqueue_call).
    pub fn enqueue_unsubscribe(
        &self,
        id: Uuid,
    ) -> Result<oneshot::Receiver<Result<bool, AppError>>, AppError> {
        self.check_reentrancy()?;
        let (reply, reply_rx) = oneshot::channel();
        self.push(None, Request::Unsubscribe { id, reply })?;
        Ok(reply_rx)
    }

    /// Non-blocking read of a subscription's buffered events.
    #[must_use]
    pub fn drain_events(&self, id: Uuid, max_count: Option<usize>, clear: bool) -> Vec<Value> {
        self.registry.drain(id, max_count, clear)
    }

    /// Ids of the currently registered subscriptions.
    #[must_use]
    pub fn subscription_ids(&self) -> Vec<Uuid> {
        self.registry.ids()
    }

    /// Whether the consumer task is still running.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        if self.stop.load(Ordering::Acquire) {
            return false;
        }
        self.consumer
            .lock()
            .expect("dispatcher consumer lock poisoned")
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Counters of completed and failed requests since start.
    #[must_use]
    pub fn stats(&self) -> (u64, u64) {
        (
            self.processed.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        )
    }

    /// Stop the consumer, discard queued work, and unsubscribe whatever
    /// is still registered.
    ///
    /// Waits up to `timeout` for the consumer to observe the stop flag
    /// (bounded by the queue's poll interval), then abandons it. Queued
    /// requests are dropped; their reply channels close and waiters see
    /// the dispatcher as gone. Closing the WAAPI client is the session
    /// manager's job.
    pub async fn stop(&self, timeout: Duration) {
        self.stop.store(true, Ordering::Release);
        self.queue.wake();

        let handle = self
            .consumer
            .lock()
            .expect("dispatcher consumer lock poisoned")
            .take();
        if let Some(handle) = handle {
            if tokio::time::timeout(timeout, handle).await.is_err() {
                warn!("dispatcher consumer did not stop in time; abandoning it");
            }
        }

        let discarded = self.queue.clear();
        if discarded > 0 {
            debug!(discarded, "dropped queued requests at shutdown");
        }

        for (id, sub_handle) in self.registry.remove_all() {
            match self.client.unsubscribe(sub_handle).await {
                Ok(_) => debug!(%id, "unsubscribed during shutdown"),
                Err(e) => warn!(%id, error = %e, "unsubscribe failed during shutdown"),
            }
        }
    }

    /// Reject submissions from the consumer task: the consumer waiting on
    /// its own reply would never drain the queue again.
    fn check_reentrancy(&self) -> Result<(), AppError> {
        if is_consumer_task() {
            return Err(AppError::internal(
                "request submitted from the dispatcher consumer task; \
                 RPC submissions must come from request handlers, not from \
                 within the dispatcher or its callbacks",
            ));
        }
        Ok(())
    }

    fn push(&self, due_at: Option<Instant>, request: Request) -> Result<(), AppError> {
        let due_at = due_at.unwrap_or_else(Instant::now);
        self.queue
            .put(due_at, request)
            .map_err(|e| AppError::queue_full(e.size, e.max))
    }
}

/// How many requests between periodic stats lines.
const STATS_EVERY: u64 = 500;

async fn consume(
    client: &WaapiClient,
    queue: &TimedQueue<Request>,
    registry: &SubscriptionRegistry,
    stop: &AtomicBool,
    processed: &AtomicU64,
    failed: &AtomicU64,
) {
    debug!("dispatcher consumer started");
    loop {
        let Some(request) = queue.pop_due(stop).await else {
            break;
        };

        match request {
            Request::Call {
                uri,
                args,
                options,
                reply,
            } => match client.call(&uri, args, options).await {
                Ok(value) => {
                    processed.fetch_add(1, Ordering::Relaxed);
                    if let Some(reply) = reply {
                        // The waiter may have timed out and gone; a failed
                        // send just drops the late reply.
                        let _ = reply.send(Ok(value));
                    }
                }
                Err(e) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    match reply {
                        Some(reply) => {
                            let _ = reply.send(Err(e.into()));
                        }
                        None => warn!(uri = %uri, error = %e, "fire-and-forget call failed"),
                    }
                }
            },
            Request::Subscribe {
                uri,
                options,
                reply,
            } => match client.subscribe(&uri, options).await {
                Ok((handle, events)) => {
                    processed.fetch_add(1, Ordering::Relaxed);
                    let id = registry.register(&uri, handle, events);
                    let _ = reply.send(Ok(id));
                }
                Err(e) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    let _ = reply.send(Err(e.into()));
                }
            },
            Request::Unsubscribe { id, reply } => match registry.remove(id) {
                Some((handle, _leftover)) => {
                    let acknowledged = match client.unsubscribe(handle).await {
                        Ok(ok) => ok,
                        Err(e) => {
                            warn!(%id, error = %e, "unsubscribe failed");
                            false
                        }
                    };
                    processed.fetch_add(1, Ordering::Relaxed);
                    let _ = reply.send(Ok(acknowledged));
                }
                None => {
                    let _ = reply.send(Ok(false));
                }
            },
        }

        let total = processed.load(Ordering::Relaxed) + failed.load(Ordering::Relaxed);
        if total > 0 && total % STATS_EVERY == 0 {
            debug!(
                processed = processed.load(Ordering::Relaxed),
                failed = failed.load(Ordering::Relaxed),
                "dispatcher stats"
            );
        }
    }
    debug!("dispatcher consumer exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::waapi::WaapiConfig;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    /// Mock authoring endpoint that acknowledges every call and reports
    /// the URIs it served, in order.
    async fn start_recording_server() -> (String, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (record_tx, record_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let record_tx = record_tx.clone();
                tokio::spawn(async move {
                    let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                    let (mut sink, mut source) = ws.split();
                    while let Some(Ok(Message::Text(text))) = source.next().await {
                        let frame: Value = serde_json::from_str(&text).unwrap();
                        if let Some(uri) = frame["uri"].as_str() {
                            let _ = record_tx.send(uri.to_owned());
                        }
                        let response = json!({"id": frame["id"], "result": {}});
                        let _ = sink.send(Message::Text(response.to_string().into())).await;
                    }
                });
            }
        });

        (format!("ws://{addr}"), record_rx)
    }

    async fn connect(url: &str) -> Arc<WaapiClient> {
        Arc::new(WaapiClient::connect(url, WaapiConfig::default()).await.unwrap())
    }

    fn small_config() -> DispatcherConfig {
        DispatcherConfig {
            max_queue_size: 16,
            poll_interval: Duration::from_millis(20),
            shutdown_timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn calls_run_in_due_order() {
        let (url, mut record_rx) = start_recording_server().await;
        let client = connect(&url).await;
        let dispatcher = Dispatcher::start(client, &small_config());

        let now = Instant::now();
        // Enqueued out of order; due times dictate execution order.
        dispatcher
            .enqueue_call("third", None, None, Some(now + Duration::from_millis(80)), false)
            .unwrap();
        dispatcher
            .enqueue_call("first", None, None, None, false)
            .unwrap();
        dispatcher
            .enqueue_call("second", None, None, Some(now + Duration::from_millis(40)), false)
            .unwrap();

        let mut served = Vec::new();
        for _ in 0..3 {
            let uri = tokio::time::timeout(Duration::from_secs(2), record_rx.recv())
                .await
                .unwrap()
                .unwrap();
            served.push(uri);
        }
        assert_eq!(served, ["first", "second", "third"]);

        dispatcher.stop(Duration::from_millis(500)).await;
    }

    #[tokio::test]
    async fn equal_due_times_keep_enqueue_order() {
        let (url, mut record_rx) = start_recording_server().await;
        let client = connect(&url).await;
        let dispatcher = Dispatcher::start(client, &small_config());

        let due = Instant::now() + Duration::from_millis(30);
        for uri in ["a", "b", "c", "d"] {
            dispatcher.enqueue_call(uri, None, None, Some(due), false).unwrap();
        }

        let mut served = Vec::new();
        for _ in 0..4 {
            served.push(record_rx.recv().await.unwrap());
        }
        assert_eq!(served, ["a", "b", "c", "d"]);

        dispatcher.stop(Duration::from_millis(500)).await;
    }

    #[tokio::test]
    async fn queue_full_rejects_surplus() {
        let (url, _record_rx) = start_recording_server().await;
        let client = connect(&url).await;
        let config = DispatcherConfig {
            max_queue_size: 4,
            ..small_config()
        };
        let dispatcher = Dispatcher::start(client, &config);

        // Far-future due times keep all four in the queue while we overflow.
        let due = Instant::now() + Duration::from_secs(60);
        for _ in 0..4 {
            dispatcher.enqueue_call("queued", None, None, Some(due), false).unwrap();
        }
        let err = dispatcher
            .enqueue_call("surplus", None, None, Some(due), false)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::QueueFull);
        assert_eq!(err.details["size"], 4);
        assert_eq!(err.details["max"], 4);

        dispatcher.stop(Duration::from_millis(500)).await;
    }

    #[tokio::test]
    async fn reply_carries_result() {
        let (url, _record_rx) = start_recording_server().await;
        let client = connect(&url).await;
        let dispatcher = Dispatcher::start(client, &small_config());

        let reply = dispatcher
            .enqueue_call("ak.wwise.core.getInfo", None, None, None, true)
            .unwrap()
            .unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), reply)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.unwrap(), json!({}));

        let (processed, failed) = dispatcher.stats();
        assert_eq!(processed, 1);
        assert_eq!(failed, 0);

        dispatcher.stop(Duration::from_millis(500)).await;
    }

    #[tokio::test]
    async fn consumer_task_cannot_enqueue() {
        let (url, _record_rx) = start_recording_server().await;
        let client = connect(&url).await;
        let dispatcher = Dispatcher::start(client, &small_config());

        // Simulate a submission from within the consumer's task scope.
        let dispatcher_clone = Arc::clone(&dispatcher);
        let err = CONSUMER_TASK
            .scope((), async move {
                dispatcher_clone
                    .enqueue_call("nested", None, None, None, true)
                    .unwrap_err()
            })
            .await;
        assert_eq!(err.kind, ErrorKind::Internal);

        dispatcher.stop(Duration::from_millis(500)).await;
    }

    #[tokio::test]
    async fn stop_discards_queued_requests() {
        let (url, mut record_rx) = start_recording_server().await;
        let client = connect(&url).await;
        let dispatcher = Dispatcher::start(client, &small_config());

        dispatcher
            .enqueue_call(
                "never",
                None,
                None,
                Some(Instant::now() + Duration::from_secs(60)),
                false,
            )
            .unwrap();

        dispatcher.stop(Duration::from_millis(500)).await;
        assert!(!dispatcher.is_alive());

        // Nothing was served.
        let served = tokio::time::timeout(Duration::from_millis(100), record_rx.recv()).await;
        assert!(served.is_err());
    }
}
