use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatch::{Dispatcher, DispatcherConfig};
use crate::error::AppError;
use crate::waapi::{WaapiClient, WaapiConfig};

/// Lifecycle of the single authoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Never connected.
    Idle,
    /// Tearing down the old pair and building a new one.
    Reconnecting,
    /// Client and dispatcher are live; calls are accepted.
    Connected,
    /// A connect failed or `disconnect` ran; an explicit `connect` is
    /// required before calls are accepted again.
    Disconnected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Per-call options: scheduling, reply mode, waiter timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    /// Delay from now before the dispatcher may perform the call.
    pub due_in: Option<Duration>,
    /// `false` turns the call into fire-and-forget: the step returns
    /// immediately and failures are only logged.
    pub no_wait: bool,
    /// Waiter timeout override; the session default applies otherwise.
    pub timeout: Option<Duration>,
}

/// Session-level tunables.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WAAPI endpoint, e.g. `ws://127.0.0.1:8080/waapi`.
    pub url: String,
    /// Default waiter timeout for request-reply calls.
    pub call_timeout: Duration,
    pub waapi: WaapiConfig,
    pub dispatcher: DispatcherConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/waapi".into(),
            call_timeout: Duration::from_secs(1),
            waapi: WaapiConfig::default(),
            dispatcher: DispatcherConfig::default(),
        }
    }
}

struct SessionInner {
    state: SessionState,
    client: Option<Arc<WaapiClient>>,
    dispatcher: Option<Arc<Dispatcher>>,
}

/// Owner of the single WAAPI connection and its dispatcher.
///
/// Thread-safe for concurrent tool invocations, but deliberately bound to
/// ONE authoring session: there is no multi-instance support. All state
/// transitions are serialized by the session lock; the lock is never held
/// across an await.
pub struct Session {
    config: SessionConfig,
    inner: Mutex<SessionInner>,
}

impl Session {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                client: None,
                dispatcher: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().expect("session lock poisoned")
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Snapshot of the reconnecting gate, used by callers that want to
    /// back off instead of erroring.
    #[must_use]
    pub fn is_reconnecting(&self) -> bool {
        self.state() == SessionState::Reconnecting
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        let inner = self.lock();
        inner.state == SessionState::Connected
            && inner.dispatcher.as_ref().is_some_and(|d| d.is_alive())
    }

    /// (Re)connect to the authoring application.
    ///
    /// Tears down any existing client and dispatcher, then constructs new
    /// ones. While the teardown/rebuild is in flight, concurrent calls
    /// fast-fail with `Reconnecting`; a concurrent `connect` is rejected
    /// the same way. Any failure leaves the session `Disconnected` with
    /// no automatic retry.
    ///
    /// # Errors
    ///
    /// `Reconnecting` when another connect is already in progress, or a
    /// `Transport` error when the endpoint cannot be reached.
    pub async fn connect(&self) -> Result<(), AppError> {
        // Phase 1: mark reconnecting and capture the old pair. Clearing
        // the pair inside the lock makes concurrent calls fail fast with
        // NotConnected/Reconnecting instead of racing the teardown.
        let (old_client, old_dispatcher) = {
            let mut inner = self.lock();
            if inner.state == SessionState::Reconnecting {
                warn!("reconnection already in progress");
                return Err(AppError::reconnecting()
                    .with_detail("reason", Value::String("connect already running".into())));
            }
            inner.state = SessionState::Reconnecting;
            (inner.client.take(), inner.dispatcher.take())
        };

        // Phase 2: tear down old resources outside the lock; teardown
        // failures are logged, not propagated.
        if let Some(dispatcher) = old_dispatcher {
            dispatcher.stop(self.config.dispatcher.shutdown_timeout).await;
            debug!("old dispatcher stopped");
        }
        if let Some(client) = old_client {
            match client.disconnect().await {
                Ok(()) => debug!("old client disconnected"),
                Err(e) => warn!(error = %e, "error disconnecting old client"),
            }
        }

        // Phase 3: build the new client.
        debug!(url = %self.config.url, "connecting to authoring app");
        let client = match WaapiClient::connect(&self.config.url, self.config.waapi.clone()).await
        {
            Ok(client) => Arc::new(client),
            Err(e) => {
                self.lock().state = SessionState::Disconnected;
                warn!(error = %e, "connection to authoring app failed");
                return Err(AppError::from(e)
                    .with_detail("url", Value::String(self.config.url.clone())));
            }
        };

        // Phase 4: start the new dispatcher.
        let dispatcher = Dispatcher::start(Arc::clone(&client), &self.config.dispatcher);

        // Phase 5: publish atomically and clear the reconnecting gate.
        {
            let mut inner = self.lock();
            inner.client = Some(client);
            inner.dispatcher = Some(dispatcher);
            inner.state = SessionState::Connected;
        }
        info!(url = %self.config.url, "authoring session connected");
        Ok(())
    }

    /// Connect only if there is no live session. Returns whether a new
    /// connection was made.
    ///
    /// # Errors
    ///
    /// Propagates [`connect`](Self::connect) failures.
    pub async fn ensure_connected(&self) -> Result<bool, AppError> {
        if self.is_connected() {
            return Ok(false);
        }
        self.connect().await?;
        Ok(true)
    }

    /// Stop the dispatcher (draining in-flight work) and close the
    /// client. Safe to call repeatedly and on a never-connected session.
    pub async fn disconnect(&self) {
        let (client, dispatcher) = {
            let mut inner = self.lock();
            inner.state = SessionState::Disconnected;
            (inner.client.take(), inner.dispatcher.take())
        };

        if let Some(dispatcher) = dispatcher {
            dispatcher.stop(self.config.dispatcher.shutdown_timeout).await;
        }
        if let Some(client) = client {
            match client.disconnect().await {
                Ok(()) => info!("authoring session disconnected"),
                Err(e) => warn!(error = %e, "error closing client"),
            }
        }
    }

    /// Thread-safe WAAPI call through the dispatcher.
    ///
    /// Scheduling and reply mode come from `opts`: a `due_in` delay turns
    /// the request into a scheduled call ordered by its due time, and
    /// `no_wait` makes it fire-and-forget (returns `Null` immediately).
    ///
    /// # Errors
    ///
    /// `Reconnecting` while a connect is in flight, `NotConnected` when
    /// there is no live session, `QueueFull` on backpressure, `Timeout`
    /// when the reply does not arrive within the waiter timeout, and
    /// `Call`/`Transport` errors from the authoring app.
    pub async fn call(
        &self,
        uri: &str,
        args: Option<Value>,
        options: Option<Value>,
        opts: CallOptions,
    ) -> Result<Value, AppError> {
        let dispatcher = self.live_dispatcher(uri)?;

        let due_at = opts.due_in.map(|d| Instant::now() + d);
        if let Some(due_in) = opts.due_in {
            debug!(uri, due_in_ms = due_in.as_millis() as u64, no_wait = opts.no_wait, "scheduling call");
        } else {
            debug!(uri, no_wait = opts.no_wait, "scheduling immediate call");
        }

        let reply = dispatcher.enqueue_call(uri, args, options, due_at, !opts.no_wait)?;
        let Some(reply) = reply else {
            return Ok(Value::Null);
        };

        let timeout = opts.timeout.unwrap_or(self.config.call_timeout);
        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(result)) => result,
            // Reply sender dropped without a value: the dispatcher was
            // stopped and the queued request discarded.
            Ok(Err(_)) => Err(AppError::not_connected()),
            Err(_) => {
                warn!(uri, timeout_ms = timeout.as_millis() as u64, "call timed out");
                Err(AppError::timeout(uri, timeout))
            }
        }
    }

    /// Register a topic subscription; returns its client-visible id.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`call`](Self::call).
    pub async fn subscribe(&self, uri: &str, options: Option<Value>) -> Result<Uuid, AppError> {
        let dispatcher = self.live_dispatcher(uri)?;
        let reply = dispatcher.enqueue_subscribe(uri, options)?;
        match tokio::time::timeout(self.config.call_timeout, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AppError::not_connected()),
            Err(_) => Err(AppError::timeout(uri, self.config.call_timeout)),
        }
    }

    /// Drop a topic subscription. Returns whether the authoring app
    /// acknowledged the removal; an unknown id yields `false`.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`call`](Self::call).
    pub async fn unsubscribe(&self, id: Uuid) -> Result<bool, AppError> {
        let dispatcher = self.live_dispatcher("unsubscribe")?;
        let reply = dispatcher.enqueue_unsubscribe(id)?;
        match tokio::time::timeout(self.config.call_timeout, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AppError::not_connected()),
            Err(_) => Err(AppError::timeout("unsubscribe", self.config.call_timeout)),
        }
    }

    /// Non-blocking read of a subscription's buffered events.
    ///
    /// # Errors
    ///
    /// `NotConnected`/`Reconnecting` when there is no live dispatcher.
    pub fn drain_events(
        &self,
        id: Uuid,
        max_count: Option<usize>,
        clear: bool,
    ) -> Result<Vec<Value>, AppError> {
        let dispatcher = self.live_dispatcher("drain_events")?;
        Ok(dispatcher.drain_events(id, max_count, clear))
    }

    /// Capture the live dispatcher under the session lock, enforcing the
    /// state gate.
    fn live_dispatcher(&self, uri: &str) -> Result<Arc<Dispatcher>, AppError> {
        let inner = self.lock();
        if inner.state == SessionState::Reconnecting {
            return Err(AppError::reconnecting().with_operation(uri));
        }
        let Some(dispatcher) = inner.dispatcher.as_ref() else {
            warn!(uri, "call attempted before connection established");
            return Err(AppError::not_connected().with_operation(uri));
        };
        if !dispatcher.is_alive() {
            warn!(uri, "dispatcher is not running");
            return Err(AppError::not_connected().with_operation(uri));
        }
        Ok(Arc::clone(dispatcher))
    }
}
