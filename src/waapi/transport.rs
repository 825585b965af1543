use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use super::error::WaapiError;
use super::types::{FrameKind, OutgoingFrame, RawFrame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Command sent from the client handle to the transport task.
pub enum TransportCommand {
    /// Invoke a WAAPI function and deliver the result via the oneshot.
    Call {
        uri: String,
        args: Option<Value>,
        options: Option<Value>,
        response_tx: oneshot::Sender<Result<Value, WaapiError>>,
        deadline: Instant,
    },
    /// Register a topic subscription; events flow into `event_tx`.
    Subscribe {
        uri: String,
        options: Option<Value>,
        event_tx: mpsc::Sender<Value>,
        response_tx: oneshot::Sender<Result<u64, WaapiError>>,
        deadline: Instant,
    },
    /// Drop a topic subscription.
    Unsubscribe {
        handle: u64,
        response_tx: oneshot::Sender<Result<bool, WaapiError>>,
        deadline: Instant,
    },
    /// Shut down the transport gracefully.
    Shutdown,
}

/// What to do with a response once it is correlated to its request.
enum PendingKind {
    Call {
        response_tx: oneshot::Sender<Result<Value, WaapiError>>,
    },
    Subscribe {
        response_tx: oneshot::Sender<Result<u64, WaapiError>>,
        event_tx: mpsc::Sender<Value>,
    },
    Unsubscribe {
        response_tx: oneshot::Sender<Result<bool, WaapiError>>,
        handle: u64,
    },
}

/// Tracks an in-flight request awaiting its response.
struct PendingRequest {
    kind: PendingKind,
    uri: String,
    deadline: Instant,
}

impl PendingRequest {
    /// Deliver a terminal error to whoever is waiting on this request.
    fn fail(self, err: WaapiError) {
        match self.kind {
            PendingKind::Call { response_tx } => {
                let _ = response_tx.send(Err(err));
            }
            PendingKind::Subscribe { response_tx, .. } => {
                let _ = response_tx.send(Err(err));
            }
            PendingKind::Unsubscribe { response_tx, .. } => {
                let _ = response_tx.send(Err(err));
            }
        }
    }
}

/// Clonable handle for communicating with the transport task.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    command_tx: mpsc::Sender<TransportCommand>,
    connected: Arc<AtomicBool>,
}

impl TransportHandle {
    /// Send a transport command to the background task.
    ///
    /// # Errors
    ///
    /// Returns `WaapiError::Internal` if the transport task has exited.
    pub async fn send(&self, cmd: TransportCommand) -> Result<(), WaapiError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| WaapiError::Internal("transport task is not running".into()))
    }

    /// Check whether the transport is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Spawn the transport background task.
///
/// Returns a `TransportHandle` for sending commands to the task. There is
/// no transport-level reconnect: when the connection drops, every pending
/// and subsequent request fails with `ConnectionClosed` until the session
/// manager builds a fresh client.
///
/// # Errors
///
/// Returns `WaapiError::Connection` or `WaapiError::ConnectionTimeout` if
/// the initial WebSocket connection cannot be established.
pub async fn spawn_transport(
    url: &str,
    channel_capacity: usize,
    connect_timeout: Duration,
) -> Result<TransportHandle, WaapiError> {
    let ws_stream = connect_ws(url, connect_timeout).await?;
    let connected = Arc::new(AtomicBool::new(true));
    let (command_tx, command_rx) = mpsc::channel(channel_capacity);

    let handle = TransportHandle {
        command_tx,
        connected: Arc::clone(&connected),
    };

    tokio::spawn(async move {
        let mut task = TransportTask {
            ws_stream,
            command_rx,
            pending: HashMap::new(),
            subscribers: HashMap::new(),
            connected,
            next_id: 0,
            closed: false,
        };
        task.run().await;
    });

    Ok(handle)
}

/// Establish a WebSocket connection with a timeout.
async fn connect_ws(url: &str, timeout: Duration) -> Result<WsStream, WaapiError> {
    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url)).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(WaapiError::Connection(e.to_string())),
        Err(_) => Err(WaapiError::ConnectionTimeout),
    }
}

/// The background transport task that owns the WebSocket connection.
struct TransportTask {
    ws_stream: WsStream,
    command_rx: mpsc::Receiver<TransportCommand>,
    pending: HashMap<u64, PendingRequest>,
    subscribers: HashMap<u64, mpsc::Sender<Value>>,
    connected: Arc<AtomicBool>,
    next_id: u64,
    closed: bool,
}

impl TransportTask {
    async fn run(&mut self) {
        loop {
            // After the peer closes, drain remaining commands with
            // ConnectionClosed until the owner sends Shutdown.
            if self.closed {
                match self.command_rx.recv().await {
                    Some(TransportCommand::Shutdown) | None => return,
                    Some(cmd) => {
                        fail_command(cmd, WaapiError::ConnectionClosed);
                        continue;
                    }
                }
            }

            let next_deadline = self.earliest_deadline();
            let timeout_sleep = async {
                if let Some(deadline) = next_deadline {
                    tokio::time::sleep_until(deadline).await;
                } else {
                    // No pending requests; sleep until cancelled by select
                    std::future::pending::<()>().await;
                }
            };

            tokio::select! {
                // Branch 1: WebSocket read
                ws_msg = self.ws_stream.next() => {
                    match ws_msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text_frame(&text);
                        }
                        Some(Ok(Message::Close(_)) | Err(_)) | None => {
                            self.handle_disconnect();
                        }
                        Some(Ok(_)) => {
                            // Binary, Ping, Pong, Frame
                        }
                    }
                }

                // Branch 2: Command channel
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(TransportCommand::Shutdown) | None => {
                            self.drain_pending();
                            let _ = self.ws_stream.close(None).await;
                            self.connected.store(false, Ordering::Relaxed);
                            return;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }

                // Branch 3: Deadline sweep
                () = timeout_sleep => {
                    self.sweep_timeouts();
                }
            }
        }
    }

    fn handle_text_frame(&mut self, text: &str) {
        let raw: RawFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(_) => {
                trace!("ignoring malformed frame from authoring app");
                return;
            }
        };

        match raw.classify() {
            Some(FrameKind::Response(response)) => {
                if let Some(pending) = self.pending.remove(&response.id) {
                    self.complete(pending, response.result);
                }
            }
            Some(FrameKind::Event {
                subscription_id,
                payload,
            }) => {
                self.dispatch_event(subscription_id, payload);
            }
            None => {
                trace!("ignoring unclassifiable frame from authoring app");
            }
        }
    }

    /// Route a correlated response to its waiter, updating subscription
    /// state for subscribe/unsubscribe acknowledgements.
    fn complete(&mut self, pending: PendingRequest, result: Result<Value, super::types::WireError>) {
        match pending.kind {
            PendingKind::Call { response_tx } => {
                let mapped = result.map_err(|e| WaapiError::Waapi {
                    uri: e.uri,
                    message: e.message,
                });
                let _ = response_tx.send(mapped);
            }
            PendingKind::Subscribe {
                response_tx,
                event_tx,
            } => match result {
                Ok(value) => match value.get("subscriptionId").and_then(Value::as_u64) {
                    Some(sid) => {
                        self.subscribers.insert(sid, event_tx);
                        let _ = response_tx.send(Ok(sid));
                    }
                    None => {
                        let _ = response_tx.send(Err(WaapiError::InvalidResponse(
                            "subscribe response missing subscriptionId".into(),
                        )));
                    }
                },
                Err(e) => {
                    let _ = response_tx.send(Err(WaapiError::Waapi {
                        uri: e.uri,
                        message: e.message,
                    }));
                }
            },
            PendingKind::Unsubscribe {
                response_tx,
                handle,
            } => match result {
                Ok(_) => {
                    self.subscribers.remove(&handle);
                    let _ = response_tx.send(Ok(true));
                }
                Err(e) => {
                    warn!(handle, error = %e.message, "unsubscribe rejected by authoring app");
                    let _ = response_tx.send(Ok(false));
                }
            },
        }
    }

    /// Push a subscription event into its buffer without blocking.
    ///
    /// When the buffer is full the event is dropped (drop-newest): this is
    /// an observability stream, not a reliable log, and the read loop must
    /// never stall on a slow consumer.
    fn dispatch_event(&mut self, subscription_id: u64, payload: Value) {
        if let Some(tx) = self.subscribers.get(&subscription_id) {
            if tx.is_closed() {
                self.subscribers.remove(&subscription_id);
            } else if tx.try_send(payload).is_err() {
                trace!(subscription_id, "subscription buffer full; event dropped");
            }
        }
    }

    async fn handle_command(&mut self, cmd: TransportCommand) {
        match cmd {
            TransportCommand::Call {
                uri,
                args,
                options,
                response_tx,
                deadline,
            } => {
                let id = self.next_pending_id();
                let frame = OutgoingFrame::Call {
                    id,
                    uri: uri.clone(),
                    args,
                    options,
                };
                self.send_frame(
                    id,
                    &frame,
                    PendingRequest {
                        kind: PendingKind::Call { response_tx },
                        uri,
                        deadline,
                    },
                )
                .await;
            }
            TransportCommand::Subscribe {
                uri,
                options,
                event_tx,
                response_tx,
                deadline,
            } => {
                let id = self.next_pending_id();
                let frame = OutgoingFrame::Subscribe {
                    id,
                    subscribe: uri.clone(),
                    options,
                };
                self.send_frame(
                    id,
                    &frame,
                    PendingRequest {
                        kind: PendingKind::Subscribe {
                            response_tx,
                            event_tx,
                        },
                        uri,
                        deadline,
                    },
                )
                .await;
            }
            TransportCommand::Unsubscribe {
                handle,
                response_tx,
                deadline,
            } => {
                let id = self.next_pending_id();
                let frame = OutgoingFrame::Unsubscribe {
                    id,
                    unsubscribe: handle,
                };
                self.send_frame(
                    id,
                    &frame,
                    PendingRequest {
                        kind: PendingKind::Unsubscribe {
                            response_tx,
                            handle,
                        },
                        uri: format!("unsubscribe:{handle}"),
                        deadline,
                    },
                )
                .await;
            }
            TransportCommand::Shutdown => unreachable!("handled by caller"),
        }
    }

    fn next_pending_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    async fn send_frame(&mut self, id: u64, frame: &OutgoingFrame, pending: PendingRequest) {
        let json = match serde_json::to_string(frame) {
            Ok(j) => j,
            Err(e) => {
                pending.fail(WaapiError::Internal(format!("serialization error: {e}")));
                return;
            }
        };

        debug!(uri = %pending.uri, "sending frame to authoring app");
        if let Err(e) = self.ws_stream.send(Message::Text(json.into())).await {
            pending.fail(WaapiError::Connection(format!(
                "WebSocket write error: {e}"
            )));
            return;
        }

        self.pending.insert(id, pending);
    }

    fn earliest_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    fn sweep_timeouts(&mut self) {
        let now = Instant::now();
        let timed_out: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(&id, _)| id)
            .collect();

        for id in timed_out {
            if let Some(pending) = self.pending.remove(&id) {
                let uri = pending.uri.clone();
                pending.fail(WaapiError::CallTimeout { uri });
            }
        }
    }

    fn drain_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for (_, req) in pending {
            req.fail(WaapiError::ConnectionClosed);
        }
    }

    fn handle_disconnect(&mut self) {
        warn!("authoring app closed the connection");
        self.connected.store(false, Ordering::Relaxed);
        self.closed = true;
        self.drain_pending();
        self.subscribers.clear();
    }
}

/// Fail a command that arrived after the connection closed.
fn fail_command(cmd: TransportCommand, err: WaapiError) {
    match cmd {
        TransportCommand::Call { response_tx, .. } => {
            let _ = response_tx.send(Err(err));
        }
        TransportCommand::Subscribe { response_tx, .. } => {
            let _ = response_tx.send(Err(err));
        }
        TransportCommand::Unsubscribe { response_tx, .. } => {
            let _ = response_tx.send(Err(err));
        }
        TransportCommand::Shutdown => {}
    }
}
