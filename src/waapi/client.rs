use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant};

use super::error::WaapiError;
use super::transport::{TransportCommand, TransportHandle, spawn_transport};

/// Opaque id the authoring app assigned to a live subscription.
pub type SubscriptionHandle = u64;

/// Configuration for a WAAPI client connection.
#[derive(Debug, Clone)]
pub struct WaapiConfig {
    /// Timeout for the initial WebSocket connection (default: 10s).
    pub connect_timeout: Duration,
    /// Transport-level deadline for individual calls (default: 30s).
    ///
    /// This is a backstop against an authoring app that never answers;
    /// callers normally give up much earlier on their reply channel.
    pub call_timeout: Duration,
    /// Capacity of the internal command channel (default: 256).
    pub channel_capacity: usize,
    /// Capacity of each subscription's event buffer (default: 256).
    /// When full, newest events are dropped.
    pub event_capacity: usize,
}

impl Default for WaapiConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(30),
            channel_capacity: 256,
            event_capacity: 256,
        }
    }
}

/// A WAAPI client connected to the Wwise authoring application.
///
/// This is the entry point for invoking Authoring API functions and
/// registering topic subscriptions. It communicates with a background
/// transport task that owns the WebSocket connection; the dispatcher is
/// the only component that calls these methods once a session is up.
#[derive(Debug)]
pub struct WaapiClient {
    handle: TransportHandle,
    config: WaapiConfig,
    url: String,
}

impl WaapiClient {
    /// Connect to a WAAPI WebSocket endpoint.
    ///
    /// # Errors
    ///
    /// Returns `WaapiError::Connection` if the WebSocket handshake fails,
    /// or `WaapiError::ConnectionTimeout` if the attempt exceeds the
    /// configured timeout.
    pub async fn connect(url: &str, config: WaapiConfig) -> Result<Self, WaapiError> {
        let handle = spawn_transport(url, config.channel_capacity, config.connect_timeout).await?;

        Ok(Self {
            handle,
            config,
            url: url.to_owned(),
        })
    }

    /// Invoke a WAAPI function and await its result.
    ///
    /// # Errors
    ///
    /// Returns `WaapiError::Waapi` if the authoring app rejects the call,
    /// `WaapiError::CallTimeout` if it does not answer within the
    /// transport deadline, or a connection error if the link is down.
    pub async fn call(
        &self,
        uri: &str,
        args: Option<Value>,
        options: Option<Value>,
    ) -> Result<Value, WaapiError> {
        let (response_tx, response_rx) = oneshot::channel();
        let deadline = Instant::now() + self.config.call_timeout;

        self.handle
            .send(TransportCommand::Call {
                uri: uri.to_owned(),
                args,
                options,
                response_tx,
                deadline,
            })
            .await?;

        response_rx
            .await
            .map_err(|_| WaapiError::Internal("transport task exited before responding".into()))?
    }

    /// Register a topic subscription.
    ///
    /// Returns the authoring app's subscription handle plus a bounded
    /// receiver of event payloads. The transport pushes events with a
    /// non-blocking send and drops the newest on overflow, so a stalled
    /// reader can never wedge the read loop.
    ///
    /// # Errors
    ///
    /// Returns `WaapiError::Waapi` if the topic is rejected, or a
    /// connection error if the link is down.
    pub async fn subscribe(
        &self,
        uri: &str,
        options: Option<Value>,
    ) -> Result<(SubscriptionHandle, mpsc::Receiver<Value>), WaapiError> {
        let (event_tx, event_rx) = mpsc::channel(self.config.event_capacity);
        let (response_tx, response_rx) = oneshot::channel();
        let deadline = Instant::now() + self.config.call_timeout;

        self.handle
            .send(TransportCommand::Subscribe {
                uri: uri.to_owned(),
                options,
                event_tx,
                response_tx,
                deadline,
            })
            .await?;

        let handle = response_rx
            .await
            .map_err(|_| WaapiError::Internal("transport task exited before responding".into()))??;
        Ok((handle, event_rx))
    }

    /// Drop a topic subscription. Returns whether the authoring app
    /// acknowledged the removal.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the link is down.
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<bool, WaapiError> {
        let (response_tx, response_rx) = oneshot::channel();
        let deadline = Instant::now() + self.config.call_timeout;

        self.handle
            .send(TransportCommand::Unsubscribe {
                handle,
                response_tx,
                deadline,
            })
            .await?;

        response_rx
            .await
            .map_err(|_| WaapiError::Internal("transport task exited before responding".into()))?
    }

    /// Gracefully close the WebSocket connection.
    ///
    /// # Errors
    ///
    /// Returns `WaapiError::Internal` if the transport task has already exited.
    pub async fn disconnect(&self) -> Result<(), WaapiError> {
        self.handle.send(TransportCommand::Shutdown).await
    }

    /// Check if the client is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }

    /// Get the WebSocket URL this client is connected to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}
