//! Integration tests for the WAAPI WebSocket client.
//!
//! Each test spins up a mock authoring endpoint with configurable
//! behavior, connects a `WaapiClient`, and verifies the expected
//! interactions.

use std::net::SocketAddr;
use std::time::Duration;

use agentwwise::waapi::{WaapiClient, WaapiConfig, WaapiError};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

// =============================================================================
// Mock server helpers
// =============================================================================

/// Start a mock endpoint that echoes `{"id": N, "result": {...}}` with the
/// requested URI reflected back, and answers subscribe frames with
/// sequential subscription ids.
async fn start_echo_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut source) = ws.split();
                let mut next_subscription = 100u64;
                while let Some(Ok(Message::Text(text))) = source.next().await {
                    let frame: Value = serde_json::from_str(&text).unwrap();
                    let response = if frame.get("subscribe").is_some() {
                        next_subscription += 1;
                        json!({
                            "id": frame["id"],
                            "result": {"subscriptionId": next_subscription},
                        })
                    } else if frame.get("unsubscribe").is_some() {
                        json!({"id": frame["id"], "result": {}})
                    } else {
                        json!({
                            "id": frame["id"],
                            "result": {"uri": frame["uri"], "args": frame["args"]},
                        })
                    };
                    sink.send(Message::Text(response.to_string().into()))
                        .await
                        .unwrap();
                }
            });
        }
    });
    (addr, handle)
}

/// Start a mock endpoint that rejects every call with a WAAPI error.
async fn start_error_server(error_uri: &str, message: &str) -> (SocketAddr, JoinHandle<()>) {
    let error_uri = error_uri.to_owned();
    let message = message.to_owned();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let error_uri = error_uri.clone();
            let message = message.clone();
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut source) = ws.split();
                while let Some(Ok(Message::Text(text))) = source.next().await {
                    let frame: Value = serde_json::from_str(&text).unwrap();
                    let response = json!({
                        "id": frame["id"],
                        "error": {"uri": error_uri, "message": message},
                    });
                    sink.send(Message::Text(response.to_string().into()))
                        .await
                        .unwrap();
                }
            });
        }
    });
    (addr, handle)
}

/// Start a mock endpoint that accepts frames but never responds.
async fn start_silent_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (_sink, mut source) = ws.split();
                while source.next().await.is_some() {}
            });
        }
    });
    (addr, handle)
}

/// Start a mock endpoint that acknowledges one subscription and then
/// pushes `event_count` events for it before going quiet.
async fn start_event_server(event_count: usize) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut source) = ws.split();
                while let Some(Ok(Message::Text(text))) = source.next().await {
                    let frame: Value = serde_json::from_str(&text).unwrap();
                    if frame.get("subscribe").is_some() {
                        let ack = json!({"id": frame["id"], "result": {"subscriptionId": 7}});
                        sink.send(Message::Text(ack.to_string().into())).await.unwrap();
                        for n in 0..event_count {
                            let event = json!({"subscriptionId": 7, "event": {"n": n}});
                            sink.send(Message::Text(event.to_string().into()))
                                .await
                                .unwrap();
                        }
                    }
                }
            });
        }
    });
    (addr, handle)
}

/// Start a mock endpoint that closes the connection after the first frame.
async fn start_dropping_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let _ = ws.next().await;
                let _ = ws.close(None).await;
            });
        }
    });
    (addr, handle)
}

fn fast_config() -> WaapiConfig {
    WaapiConfig {
        connect_timeout: Duration::from_secs(5),
        call_timeout: Duration::from_secs(5),
        channel_capacity: 64,
        event_capacity: 64,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn call_round_trips_args() {
    let (addr, _server) = start_echo_server().await;
    let client = WaapiClient::connect(&format!("ws://{addr}"), fast_config())
        .await
        .unwrap();

    let result = client
        .call(
            "ak.wwise.core.object.get",
            Some(json!({"waql": "$ from type Event"})),
            None,
        )
        .await
        .unwrap();
    assert_eq!(result["uri"], "ak.wwise.core.object.get");
    assert_eq!(result["args"]["waql"], "$ from type Event");

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn waapi_errors_surface_with_uri() {
    let (addr, _server) =
        start_error_server("ak.wwise.query.invalid_arguments", "bad query").await;
    let client = WaapiClient::connect(&format!("ws://{addr}"), fast_config())
        .await
        .unwrap();

    let err = client
        .call("ak.wwise.core.object.get", None, None)
        .await
        .unwrap_err();
    match err {
        WaapiError::Waapi { uri, message } => {
            assert_eq!(uri.as_deref(), Some("ak.wwise.query.invalid_arguments"));
            assert_eq!(message, "bad query");
        }
        other => panic!("expected Waapi error, got: {other}"),
    }

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn silent_server_times_out_at_the_transport_deadline() {
    let (addr, _server) = start_silent_server().await;
    let config = WaapiConfig {
        call_timeout: Duration::from_millis(200),
        ..fast_config()
    };
    let client = WaapiClient::connect(&format!("ws://{addr}"), config)
        .await
        .unwrap();

    let err = client.call("ak.wwise.core.getInfo", None, None).await.unwrap_err();
    assert!(matches!(err, WaapiError::CallTimeout { uri } if uri == "ak.wwise.core.getInfo"));

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn connection_refused_is_a_connection_error() {
    let err = WaapiClient::connect("ws://127.0.0.1:9", fast_config())
        .await
        .unwrap_err();
    assert!(matches!(err, WaapiError::Connection(_)));
}

#[tokio::test]
async fn subscription_delivers_events_in_order() {
    let (addr, _server) = start_event_server(3).await;
    let client = WaapiClient::connect(&format!("ws://{addr}"), fast_config())
        .await
        .unwrap();

    let (handle, mut events) = client
        .subscribe("ak.wwise.core.object.created", None)
        .await
        .unwrap();
    assert_eq!(handle, 7);

    for expected in 0..3 {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event["n"], expected);
    }

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn full_event_buffer_drops_newest() {
    let (addr, _server) = start_event_server(10).await;
    let config = WaapiConfig {
        event_capacity: 3,
        ..fast_config()
    };
    let client = WaapiClient::connect(&format!("ws://{addr}"), config)
        .await
        .unwrap();

    let (_handle, mut events) = client
        .subscribe("ak.wwise.core.object.created", None)
        .await
        .unwrap();

    // Let all ten events hit the bounded buffer before reading any.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event["n"].as_u64().unwrap());
    }
    // The first three fit; the surplus was dropped, not queued.
    assert_eq!(received, vec![0, 1, 2]);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn unsubscribe_is_acknowledged() {
    let (addr, _server) = start_echo_server().await;
    let client = WaapiClient::connect(&format!("ws://{addr}"), fast_config())
        .await
        .unwrap();

    let (handle, _events) = client
        .subscribe("ak.wwise.core.project.saved", None)
        .await
        .unwrap();
    assert!(client.unsubscribe(handle).await.unwrap());

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn peer_close_fails_pending_and_subsequent_calls() {
    let (addr, _server) = start_dropping_server().await;
    let client = WaapiClient::connect(&format!("ws://{addr}"), fast_config())
        .await
        .unwrap();

    let err = client.call("ak.wwise.core.getInfo", None, None).await.unwrap_err();
    assert!(matches!(
        err,
        WaapiError::ConnectionClosed | WaapiError::Connection(_)
    ));

    // The transport stays up to fail later submissions deterministically.
    let err = client.call("ak.wwise.core.getInfo", None, None).await.unwrap_err();
    assert!(matches!(
        err,
        WaapiError::ConnectionClosed | WaapiError::Connection(_)
    ));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn calls_after_disconnect_fail() {
    let (addr, _server) = start_echo_server().await;
    let client = WaapiClient::connect(&format!("ws://{addr}"), fast_config())
        .await
        .unwrap();
    client.disconnect().await.unwrap();

    // Give the transport task a moment to process the shutdown.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let err = client.call("ak.wwise.core.getInfo", None, None).await.unwrap_err();
    assert!(matches!(err, WaapiError::Internal(_)));
}
