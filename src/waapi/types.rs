use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outgoing frame (tool-server to authoring app).
///
/// The three request shapes share an `id` for response correlation; exactly
/// one of `uri` / `subscribe` / `unsubscribe` is present per frame.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OutgoingFrame {
    /// Invoke a WAAPI function.
    Call {
        id: u64,
        uri: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        options: Option<Value>,
    },
    /// Register for a topic; the response carries the subscription id.
    Subscribe {
        id: u64,
        subscribe: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        options: Option<Value>,
    },
    /// Drop a previously registered subscription.
    Unsubscribe { id: u64, unsubscribe: u64 },
}

/// Application-level error payload returned by the authoring app.
#[derive(Debug, Clone, Deserialize)]
pub struct WireError {
    /// WAAPI error URI (e.g. `ak.wwise.query.invalid_arguments`).
    pub uri: Option<String>,
    /// Human-readable error description.
    pub message: String,
}

/// Raw incoming frame before classification.
///
/// Every incoming WebSocket text message is deserialized into this union of
/// response and event fields, then split via [`classify`](Self::classify).
#[derive(Debug, Deserialize)]
pub struct RawFrame {
    /// Present for responses; absent for subscription events.
    pub id: Option<u64>,
    /// Successful response payload.
    pub result: Option<Value>,
    /// Application-level error payload.
    pub error: Option<WireError>,
    /// Present for subscription events.
    #[serde(rename = "subscriptionId")]
    pub subscription_id: Option<u64>,
    /// Event payload for subscription events.
    pub event: Option<Value>,
}

/// Parsed response to a previously sent frame.
#[derive(Debug)]
pub struct WaapiResponse {
    /// The id that correlates to the outgoing frame.
    pub id: u64,
    /// Either the result value or the authoring app's error.
    pub result: Result<Value, WireError>,
}

/// Classification of a raw incoming frame.
pub enum FrameKind {
    /// Response to a call / subscribe / unsubscribe frame.
    Response(WaapiResponse),
    /// Asynchronous event on a live subscription.
    Event {
        subscription_id: u64,
        payload: Value,
    },
}

impl RawFrame {
    /// Classify this frame as a response or a subscription event.
    ///
    /// Frames with an `id` are responses; frames with a `subscriptionId`
    /// but no `id` are events. Returns `None` for anything else.
    #[must_use]
    pub fn classify(self) -> Option<FrameKind> {
        if let Some(id) = self.id {
            let result = match self.error {
                Some(error) => Err(error),
                None => Ok(self.result.unwrap_or(Value::Null)),
            };
            Some(FrameKind::Response(WaapiResponse { id, result }))
        } else if let Some(subscription_id) = self.subscription_id {
            Some(FrameKind::Event {
                subscription_id,
                payload: self.event.unwrap_or(Value::Null),
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // --- OutgoingFrame serialization ---

    #[test]
    fn serialize_call_without_args_or_options() {
        let frame = OutgoingFrame::Call {
            id: 1,
            uri: "ak.wwise.core.getInfo".into(),
            args: None,
            options: None,
        };
        let json: Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["uri"], "ak.wwise.core.getInfo");
        assert!(json.get("args").is_none());
        assert!(json.get("options").is_none());
    }

    #[test]
    fn serialize_call_with_args() {
        let frame = OutgoingFrame::Call {
            id: 2,
            uri: "ak.wwise.core.object.get".into(),
            args: Some(json!({"waql": "$ from type Event"})),
            options: Some(json!({"return": ["name"]})),
        };
        let json: Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["args"]["waql"], "$ from type Event");
        assert_eq!(json["options"]["return"][0], "name");
    }

    #[test]
    fn serialize_subscribe() {
        let frame = OutgoingFrame::Subscribe {
            id: 3,
            subscribe: "ak.wwise.core.object.created".into(),
            options: None,
        };
        let json: Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["subscribe"], "ak.wwise.core.object.created");
        assert!(json.get("uri").is_none());
    }

    #[test]
    fn serialize_unsubscribe() {
        let frame = OutgoingFrame::Unsubscribe {
            id: 4,
            unsubscribe: 17,
        };
        let json: Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["unsubscribe"], 17);
    }

    // --- RawFrame deserialization and classification ---

    #[test]
    fn deserialize_success_response() {
        let raw: RawFrame =
            serde_json::from_str(r#"{"id": 1, "result": {"return": []}}"#).unwrap();
        assert_eq!(raw.id, Some(1));
        assert!(raw.result.is_some());
        assert!(raw.error.is_none());
    }

    #[test]
    fn deserialize_error_response() {
        let raw: RawFrame = serde_json::from_str(
            r#"{"id": 2, "error": {"uri": "ak.wwise.query.invalid_arguments", "message": "bad"}}"#,
        )
        .unwrap();
        let err = raw.error.unwrap();
        assert_eq!(err.uri.as_deref(), Some("ak.wwise.query.invalid_arguments"));
        assert_eq!(err.message, "bad");
    }

    #[test]
    fn classify_response() {
        let raw: RawFrame = serde_json::from_str(r#"{"id": 1, "result": {"ok": true}}"#).unwrap();
        let kind = raw.classify();
        assert!(matches!(kind, Some(FrameKind::Response(_))));
        if let Some(FrameKind::Response(resp)) = kind {
            assert_eq!(resp.id, 1);
            assert!(resp.result.is_ok());
        }
    }

    #[test]
    fn classify_error_response() {
        let raw: RawFrame = serde_json::from_str(
            r#"{"id": 2, "error": {"uri": null, "message": "object not found"}}"#,
        )
        .unwrap();
        if let Some(FrameKind::Response(resp)) = raw.classify() {
            let err = resp.result.unwrap_err();
            assert!(err.uri.is_none());
            assert_eq!(err.message, "object not found");
        } else {
            panic!("expected response");
        }
    }

    #[test]
    fn classify_event() {
        let raw: RawFrame = serde_json::from_str(
            r#"{"subscriptionId": 9, "event": {"object": {"name": "Explosion"}}}"#,
        )
        .unwrap();
        if let Some(FrameKind::Event {
            subscription_id,
            payload,
        }) = raw.classify()
        {
            assert_eq!(subscription_id, 9);
            assert_eq!(payload["object"]["name"], "Explosion");
        } else {
            panic!("expected event");
        }
    }

    #[test]
    fn classify_event_without_payload_yields_null() {
        let raw: RawFrame = serde_json::from_str(r#"{"subscriptionId": 3}"#).unwrap();
        if let Some(FrameKind::Event { payload, .. }) = raw.classify() {
            assert_eq!(payload, Value::Null);
        } else {
            panic!("expected event");
        }
    }

    #[test]
    fn classify_unclassifiable_returns_none() {
        let raw: RawFrame = serde_json::from_str(r"{}").unwrap();
        assert!(raw.classify().is_none());
    }

    #[test]
    fn classify_response_without_result_yields_null() {
        let raw: RawFrame = serde_json::from_str(r#"{"id": 10}"#).unwrap();
        if let Some(FrameKind::Response(resp)) = raw.classify() {
            assert_eq!(resp.result.unwrap(), Value::Null);
        } else {
            panic!("expected response");
        }
    }
}
