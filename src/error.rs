use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

/// Classification of an error as seen by tool-server clients.
///
/// Every failure surfaced over the wire carries exactly one kind; callers
/// branch on it to decide whether to retry (`Reconnecting`), back off
/// (`QueueFull`), or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed argument, length mismatch, unknown variable, unknown verb.
    Validation,
    /// No authoring session has been established yet.
    NotConnected,
    /// The session is currently reconnecting; retry shortly.
    Reconnecting,
    /// A waiter gave up before the dispatcher delivered a reply.
    Timeout,
    /// The dispatcher queue hit its backpressure limit.
    QueueFull,
    /// Low-level WebSocket / IO failure.
    Transport,
    /// The Authoring API returned an application-level error.
    Call,
    /// An authoring object path could not be resolved.
    NotFound,
    /// Higher-level adapter failure wrapping domain context.
    Business,
    /// Programmer error (e.g. an RPC submitted from the consumer task).
    Internal,
}

impl ErrorKind {
    /// JSON-RPC error code for this kind. Codes live in the server-defined
    /// range so they never collide with the protocol-reserved -32700..-32600.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Validation => -32001,
            Self::NotConnected => -32002,
            Self::Reconnecting => -32003,
            Self::Timeout => -32004,
            Self::QueueFull => -32005,
            Self::Transport => -32006,
            Self::Call => -32007,
            Self::NotFound => -32008,
            Self::Business => -32009,
            Self::Internal => -32010,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation error"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Timeout => write!(f, "timeout"),
            Self::QueueFull => write!(f, "queue full"),
            Self::Transport => write!(f, "transport error"),
            Self::Call => write!(f, "call error"),
            Self::NotFound => write!(f, "not found"),
            Self::Business => write!(f, "business error"),
            Self::Internal => write!(f, "internal error"),
        }
    }
}

/// Structured error returned to clients and threaded through the plan log.
///
/// `operation` names the verb or URI where the failure originated when
/// known; `details` is a best-effort context map (field names, limits,
/// offending values). No stack traces cross the wire.
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub operation: Option<String>,
    pub details: Map<String, Value>,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operation {
            Some(op) => write!(f, "{}: [{op}] {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            operation: None,
            details: Map::new(),
        }
    }

    /// Attach the verb or URI this error originated from.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Attach one context entry to the details map.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Validation failure pinned to a specific argument field.
    #[must_use]
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        Self::validation(message).with_detail("field", Value::String(field.to_owned()))
    }

    #[must_use]
    pub fn not_connected() -> Self {
        Self::new(
            ErrorKind::NotConnected,
            "no authoring session; call connect first",
        )
    }

    #[must_use]
    pub fn reconnecting() -> Self {
        Self::new(
            ErrorKind::Reconnecting,
            "authoring session is reconnecting; retry in a moment",
        )
    }

    #[must_use]
    pub fn timeout(uri: &str, timeout: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!(
                "call to '{uri}' timed out after {:.3}s",
                timeout.as_secs_f64()
            ),
        )
        .with_operation(uri)
        .with_detail(
            "timeout_ms",
            Value::from(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
        )
    }

    #[must_use]
    pub fn queue_full(size: usize, max: usize) -> Self {
        Self::new(
            ErrorKind::QueueFull,
            format!("dispatcher queue is full ({size}/{max})"),
        )
        .with_detail("size", Value::from(size))
        .with_detail("max", Value::from(max))
    }

    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    #[must_use]
    pub fn call(uri: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Call, message).with_operation(uri)
    }

    #[must_use]
    pub fn not_found(path: &str) -> Self {
        Self::new(ErrorKind::NotFound, format!("object not found: {path}"))
            .with_detail("path", Value::String(path.to_owned()))
    }

    #[must_use]
    pub fn business(operation: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Business, message).with_operation(operation)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Unknown verb name in a plan step.
    #[must_use]
    pub fn unknown_verb(name: &str) -> Self {
        Self::validation(format!("unknown verb '{name}'"))
            .with_detail("verb", Value::String(name.to_owned()))
    }

    /// Unknown `$variable` reference in a plan step argument.
    #[must_use]
    pub fn unknown_variable(name: &str) -> Self {
        Self::validation(format!("unknown variable '${name}'"))
            .with_detail("variable", Value::String(name.to_owned()))
    }

    /// Wire representation used in JSON-RPC error objects and plan logs.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert(
            "kind".into(),
            serde_json::to_value(self.kind).unwrap_or(Value::Null),
        );
        obj.insert("message".into(), Value::String(self.message.clone()));
        if let Some(op) = &self.operation {
            obj.insert("operation".into(), Value::String(op.clone()));
        }
        if !self.details.is_empty() {
            obj.insert("details".into(), Value::Object(self.details.clone()));
        }
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = AppError::validation("names list is empty");
        assert_eq!(err.to_string(), "validation error: names list is empty");
    }

    #[test]
    fn display_includes_operation_when_set() {
        let err = AppError::call("core.object.get", "bad query").to_string();
        assert_eq!(err, "call error: [core.object.get] bad query");
    }

    #[test]
    fn queue_full_carries_limits() {
        let err = AppError::queue_full(4, 4);
        assert_eq!(err.kind, ErrorKind::QueueFull);
        assert_eq!(err.details["size"], 4);
        assert_eq!(err.details["max"], 4);
    }

    #[test]
    fn timeout_carries_uri_and_millis() {
        let err = AppError::timeout("soundengine.postEvent", Duration::from_millis(1500));
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(err.operation.as_deref(), Some("soundengine.postEvent"));
        assert_eq!(err.details["timeout_ms"], 1500);
    }

    #[test]
    fn to_json_shape() {
        let err = AppError::not_found("\\Events\\Missing");
        let json = err.to_json();
        assert_eq!(json["kind"], "not_found");
        assert_eq!(json["details"]["path"], "\\Events\\Missing");
        assert!(json.get("operation").is_none());
    }

    #[test]
    fn kinds_map_to_distinct_codes() {
        let kinds = [
            ErrorKind::Validation,
            ErrorKind::NotConnected,
            ErrorKind::Reconnecting,
            ErrorKind::Timeout,
            ErrorKind::QueueFull,
            ErrorKind::Transport,
            ErrorKind::Call,
            ErrorKind::NotFound,
            ErrorKind::Business,
            ErrorKind::Internal,
        ];
        let mut codes: Vec<i64> = kinds.iter().map(|k| k.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }
}
