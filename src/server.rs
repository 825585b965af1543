use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::plan::{PlanError, StepInput, execute_plan};
use crate::session::Session;
use crate::verbs;

/// JSON-RPC 2.0 reserved codes.
const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct Request {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize)]
struct ExecutePlanParams {
    plan: Vec<StepInput>,
}

/// Serve line-delimited JSON-RPC 2.0 over stdin/stdout until EOF.
///
/// Each request is handled on its own task; responses funnel through a
/// single writer so output lines never interleave. Requests without an
/// `id` are notifications: they execute but produce no response line.
///
/// # Errors
///
/// Returns an IO error if stdout becomes unwritable.
pub async fn serve(session: Arc<Session>) -> std::io::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    let (response_tx, mut response_rx) = mpsc::channel::<String>(64);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = response_rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    });

    info!("tool server listening on stdio");
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let session = Arc::clone(&session);
        let response_tx = response_tx.clone();
        tokio::spawn(async move {
            if let Some(response) = handle_line(&session, &line).await {
                let _ = response_tx.send(response).await;
            }
        });
    }

    info!("stdin closed; shutting down");
    drop(response_tx);
    writer.await.unwrap_or(Ok(()))
}

/// Handle one request line; `None` means no response is owed (a
/// notification, or unparseable input with no recoverable id).
pub async fn handle_line(session: &Session, line: &str) -> Option<String> {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "unparseable request line");
            let response = error_response(
                Value::Null,
                PARSE_ERROR,
                &format!("parse error: {e}"),
                None,
            );
            return Some(response.to_string());
        }
    };

    debug!(method = %request.method, "request received");
    let id = request.id.clone();
    let response =
        dispatch_method(session, &request, id.clone().unwrap_or(Value::Null)).await;
    // Notifications (no id) execute but produce no response line.
    id.map(|_| response.to_string())
}

async fn dispatch_method(session: &Session, request: &Request, id: Value) -> Value {
    match request.method.as_str() {
        "list_commands" => ok_response(id, json!(verbs::list())),
        "ping" => ok_response(id, json!("pong")),
        "execute_plan" => {
            let params: ExecutePlanParams =
                match serde_json::from_value(request.params.clone()) {
                    Ok(params) => params,
                    Err(e) => {
                        return error_response(
                            id,
                            INVALID_PARAMS,
                            &format!("invalid params: expected {{\"plan\": [...]}}: {e}"),
                            None,
                        );
                    }
                };
            match execute_plan(session, params.plan).await {
                Ok(report) => ok_response(
                    id,
                    serde_json::to_value(report).unwrap_or(Value::Null),
                ),
                Err(failure) => plan_error_response(id, &failure),
            }
        }
        other => error_response(
            id,
            METHOD_NOT_FOUND,
            &format!("unknown method '{other}'"),
            None,
        ),
    }
}

fn ok_response(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn error_response(id: Value, code: i64, message: &str, data: Option<Value>) -> Value {
    let mut error = json!({"code": code, "message": message});
    if let Some(data) = data {
        error["data"] = data;
    }
    json!({"jsonrpc": "2.0", "id": id, "error": error})
}

/// Map an [`AppError`] plus the partial plan log onto the wire: the
/// taxonomy kind rides in `data` so clients can branch without string
/// matching, and the log preserves partial progress.
fn plan_error_response(id: Value, failure: &PlanError) -> Value {
    let log = serde_json::to_value(&failure.log).unwrap_or(Value::Null);
    let data = json!({
        "error": failure.error.to_json(),
        "steps_executed": failure.steps_executed,
        "log": log,
    });
    error_response(
        id,
        failure.error.kind.code(),
        &failure.error.to_string(),
        Some(data),
    )
}

/// Convenience used by tests and the `--list-verbs` flag.
#[must_use]
pub fn render_verb_listing() -> String {
    verbs::list().join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;

    fn dead_session() -> Session {
        // Port 9 (discard) never speaks WebSocket; connects fail fast.
        Session::new(SessionConfig {
            url: "ws://127.0.0.1:9".into(),
            ..SessionConfig::default()
        })
    }

    #[tokio::test]
    async fn list_commands_returns_signatures() {
        let session = dead_session();
        let response = handle_line(
            &session,
            r#"{"jsonrpc": "2.0", "id": 1, "method": "list_commands"}"#,
        )
        .await
        .unwrap();
        let json: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(json["id"], 1);
        let listing = json["result"].as_array().unwrap();
        assert!(listing.iter().any(|entry| {
            entry
                .as_str()
                .is_some_and(|s| s.starts_with("list_all_event_names()"))
        }));
    }

    #[tokio::test]
    async fn ping_pongs() {
        let session = dead_session();
        let response = handle_line(&session, r#"{"id": "abc", "method": "ping"}"#)
            .await
            .unwrap();
        let json: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["result"], "pong");
    }

    #[tokio::test]
    async fn unknown_method_is_reported() {
        let session = dead_session();
        let response = handle_line(&session, r#"{"id": 2, "method": "frobnicate"}"#)
            .await
            .unwrap();
        let json: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(json["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn parse_error_yields_null_id_response() {
        let session = dead_session();
        let response = handle_line(&session, "this is not json").await.unwrap();
        let json: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(json["id"], Value::Null);
        assert_eq!(json["error"]["code"], PARSE_ERROR);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let session = dead_session();
        let response = handle_line(&session, r#"{"method": "ping"}"#).await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn execute_plan_requires_plan_param() {
        let session = dead_session();
        let response = handle_line(
            &session,
            r#"{"id": 3, "method": "execute_plan", "params": {}}"#,
        )
        .await
        .unwrap();
        let json: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(json["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn execute_plan_validation_errors_carry_kind() {
        let session = dead_session();
        let response = handle_line(
            &session,
            r#"{"id": 4, "method": "execute_plan", "params": {"plan": ["no_such_verb()"]}}"#,
        )
        .await
        .unwrap();
        let json: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(json["error"]["data"]["error"]["kind"], "validation");
        assert_eq!(json["error"]["data"]["steps_executed"], 0);
    }

    #[test]
    fn verb_listing_renders() {
        let listing = render_verb_listing();
        assert!(listing.contains("post_event(event_name"));
        assert!(listing.contains("\n    "));
    }
}
