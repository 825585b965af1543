use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use super::parser::parse_expression;
use super::resolve::{Bindings, find_unknown_ref, resolve};
use super::StepInput;
use crate::error::AppError;
use crate::session::{CallOptions, Session};
use crate::verbs::{self, Verb};

const UNDO_BEGIN: &str = "ak.wwise.core.undo.beginGroup";
const UNDO_END: &str = "ak.wwise.core.undo.endGroup";
const UNDO_CANCEL: &str = "ak.wwise.core.undo.cancelGroup";

/// Name under which a grouped plan shows up in the authoring app's undo
/// history.
const UNDO_DISPLAY_NAME: &str = "Tool plan";

/// One entry of the per-plan execution log.
#[derive(Debug, Serialize)]
pub struct StepLog {
    pub command: String,
    pub kwargs: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl StepLog {
    fn ok(command: impl Into<String>, kwargs: Map<String, Value>, result: Value) -> Self {
        Self {
            command: command.into(),
            kwargs,
            result: Some(result),
            error: None,
        }
    }

    fn failed(command: impl Into<String>, kwargs: Map<String, Value>, error: &AppError) -> Self {
        Self {
            command: command.into(),
            kwargs,
            result: None,
            error: Some(error.to_json()),
        }
    }
}

/// Successful plan outcome.
#[derive(Debug, Serialize)]
pub struct PlanReport {
    pub status: &'static str,
    pub steps_executed: usize,
    pub log: Vec<StepLog>,
}

/// Failed plan outcome: the typed cause plus everything that ran before
/// (and including) the failure.
#[derive(Debug)]
pub struct PlanError {
    pub error: AppError,
    pub steps_executed: usize,
    pub log: Vec<StepLog>,
}

impl PlanError {
    fn early(error: AppError) -> Self {
        Self {
            error,
            steps_executed: 0,
            log: Vec::new(),
        }
    }
}

/// A step validated against the verb registry, ready to execute.
struct PreparedStep {
    verb: &'static Verb,
    kwargs: Map<String, Value>,
    save_as: Option<String>,
}

/// Execute a plan: validate every step up front, ensure the session is
/// connected, bracket mutating plans in an undo group, then run the
/// steps strictly in order with `$var` resolution between them.
///
/// # Errors
///
/// Returns [`PlanError`] carrying the first failure and the partial log.
/// Validation problems (unknown verb, bad arity, unknown variable) fail
/// before any call is issued.
pub async fn execute_plan(
    session: &Session,
    steps: Vec<StepInput>,
) -> Result<PlanReport, PlanError> {
    let prepared = prepare(steps).map_err(PlanError::early)?;

    let mut log = Vec::new();

    // Connection comes first so every later step sees a live dispatcher.
    match session.ensure_connected().await {
        Ok(reconnected) => {
            log.push(StepLog::ok(
                "connect",
                Map::new(),
                json!({"state": session.state().to_string(), "reconnected": reconnected}),
            ));
        }
        Err(e) => {
            error!(error = %e, "plan aborted: connect failed");
            log.push(StepLog::failed("connect", Map::new(), &e));
            return Err(PlanError {
                error: e,
                steps_executed: 0,
                log,
            });
        }
    }

    // Any mutating verb puts the whole plan inside one undo group, making
    // it all-or-nothing from the authoring app's perspective.
    let undo_mode = prepared.iter().any(|step| step.verb.mutating);
    if undo_mode {
        match undo_call(session, UNDO_BEGIN, None).await {
            Ok(result) => log.push(StepLog::ok("undo.begin_group", Map::new(), result)),
            Err(e) => {
                error!(error = %e, "plan aborted: could not open undo group");
                log.push(StepLog::failed("undo.begin_group", Map::new(), &e));
                return Err(PlanError {
                    error: e,
                    steps_executed: 0,
                    log,
                });
            }
        }
    }

    let mut bindings = Bindings::new();
    let total = prepared.len();
    for (index, step) in prepared.into_iter().enumerate() {
        let command = step.verb.name;
        match run_step(session, &step, &bindings).await {
            Ok((kwargs, result)) => {
                debug!(command, index, "step succeeded");
                bindings.insert("last".to_owned(), result.clone());
                if let Some(name) = step.save_as {
                    bindings.insert(name, result.clone());
                }
                log.push(StepLog::ok(command, kwargs, result));
            }
            Err((kwargs, e)) => {
                warn!(command, index, error = %e, "step failed");
                log.push(StepLog::failed(command, kwargs, &e));
                if undo_mode {
                    cancel_group(session, &mut log).await;
                }
                return Err(PlanError {
                    error: e,
                    steps_executed: index,
                    log,
                });
            }
        }
    }

    if undo_mode {
        match undo_call(
            session,
            UNDO_END,
            Some(json!({"displayName": UNDO_DISPLAY_NAME})),
        )
        .await
        {
            Ok(result) => log.push(StepLog::ok("undo.end_group", Map::new(), result)),
            Err(e) => {
                // A dangling open group would swallow the user's next
                // operations; closing it is worth a second failure.
                error!(error = %e, "closing the undo group failed");
                log.push(StepLog::failed("undo.end_group", Map::new(), &e));
                cancel_group(session, &mut log).await;
                return Err(PlanError {
                    error: e,
                    steps_executed: total,
                    log,
                });
            }
        }
    }

    info!(steps = total, "plan completed");
    Ok(PlanReport {
        status: "ok",
        steps_executed: total,
        log,
    })
}

/// Parse and statically validate every step before anything executes:
/// verbs must exist, arguments must bind against their signatures, and
/// every `$var` must refer to `last` or an earlier `save_as`.
fn prepare(steps: Vec<StepInput>) -> Result<Vec<PreparedStep>, AppError> {
    if steps.is_empty() {
        return Err(AppError::validation("plan has no steps"));
    }

    let mut prepared = Vec::with_capacity(steps.len());
    for step in steps {
        let (parsed_name, positional, keyword, save_as) = match step {
            StepInput::Expression(expr) => {
                let call = parse_expression(&expr)?;
                (call.name, call.positional, call.keyword, None)
            }
            StepInput::Structured {
                command,
                args,
                save_as,
            } => (command, Vec::new(), args, save_as),
        };

        let verb = verbs::find(&parsed_name)
            .ok_or_else(|| AppError::unknown_verb(&parsed_name))?;
        let kwargs = verb.bind_args(positional, keyword)?;
        prepared.push(PreparedStep {
            verb,
            kwargs,
            save_as,
        });
    }

    // Static reference pre-pass; field access is shape-checked at
    // execution time, names are checkable now.
    let mut known: HashSet<String> = HashSet::new();
    for (index, step) in prepared.iter().enumerate() {
        if index > 0 {
            known.insert("last".to_owned());
        }
        if let Some(name) = find_unknown_ref(&Value::Object(step.kwargs.clone()), &known) {
            return Err(AppError::unknown_variable(&name));
        }
        if let Some(save_as) = &step.save_as {
            known.insert(save_as.clone());
        }
    }

    Ok(prepared)
}

/// Resolve a step's variables and run its adapter. Both failure paths
/// return the kwargs that should appear in the log.
async fn run_step(
    session: &Session,
    step: &PreparedStep,
    bindings: &Bindings,
) -> Result<(Map<String, Value>, Value), (Map<String, Value>, AppError)> {
    let resolved = match resolve(&Value::Object(step.kwargs.clone()), bindings) {
        Ok(Value::Object(map)) => map,
        Ok(_) => unreachable!("resolving a mapping yields a mapping"),
        Err(e) => return Err((step.kwargs.clone(), e)),
    };

    match (step.verb.adapter)(session, resolved.clone()).await {
        Ok(result) => Ok((resolved, result)),
        Err(e) => Err((resolved, e)),
    }
}

async fn undo_call(
    session: &Session,
    uri: &str,
    args: Option<Value>,
) -> Result<Value, AppError> {
    session.call(uri, args, None, CallOptions::default()).await
}

/// Best-effort rollback. The authoring app owns the actual undo state;
/// if even the cancel fails the session may be dirty, and both errors
/// stay visible in the log.
async fn cancel_group(session: &Session, log: &mut Vec<StepLog>) {
    match undo_call(session, UNDO_CANCEL, None).await {
        Ok(result) => log.push(StepLog::ok("undo.cancel_group", Map::new(), result)),
        Err(e) => {
            error!(error = %e, "cancelling the undo group failed; session may be dirty");
            log.push(StepLog::failed("undo.cancel_group", Map::new(), &e));
        }
    }
}
