use serde_json::{Value, json};
use uuid::Uuid;

use super::AdapterFuture;
use super::args::{Args, require_str};
use crate::error::AppError;
use crate::session::Session;

/// The closed enumeration of subscribable topics. Events on any of these
/// are opaque payloads buffered per subscription.
pub const TOPIC_URIS: &[&str] = &[
    "ak.wwise.core.audio.imported",
    "ak.wwise.core.log.itemAdded",
    "ak.wwise.core.object.attenuationCurveChanged",
    "ak.wwise.core.object.attenuationCurveLinkChanged",
    "ak.wwise.core.object.childAdded",
    "ak.wwise.core.object.childRemoved",
    "ak.wwise.core.object.created",
    "ak.wwise.core.object.curveChanged",
    "ak.wwise.core.object.nameChanged",
    "ak.wwise.core.object.notesChanged",
    "ak.wwise.core.object.postDeleted",
    "ak.wwise.core.object.preDeleted",
    "ak.wwise.core.object.propertyChanged",
    "ak.wwise.core.object.referenceChanged",
    "ak.wwise.core.object.structureChanged",
    "ak.wwise.core.profiler.captureLog.itemAdded",
    "ak.wwise.core.profiler.gameObjectRegistered",
    "ak.wwise.core.profiler.gameObjectReset",
    "ak.wwise.core.profiler.gameObjectUnregistered",
    "ak.wwise.core.profiler.stateChanged",
    "ak.wwise.core.profiler.switchChanged",
    "ak.wwise.core.project.loaded",
    "ak.wwise.core.project.postClosed",
    "ak.wwise.core.project.preClosed",
    "ak.wwise.core.project.saved",
    "ak.wwise.core.soundbank.generated",
    "ak.wwise.core.soundbank.generationDone",
    "ak.wwise.core.switchContainer.assignmentAdded",
    "ak.wwise.core.switchContainer.assignmentRemoved",
    "ak.wwise.core.transport.stateChanged",
    "ak.wwise.debug.assertFailed",
    "ak.wwise.ui.commands.executed",
    "ak.wwise.ui.selectionChanged",
];

fn parse_subscription_id(args: &Args) -> Result<Uuid, AppError> {
    let raw = require_str(args, "subscription_id")?;
    Uuid::parse_str(raw).map_err(|_| {
        AppError::invalid_field(
            "subscription_id",
            format!("'{raw}' is not a valid subscription id"),
        )
    })
}

pub(super) fn subscribe_topic<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let topic = require_str(&args, "topic_uri")?;
        if !TOPIC_URIS.contains(&topic) {
            return Err(AppError::invalid_field(
                "topic_uri",
                format!("'{topic}' is not a subscribable topic; see list_topic_uris"),
            ));
        }

        let options = match args.get("options") {
            None | Some(Value::Null) => None,
            Some(options @ Value::Object(_)) => Some(options.clone()),
            Some(_) => {
                return Err(AppError::invalid_field(
                    "options",
                    "'options' must be an object",
                ));
            }
        };

        let id = session.subscribe(topic, options).await?;
        Ok(json!({"subscription_id": id.to_string(), "topic": topic}))
    })
}

pub(super) fn unsubscribe_topic<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let id = parse_subscription_id(&args)?;
        let removed = session.unsubscribe(id).await?;
        Ok(json!({"removed": removed}))
    })
}

pub(super) fn get_subscription_events<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let id = parse_subscription_id(&args)?;

        let max_count = match args.get("max_count") {
            None | Some(Value::Null) => None,
            Some(value) => match value.as_u64() {
                Some(n) => Some(usize::try_from(n).unwrap_or(usize::MAX)),
                None => {
                    return Err(AppError::invalid_field(
                        "max_count",
                        "'max_count' must be a non-negative integer",
                    ));
                }
            },
        };
        let clear = match args.get("clear") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(clear)) => *clear,
            Some(_) => {
                return Err(AppError::invalid_field("clear", "'clear' must be a boolean"));
            }
        };

        let events = session.drain_events(id, max_count, clear)?;
        Ok(json!({"count": events.len(), "events": events}))
    })
}

pub(super) fn list_topic_uris<'a>(_session: &'a Session, _args: Args) -> AdapterFuture<'a> {
    Box::pin(async move { Ok(json!(TOPIC_URIS)) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_list_is_sorted_and_unique() {
        let mut sorted = TOPIC_URIS.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted, TOPIC_URIS);
    }

    #[test]
    fn subscription_id_parsing() {
        let mut args = Args::new();
        args.insert("subscription_id".into(), json!("not-a-uuid"));
        assert!(parse_subscription_id(&args).is_err());

        let id = Uuid::new_v4();
        args.insert("subscription_id".into(), json!(id.to_string()));
        assert_eq!(parse_subscription_id(&args).unwrap(), id);
    }
}
