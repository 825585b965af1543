use serde_json::{Map, Value, json};

use super::AdapterFuture;
use super::args::{Args, opt_str};
use crate::error::AppError;
use crate::session::{CallOptions, Session};

/// Names of all descendants of a root path with the given type.
async fn list_names_under(
    session: &Session,
    root: &str,
    type_name: &str,
) -> Result<Value, AppError> {
    let result = session
        .call(
            "ak.wwise.core.object.get",
            Some(json!({
                "from": {"path": [root]},
                "transform": [
                    {"select": ["descendants"]},
                    {"where": ["type:isIn", [type_name]]},
                ],
            })),
            Some(json!({"return": ["name"]})),
            CallOptions::default(),
        )
        .await?;

    let names: Vec<Value> = result["return"]
        .as_array()
        .map(|list| list.iter().filter_map(|o| o["name"].as_str()).map(Value::from).collect())
        .unwrap_or_default();
    Ok(Value::Array(names))
}

/// Children of every object of `group_type`, grouped by the parent's name.
async fn list_grouped(
    session: &Session,
    group_type: &str,
    child_type: &str,
) -> Result<Value, AppError> {
    let result = session
        .call(
            "ak.wwise.core.object.get",
            Some(json!({"from": {"ofType": [child_type]}})),
            Some(json!({"return": ["name", "parent.name"]})),
            CallOptions::default(),
        )
        .await?;

    let mut grouped: Map<String, Value> = Map::new();
    if let Some(children) = result["return"].as_array() {
        for child in children {
            let (Some(name), Some(parent)) =
                (child["name"].as_str(), child["parent.name"].as_str())
            else {
                continue;
            };
            let entry = grouped
                .entry(parent.to_owned())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Some(list) = entry.as_array_mut() {
                list.push(Value::from(name));
            }
        }
    }

    // Groups without children still show up, with an empty list.
    let groups = session
        .call(
            "ak.wwise.core.object.get",
            Some(json!({"from": {"ofType": [group_type]}})),
            Some(json!({"return": ["name"]})),
            CallOptions::default(),
        )
        .await?;
    if let Some(list) = groups["return"].as_array() {
        for group in list {
            if let Some(name) = group["name"].as_str() {
                grouped
                    .entry(name.to_owned())
                    .or_insert_with(|| Value::Array(Vec::new()));
            }
        }
    }

    Ok(Value::Object(grouped))
}

pub(super) fn list_all_event_names<'a>(session: &'a Session, _args: Args) -> AdapterFuture<'a> {
    Box::pin(async move { list_names_under(session, "\\Events", "Event").await })
}

pub(super) fn list_all_rtpc_names<'a>(session: &'a Session, _args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        list_names_under(session, "\\Game Parameters", "GameParameter").await
    })
}

pub(super) fn list_all_switch_groups_and_switches<'a>(
    session: &'a Session,
    _args: Args,
) -> AdapterFuture<'a> {
    Box::pin(async move { list_grouped(session, "SwitchGroup", "Switch").await })
}

pub(super) fn list_all_state_groups_and_states<'a>(
    session: &'a Session,
    _args: Args,
) -> AdapterFuture<'a> {
    Box::pin(async move { list_grouped(session, "StateGroup", "State").await })
}

pub(super) fn list_all_game_objects<'a>(session: &'a Session, _args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let result = session
            .call(
                "ak.wwise.core.profiler.getGameObjects",
                Some(json!({"time": "capture"})),
                None,
                CallOptions::default(),
            )
            .await?;
        Ok(result["return"].clone())
    })
}

pub(super) fn get_selected_objects<'a>(session: &'a Session, _args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let result = session
            .call(
                "ak.wwise.ui.getSelectedObjects",
                None,
                Some(json!({"return": ["id", "name", "type", "path"]})),
                CallOptions::default(),
            )
            .await?;

        let objects = result["objects"].clone();
        match objects.as_array() {
            Some(list) if !list.is_empty() => Ok(objects),
            _ => Err(AppError::business(
                "get_selected_objects",
                "no selection detected",
            )),
        }
    })
}

pub(super) fn get_project_info<'a>(session: &'a Session, _args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        session
            .call(
                "ak.wwise.core.getProjectInfo",
                None,
                None,
                CallOptions::default(),
            )
            .await
    })
}

pub(super) fn get_waapi_schema<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let call_args = opt_str(&args, "uri")?.map(|uri| json!({"uri": [uri]}));
        session
            .call("ak.wwise.waapi.getSchema", call_args, None, CallOptions::default())
            .await
    })
}

pub(super) fn get_waapi_topics<'a>(session: &'a Session, _args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        session
            .call("ak.wwise.waapi.getTopics", None, None, CallOptions::default())
            .await
    })
}

pub(super) fn ping<'a>(session: &'a Session, _args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        session
            .call("ak.wwise.core.getInfo", None, None, CallOptions::default())
            .await
    })
}
