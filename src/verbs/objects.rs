use serde_json::{Value, json};
use tracing::debug;

use super::args::{
    Args, opt_list, require_list, require_scalar, require_same_length, require_str,
    require_str_list,
};
use super::AdapterFuture;
use crate::error::AppError;
use crate::session::{CallOptions, Session};

/// Fields returned for every object lookup.
const OBJECT_RETURN: [&str; 4] = ["id", "name", "type", "path"];

/// Resolve the object at a project path via `ak.wwise.core.object.get`.
pub(super) async fn fetch_object(session: &Session, path: &str) -> Result<Value, AppError> {
    let result = session
        .call(
            "ak.wwise.core.object.get",
            Some(json!({"from": {"path": [path]}})),
            Some(json!({"return": OBJECT_RETURN})),
            CallOptions::default(),
        )
        .await?;

    match result["return"].as_array().and_then(|list| list.first()) {
        Some(object) => Ok(object.clone()),
        None => Err(AppError::not_found(path)),
    }
}

/// Extract the `id` field of an object value.
fn id_of(object: &Value) -> Result<String, AppError> {
    object["id"]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| AppError::validation("one or more objects are missing an 'id' field"))
}

/// Create one object and return the authoring app's `{id, name}` result.
async fn create_one(
    session: &Session,
    parent: &str,
    name: &str,
    object_type: &str,
    extra: Option<Value>,
) -> Result<Value, AppError> {
    let mut call_args = json!({
        "parent": parent,
        "type": object_type,
        "name": name,
        "onNameConflict": "fail",
    });
    if let Some(Value::Object(extra)) = extra {
        for (key, value) in extra {
            call_args[key] = value;
        }
    }
    session
        .call(
            "ak.wwise.core.object.create",
            Some(call_args),
            None,
            CallOptions::default(),
        )
        .await
}

pub(super) fn get_object_at_path<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let path = require_str(&args, "path")?;
        fetch_object(session, path).await
    })
}

pub(super) fn create_objects<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let child_names = require_str_list(&args, "child_names")?;
        let child_types = require_str_list(&args, "child_types")?;

        // Parents come from a previous step's result when provided,
        // otherwise each parent path is resolved to an object first.
        let parents: Vec<Value> = match opt_list(&args, "prev_response_objects")? {
            Some(objects) => objects.clone(),
            None => {
                let parent_paths = require_str_list(&args, "parent_paths")?;
                let mut resolved = Vec::with_capacity(parent_paths.len());
                for path in &parent_paths {
                    resolved.push(fetch_object(session, path).await?);
                }
                resolved
            }
        };

        require_same_length(&[
            ("child_names", child_names.len()),
            ("child_types", child_types.len()),
            ("parents", parents.len()),
        ])?;

        let mut created = Vec::with_capacity(child_names.len());
        for ((parent, name), object_type) in
            parents.iter().zip(&child_names).zip(&child_types)
        {
            let parent_id = id_of(parent)?;
            created.push(create_one(session, &parent_id, name, object_type, None).await?);
        }
        debug!(count = created.len(), "objects created");
        Ok(Value::Array(created))
    })
}

pub(super) fn create_events<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let source_paths = require_str_list(&args, "source_paths")?;
        let dst_parent_paths = require_str_list(&args, "dst_parent_paths")?;
        let event_types = require_str_list(&args, "event_types")?;
        let event_names = require_str_list(&args, "event_names")?;
        require_same_length(&[
            ("source_paths", source_paths.len()),
            ("dst_parent_paths", dst_parent_paths.len()),
            ("event_types", event_types.len()),
            ("event_names", event_names.len()),
        ])?;

        let mut created = Vec::with_capacity(event_names.len());
        for i in 0..event_names.len() {
            // The action child targets the source object; the action type
            // name (Play, Stop, ...) comes from the caller.
            let extra = json!({
                "children": [{
                    "type": "Action",
                    "name": "",
                    "@ActionType": event_types[i],
                    "@Target": source_paths[i],
                }],
            });
            created.push(
                create_one(
                    session,
                    &dst_parent_paths[i],
                    &event_names[i],
                    "Event",
                    Some(extra),
                )
                .await?,
            );
        }
        Ok(Value::Array(created))
    })
}

pub(super) fn create_rtpcs<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let rtpc_names = require_str_list(&args, "rtpc_names")?;
        let parent_paths = require_str_list(&args, "parent_paths")?;
        let min_values = require_list(&args, "min_values")?.clone();
        let max_values = require_list(&args, "max_values")?.clone();
        require_same_length(&[
            ("rtpc_names", rtpc_names.len()),
            ("parent_paths", parent_paths.len()),
            ("min_values", min_values.len()),
            ("max_values", max_values.len()),
        ])?;

        let mut created = Vec::with_capacity(rtpc_names.len());
        for i in 0..rtpc_names.len() {
            let (min, max) = match (min_values[i].as_f64(), max_values[i].as_f64()) {
                (Some(min), Some(max)) => (min, max),
                _ => {
                    return Err(AppError::validation(
                        "rtpc min/max values must be numbers",
                    ));
                }
            };
            if min > max {
                return Err(AppError::validation(format!(
                    "invalid rtpc range for '{}': min {min} > max {max}",
                    rtpc_names[i]
                )));
            }
            let extra = json!({"@Min": min, "@Max": max});
            created.push(
                create_one(
                    session,
                    &parent_paths[i],
                    &rtpc_names[i],
                    "GameParameter",
                    Some(extra),
                )
                .await?,
            );
        }
        Ok(Value::Array(created))
    })
}

/// Shared body of the switch/state family: zip names with parents and
/// create one object of `object_type` per pair.
async fn create_grouped(
    session: &Session,
    args: &Args,
    object_type: &str,
) -> Result<Value, AppError> {
    let names = require_str_list(args, "names")?;
    let parent_paths = require_str_list(args, "parent_paths")?;
    require_same_length(&[("names", names.len()), ("parent_paths", parent_paths.len())])?;

    let mut created = Vec::with_capacity(names.len());
    for (name, parent) in names.iter().zip(&parent_paths) {
        created.push(create_one(session, parent, name, object_type, None).await?);
    }
    Ok(Value::Array(created))
}

pub(super) fn create_switch_groups<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move { create_grouped(session, &args, "SwitchGroup").await })
}

pub(super) fn create_switches<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move { create_grouped(session, &args, "Switch").await })
}

pub(super) fn create_state_groups<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move { create_grouped(session, &args, "StateGroup").await })
}

pub(super) fn create_states<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move { create_grouped(session, &args, "State").await })
}

pub(super) fn rename_objects<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let names = require_str_list(&args, "names")?;

        let objects: Vec<Value> = match opt_list(&args, "paths_of_objects_to_rename")? {
            Some(paths) => {
                let mut resolved = Vec::with_capacity(paths.len());
                for path in paths {
                    let Some(path) = path.as_str() else {
                        return Err(AppError::validation(
                            "paths_of_objects_to_rename must contain strings",
                        ));
                    };
                    resolved.push(fetch_object(session, path).await?);
                }
                resolved
            }
            None => opt_list(&args, "prev_response_objects")?
                .cloned()
                .unwrap_or_default(),
        };

        // Entries a previous step could not produce are skipped, matching
        // the projector's lenient handling of partial results.
        let objects: Vec<&Value> = objects.iter().filter(|o| !o.is_null()).collect();
        if objects.is_empty() {
            return Err(AppError::validation(
                "pass paths_of_objects_to_rename, or prev_response_objects=\"$last\" \
                 to rename the results of a previous step",
            ));
        }
        require_same_length(&[("objects", objects.len()), ("names", names.len())])?;

        let mut renamed = Vec::with_capacity(names.len());
        for (object, name) in objects.iter().zip(&names) {
            let id = id_of(object)?;
            session
                .call(
                    "ak.wwise.core.object.setName",
                    Some(json!({"object": id, "value": name})),
                    None,
                    CallOptions::default(),
                )
                .await?;
            renamed.push(Value::String(name.clone()));
        }
        Ok(Value::Array(renamed))
    })
}

pub(super) fn move_object_by_path<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let source = require_str(&args, "source_path")?;
        let destination = require_str(&args, "destination_parent_path")?;

        let object = fetch_object(session, source).await?;
        let parent = fetch_object(session, destination).await?;
        session
            .call(
                "ak.wwise.core.object.move",
                Some(json!({"object": id_of(&object)?, "parent": id_of(&parent)?})),
                None,
                CallOptions::default(),
            )
            .await
    })
}

pub(super) fn delete_objects<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let paths = require_str_list(&args, "paths")?;
        let mut deleted = Vec::with_capacity(paths.len());
        for path in &paths {
            session
                .call(
                    "ak.wwise.core.object.delete",
                    Some(json!({"object": path})),
                    None,
                    CallOptions::default(),
                )
                .await?;
            deleted.push(Value::String(path.clone()));
        }
        Ok(Value::Array(deleted))
    })
}

pub(super) fn copy_object<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let source = require_str(&args, "source_path")?;
        let destination = require_str(&args, "destination_parent_path")?;

        let object = fetch_object(session, source).await?;
        let parent = fetch_object(session, destination).await?;
        session
            .call(
                "ak.wwise.core.object.copy",
                Some(json!({"object": id_of(&object)?, "parent": id_of(&parent)?})),
                None,
                CallOptions::default(),
            )
            .await
    })
}

pub(super) fn set_object_property<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let path = require_str(&args, "object_path")?;
        let property = require_str(&args, "property_name")?;
        let value = require_scalar(&args, "value")?;

        session
            .call(
                "ak.wwise.core.object.setProperty",
                Some(json!({"object": path, "property": property, "value": value})),
                None,
                CallOptions::default(),
            )
            .await
    })
}

pub(super) fn set_object_reference<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let path = require_str(&args, "object_path")?;
        let reference = require_str(&args, "reference_type")?;
        let target = require_str(&args, "reference_path")?;

        session
            .call(
                "ak.wwise.core.object.setReference",
                Some(json!({"object": path, "reference": reference, "value": target})),
                None,
                CallOptions::default(),
            )
            .await
    })
}

pub(super) fn set_object_notes<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let path = require_str(&args, "object_path")?;
        let notes = require_str(&args, "notes")?;

        session
            .call(
                "ak.wwise.core.object.setNotes",
                Some(json!({"object": path, "value": notes})),
                None,
                CallOptions::default(),
            )
            .await
    })
}

pub(super) fn import_audio<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let source_paths = require_str_list(&args, "source_paths")?;
        let destination_paths = require_str_list(&args, "destination_paths")?;
        require_same_length(&[
            ("source_paths", source_paths.len()),
            ("destination_paths", destination_paths.len()),
        ])?;

        let imports: Vec<Value> = source_paths
            .iter()
            .zip(&destination_paths)
            .map(|(src, dst)| json!({"audioFile": src, "objectPath": dst}))
            .collect();

        // Imports can touch many files; give the waiter extra room.
        session
            .call(
                "ak.wwise.core.audio.import",
                Some(json!({"importOperation": "useExisting", "imports": imports})),
                None,
                CallOptions {
                    timeout: Some(std::time::Duration::from_secs(30)),
                    ..CallOptions::default()
                },
            )
            .await
    })
}
