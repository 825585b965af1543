use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;

use super::AdapterFuture;
use super::args::{
    Args, opt_non_negative_ms, opt_str, require_f64, require_non_negative_ms, require_position,
    require_str,
};
use crate::session::{CallOptions, Session};

/// Interval between interpolation steps of an RTPC ramp.
const RTPC_STEP_MS: u64 = 50;
/// Interval between interpolation steps of a position ramp.
const POSITION_STEP_MS: u64 = 100;

/// Stable id for a named game object. Registration and later posts both
/// derive the id from the name, so no lookup round-trip is needed.
fn game_object_id(name: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish()
}

/// The "Global" game object means "no specific object": the field is
/// omitted and the sound engine uses its transport object.
fn resolve_game_object(name: Option<&str>) -> Option<u64> {
    match name {
        None => None,
        Some(name) if name.eq_ignore_ascii_case("global") => None,
        Some(name) => Some(game_object_id(name)),
    }
}

fn fire_and_forget(delay_ms: u64) -> CallOptions {
    CallOptions {
        due_in: Some(Duration::from_millis(delay_ms)),
        no_wait: true,
        timeout: None,
    }
}

pub(super) fn post_event<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let event_name = require_str(&args, "event_name")?.to_owned();
        let game_object = resolve_game_object(opt_str(&args, "game_obj_name")?);
        let delay_ms = opt_non_negative_ms(&args, "delay_ms")?;

        let mut call_args = json!({"event": event_name});
        if let Some(id) = game_object {
            call_args["gameObject"] = json!(id);
        }

        if delay_ms > 0 {
            // Scheduled fire-and-forget: the step returns immediately and
            // the dispatcher fires the call in due order.
            session
                .call(
                    "ak.soundengine.postEvent",
                    Some(call_args),
                    None,
                    fire_and_forget(delay_ms),
                )
                .await?;
            debug!(event = %event_name, delay_ms, "event post scheduled");
            return Ok(json!({"scheduled": true, "delay_ms": delay_ms}));
        }

        session
            .call(
                "ak.soundengine.postEvent",
                Some(call_args),
                None,
                CallOptions::default(),
            )
            .await
    })
}

pub(super) fn set_rtpc<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let rtpc_name = require_str(&args, "rtpc_name")?.to_owned();
        let start = require_f64(&args, "start")?;
        let end = require_f64(&args, "end")?;
        let duration_ms = require_non_negative_ms(&args, "duration_ms")?;
        let game_object = resolve_game_object(opt_str(&args, "game_obj_name")?);

        let set_value = |value: f64| {
            let mut call_args = json!({"rtpc": rtpc_name, "value": value});
            if let Some(id) = game_object {
                call_args["gameObject"] = json!(id);
            }
            call_args
        };

        if duration_ms == 0 {
            return session
                .call(
                    "ak.soundengine.setRTPCValue",
                    Some(set_value(end)),
                    None,
                    CallOptions::default(),
                )
                .await;
        }

        // Interpolated ramp: one scheduled fire-and-forget call per step,
        // endpoints included, all ordered by the dispatcher's timed queue.
        let steps = duration_ms.div_ceil(RTPC_STEP_MS);
        for i in 0..=steps {
            let at_ms = (i * RTPC_STEP_MS).min(duration_ms);
            #[allow(clippy::cast_precision_loss)]
            let t = at_ms as f64 / duration_ms as f64;
            let value = start + (end - start) * t;
            session
                .call(
                    "ak.soundengine.setRTPCValue",
                    Some(set_value(value)),
                    None,
                    fire_and_forget(at_ms),
                )
                .await?;
        }
        debug!(rtpc = %rtpc_name, steps = steps + 1, duration_ms, "rtpc ramp scheduled");
        Ok(json!({"steps_scheduled": steps + 1, "duration_ms": duration_ms}))
    })
}

pub(super) fn set_state<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let state_group = require_str(&args, "state_group")?;
        let state = require_str(&args, "state")?;
        let delay_ms = opt_non_negative_ms(&args, "delay_ms")?;

        let call_args = json!({"stateGroup": state_group, "state": state});
        if delay_ms > 0 {
            session
                .call(
                    "ak.soundengine.setState",
                    Some(call_args),
                    None,
                    fire_and_forget(delay_ms),
                )
                .await?;
            return Ok(json!({"scheduled": true, "delay_ms": delay_ms}));
        }
        session
            .call(
                "ak.soundengine.setState",
                Some(call_args),
                None,
                CallOptions::default(),
            )
            .await
    })
}

pub(super) fn set_switch<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let switch_group = require_str(&args, "switch_group")?;
        let switch = require_str(&args, "switch")?;
        let game_object = resolve_game_object(Some(require_str(&args, "game_obj_name")?));
        let delay_ms = opt_non_negative_ms(&args, "delay_ms")?;

        let mut call_args = json!({"switchGroup": switch_group, "switchState": switch});
        if let Some(id) = game_object {
            call_args["gameObject"] = json!(id);
        }

        if delay_ms > 0 {
            session
                .call(
                    "ak.soundengine.setSwitch",
                    Some(call_args),
                    None,
                    fire_and_forget(delay_ms),
                )
                .await?;
            return Ok(json!({"scheduled": true, "delay_ms": delay_ms}));
        }
        session
            .call(
                "ak.soundengine.setSwitch",
                Some(call_args),
                None,
                CallOptions::default(),
            )
            .await
    })
}

fn position_payload(position: [f64; 3]) -> Value {
    json!({
        "position": {"x": position[0], "y": position[1], "z": position[2]},
        "orientationFront": {"x": 0.0, "y": 1.0, "z": 0.0},
        "orientationTop": {"x": 0.0, "y": 0.0, "z": 1.0},
    })
}

pub(super) fn register_game_object<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let name = require_str(&args, "name")?.to_owned();
        let id = game_object_id(&name);

        session
            .call(
                "ak.soundengine.registerGameObj",
                Some(json!({"gameObject": id, "name": name})),
                None,
                CallOptions::default(),
            )
            .await?;

        if args.get("position").is_some_and(|p| !p.is_null()) {
            let position = require_position(&args, "position")?;
            session
                .call(
                    "ak.soundengine.setPosition",
                    Some(json!({"gameObject": id, "position": position_payload(position)})),
                    None,
                    CallOptions::default(),
                )
                .await?;
        }

        Ok(json!({"id": id, "name": name}))
    })
}

pub(super) fn unregister_game_object<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let name = require_str(&args, "name")?;
        session
            .call(
                "ak.soundengine.unregisterGameObj",
                Some(json!({"gameObject": game_object_id(name)})),
                None,
                CallOptions::default(),
            )
            .await
    })
}

pub(super) fn move_game_object<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let name = require_str(&args, "game_obj_name")?.to_owned();
        let start_pos = require_position(&args, "start_pos")?;
        let end_pos = require_position(&args, "end_pos")?;
        let duration_ms = require_non_negative_ms(&args, "duration_ms")?;
        let delay_ms = opt_non_negative_ms(&args, "delay_ms")?;
        let id = game_object_id(&name);

        let steps = if duration_ms == 0 {
            0
        } else {
            duration_ms.div_ceil(POSITION_STEP_MS)
        };
        for i in 0..=steps {
            let at_ms = (i * POSITION_STEP_MS).min(duration_ms);
            #[allow(clippy::cast_precision_loss)]
            let t = if duration_ms == 0 {
                1.0
            } else {
                at_ms as f64 / duration_ms as f64
            };
            let position = [
                start_pos[0] + (end_pos[0] - start_pos[0]) * t,
                start_pos[1] + (end_pos[1] - start_pos[1]) * t,
                start_pos[2] + (end_pos[2] - start_pos[2]) * t,
            ];
            session
                .call(
                    "ak.soundengine.setPosition",
                    Some(json!({"gameObject": id, "position": position_payload(position)})),
                    None,
                    fire_and_forget(delay_ms + at_ms),
                )
                .await?;
        }
        debug!(game_object = %name, steps = steps + 1, duration_ms, "position ramp scheduled");
        Ok(json!({"steps_scheduled": steps + 1, "duration_ms": duration_ms}))
    })
}

pub(super) fn stop_all_sounds<'a>(session: &'a Session, _args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        session
            .call("ak.soundengine.stopAll", None, None, CallOptions::default())
            .await
    })
}
