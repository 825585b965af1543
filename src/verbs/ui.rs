use serde_json::{Value, json};

use super::AdapterFuture;
use super::args::{Args, require_str, require_str_list};
use crate::session::{CallOptions, Session};

pub(super) fn switch_layout<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let layout_name = require_str(&args, "layout_name")?;
        session
            .call(
                "ak.wwise.ui.layout.setLayout",
                Some(json!({"layoutName": layout_name})),
                None,
                CallOptions::default(),
            )
            .await
    })
}

pub(super) fn execute_ui_command<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let command = require_str(&args, "command")?;
        let mut call_args = json!({"command": command});
        match args.get("object_paths") {
            None | Some(Value::Null) => {}
            Some(_) => {
                call_args["objects"] = json!(require_str_list(&args, "object_paths")?);
            }
        }
        session
            .call(
                "ak.wwise.ui.commands.execute",
                Some(call_args),
                None,
                CallOptions::default(),
            )
            .await
    })
}

pub(super) fn save_project<'a>(session: &'a Session, _args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        session
            .call(
                "ak.wwise.core.project.save",
                None,
                None,
                CallOptions::default(),
            )
            .await
    })
}

pub(super) fn undo<'a>(session: &'a Session, _args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        session
            .call("ak.wwise.core.undo.undo", None, None, CallOptions::default())
            .await
    })
}

pub(super) fn redo<'a>(session: &'a Session, _args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        session
            .call("ak.wwise.core.undo.redo", None, None, CallOptions::default())
            .await
    })
}
