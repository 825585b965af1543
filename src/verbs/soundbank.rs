use std::time::Duration;

use serde_json::{Value, json};

use super::AdapterFuture;
use super::args::{Args, opt_str, require_str, require_str_list};
use crate::session::{CallOptions, Session};

/// Soundbank generation walks the whole project; the default one-second
/// waiter is far too tight for it.
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);

pub(super) fn include_in_soundbank<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let include_paths = require_str_list(&args, "include_paths")?;
        let soundbank_path = require_str(&args, "soundbank_path")?;

        let inclusions: Vec<Value> = include_paths
            .iter()
            .map(|path| {
                json!({
                    "object": path,
                    "filter": ["events", "structures", "media"],
                })
            })
            .collect();

        session
            .call(
                "ak.wwise.core.soundbank.setInclusions",
                Some(json!({
                    "soundbank": soundbank_path,
                    "operation": "add",
                    "inclusions": inclusions,
                })),
                None,
                CallOptions::default(),
            )
            .await
    })
}

pub(super) fn generate_soundbanks<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let soundbank_names = require_str_list(&args, "soundbank_names")?;
        let platforms = require_str_list(&args, "platforms")?;
        let languages = match args.get("languages") {
            None | Some(Value::Null) => Vec::new(),
            Some(_) => require_str_list(&args, "languages")?,
        };

        let soundbanks: Vec<Value> =
            soundbank_names.iter().map(|name| json!({"name": name})).collect();
        let mut call_args = json!({
            "soundbanks": soundbanks,
            "platforms": platforms,
            "writeToDisk": true,
        });
        if !languages.is_empty() {
            call_args["languages"] = json!(languages);
        }

        session
            .call(
                "ak.wwise.core.soundbank.generate",
                Some(call_args),
                None,
                CallOptions {
                    timeout: Some(GENERATE_TIMEOUT),
                    ..CallOptions::default()
                },
            )
            .await
    })
}

pub(super) fn get_soundbank_inclusions<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let soundbank_path = require_str(&args, "soundbank_path")?;
        session
            .call(
                "ak.wwise.core.soundbank.getInclusions",
                Some(json!({"soundbank": soundbank_path})),
                None,
                CallOptions::default(),
            )
            .await
    })
}

pub(super) fn source_control_status<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let call_args = match args.get("files") {
            None | Some(Value::Null) => json!({}),
            Some(_) => json!({"files": require_str_list(&args, "files")?}),
        };
        session
            .call(
                "ak.wwise.core.sourceControl.getStatus",
                Some(call_args),
                None,
                CallOptions::default(),
            )
            .await
    })
}

pub(super) fn source_control_commit<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let files = require_str_list(&args, "files")?;
        let mut call_args = json!({"files": files});
        if let Some(message) = opt_str(&args, "message")? {
            call_args["message"] = json!(message);
        }
        session
            .call(
                "ak.wwise.core.sourceControl.commit",
                Some(call_args),
                None,
                CallOptions::default(),
            )
            .await
    })
}

pub(super) fn source_control_revert<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let files = require_str_list(&args, "files")?;
        session
            .call(
                "ak.wwise.core.sourceControl.revert",
                Some(json!({"files": files})),
                None,
                CallOptions::default(),
            )
            .await
    })
}

pub(super) fn load_work_unit<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let path = require_str(&args, "path")?;
        session
            .call(
                "ak.wwise.core.workUnit.load",
                Some(json!({"workUnit": path})),
                None,
                CallOptions::default(),
            )
            .await
    })
}

pub(super) fn unload_work_unit<'a>(session: &'a Session, args: Args) -> AdapterFuture<'a> {
    Box::pin(async move {
        let path = require_str(&args, "path")?;
        session
            .call(
                "ak.wwise.core.workUnit.unload",
                Some(json!({"workUnit": path})),
                None,
                CallOptions::default(),
            )
            .await
    })
}
