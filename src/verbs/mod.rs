mod args;
mod objects;
mod query;
mod soundbank;
mod soundengine;
mod topics;
mod ui;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;

use serde_json::Value;

use crate::error::AppError;
use crate::session::Session;

pub use args::Args;

/// Future returned by a verb adapter.
pub type AdapterFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, AppError>> + Send + 'a>>;

/// A verb adapter: validates argument shape, resolves name-to-id lookups
/// through the Authoring API, then issues one or more dispatcher calls.
pub type Adapter = for<'a> fn(&'a Session, Args) -> AdapterFuture<'a>;

/// One named parameter in a verb signature.
pub struct Param {
    pub name: &'static str,
    pub required: bool,
}

const fn req(name: &'static str) -> Param {
    Param {
        name,
        required: true,
    }
}

const fn opt(name: &'static str) -> Param {
    Param {
        name,
        required: false,
    }
}

/// A registered verb: signature, documentation, mutation flag, adapter.
pub struct Verb {
    pub name: &'static str,
    pub params: &'static [Param],
    pub doc: &'static str,
    /// Whether this verb mutates project state. Plans containing at
    /// least one mutating verb run inside an undo group.
    pub mutating: bool,
    pub adapter: Adapter,
}

impl Verb {
    /// Render the call signature, e.g.
    /// `rename_objects(paths_of_objects_to_rename, prev_response_objects, names)`.
    #[must_use]
    pub fn signature(&self) -> String {
        let rendered: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                if p.required {
                    p.name.to_owned()
                } else {
                    format!("{}=None", p.name)
                }
            })
            .collect();
        format!("{}({})", self.name, rendered.join(", "))
    }

    /// Bind positional and keyword arguments against this signature.
    ///
    /// # Errors
    ///
    /// `Validation` on surplus positionals, unknown or duplicate keywords,
    /// or a missing required parameter.
    pub fn bind_args(
        &self,
        positional: Vec<Value>,
        keyword: Args,
    ) -> Result<Args, AppError> {
        if positional.len() > self.params.len() {
            return Err(AppError::validation(format!(
                "{}: takes at most {} arguments, got {}",
                self.name,
                self.params.len(),
                positional.len()
            )));
        }

        let mut bound = Args::new();
        for (param, value) in self.params.iter().zip(positional) {
            bound.insert(param.name.to_owned(), value);
        }
        for (name, value) in keyword {
            if !self.params.iter().any(|p| p.name == name) {
                return Err(AppError::validation(format!(
                    "{}: unknown argument '{name}'",
                    self.name
                )));
            }
            if bound.contains_key(&name) {
                return Err(AppError::validation(format!(
                    "{}: argument '{name}' given both positionally and by keyword",
                    self.name
                )));
            }
            bound.insert(name, value);
        }

        for param in self.params.iter().filter(|p| p.required) {
            if !bound.contains_key(param.name) {
                return Err(AppError::validation(format!(
                    "{}: missing required argument '{}'",
                    self.name, param.name
                )));
            }
        }
        Ok(bound)
    }
}

/// The static verb table. Compile-time registration keeps `list_commands`
/// output deterministic.
fn table() -> &'static BTreeMap<&'static str, Verb> {
    static TABLE: OnceLock<BTreeMap<&'static str, Verb>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let verbs = [
            // --- Object authoring -------------------------------------
            Verb {
                name: "create_objects",
                params: const { &[
                    req("child_names"),
                    req("child_types"),
                    req("parent_paths"),
                    opt("prev_response_objects"),
                ] },
                doc: "Create child objects under the given parents (or under objects from a previous step).",
                mutating: true,
                adapter: objects::create_objects,
            },
            Verb {
                name: "create_events",
                params: const { &[
                    req("source_paths"),
                    req("dst_parent_paths"),
                    req("event_types"),
                    req("event_names"),
                ] },
                doc: "Create events whose actions target the given source objects.",
                mutating: true,
                adapter: objects::create_events,
            },
            Verb {
                name: "create_rtpcs",
                params: const { &[
                    req("rtpc_names"),
                    req("parent_paths"),
                    req("min_values"),
                    req("max_values"),
                ] },
                doc: "Create game parameters with the given value ranges.",
                mutating: true,
                adapter: objects::create_rtpcs,
            },
            Verb {
                name: "create_switch_groups",
                params: const { &[req("names"), req("parent_paths")] },
                doc: "Create switch groups under the given parents.",
                mutating: true,
                adapter: objects::create_switch_groups,
            },
            Verb {
                name: "create_switches",
                params: const { &[req("names"), req("parent_paths")] },
                doc: "Create switches under the given switch groups.",
                mutating: true,
                adapter: objects::create_switches,
            },
            Verb {
                name: "create_state_groups",
                params: const { &[req("names"), req("parent_paths")] },
                doc: "Create state groups under the given parents.",
                mutating: true,
                adapter: objects::create_state_groups,
            },
            Verb {
                name: "create_states",
                params: const { &[req("names"), req("parent_paths")] },
                doc: "Create states under the given state groups.",
                mutating: true,
                adapter: objects::create_states,
            },
            Verb {
                name: "rename_objects",
                params: const { &[
                    req("paths_of_objects_to_rename"),
                    req("prev_response_objects"),
                    req("names"),
                ] },
                doc: "Rename objects addressed by path, or objects returned by a previous step ($last).",
                mutating: true,
                adapter: objects::rename_objects,
            },
            Verb {
                name: "move_object_by_path",
                params: const { &[req("source_path"), req("destination_parent_path")] },
                doc: "Move an object to a new parent.",
                mutating: true,
                adapter: objects::move_object_by_path,
            },
            Verb {
                name: "delete_objects",
                params: const { &[req("paths")] },
                doc: "Delete the objects at the given paths.",
                mutating: true,
                adapter: objects::delete_objects,
            },
            Verb {
                name: "copy_object",
                params: const { &[req("source_path"), req("destination_parent_path")] },
                doc: "Copy an object under a new parent.",
                mutating: true,
                adapter: objects::copy_object,
            },
            Verb {
                name: "set_object_property",
                params: const { &[req("object_path"), req("property_name"), req("value")] },
                doc: "Set a property on the object at the given path.",
                mutating: true,
                adapter: objects::set_object_property,
            },
            Verb {
                name: "set_object_reference",
                params: const { &[req("object_path"), req("reference_type"), req("reference_path")] },
                doc: "Point a reference of the object at another object.",
                mutating: true,
                adapter: objects::set_object_reference,
            },
            Verb {
                name: "set_object_notes",
                params: const { &[req("object_path"), req("notes")] },
                doc: "Set the notes field of the object at the given path.",
                mutating: true,
                adapter: objects::set_object_notes,
            },
            Verb {
                name: "import_audio",
                params: const { &[req("source_paths"), req("destination_paths")] },
                doc: "Import audio files as sources under the given object paths.",
                mutating: true,
                adapter: objects::import_audio,
            },
            Verb {
                name: "get_object_at_path",
                params: const { &[req("path")] },
                doc: "Fetch id, name, and type of the object at a project path.",
                mutating: false,
                adapter: objects::get_object_at_path,
            },
            // --- Queries ----------------------------------------------
            Verb {
                name: "list_all_event_names",
                params: const { &[] },
                doc: "List the names of every event in the project.",
                mutating: false,
                adapter: query::list_all_event_names,
            },
            Verb {
                name: "list_all_rtpc_names",
                params: const { &[] },
                doc: "List the names of every game parameter in the project.",
                mutating: false,
                adapter: query::list_all_rtpc_names,
            },
            Verb {
                name: "list_all_switch_groups_and_switches",
                params: const { &[] },
                doc: "List switch groups with their switches, grouped by group name.",
                mutating: false,
                adapter: query::list_all_switch_groups_and_switches,
            },
            Verb {
                name: "list_all_state_groups_and_states",
                params: const { &[] },
                doc: "List state groups with their states, grouped by group name.",
                mutating: false,
                adapter: query::list_all_state_groups_and_states,
            },
            Verb {
                name: "list_all_game_objects",
                params: const { &[] },
                doc: "List the game objects known to the profiler.",
                mutating: false,
                adapter: query::list_all_game_objects,
            },
            Verb {
                name: "get_selected_objects",
                params: const { &[] },
                doc: "Return the objects currently selected in the authoring UI.",
                mutating: false,
                adapter: query::get_selected_objects,
            },
            Verb {
                name: "get_project_info",
                params: const { &[] },
                doc: "Return project metadata (name, path, platforms, languages).",
                mutating: false,
                adapter: query::get_project_info,
            },
            Verb {
                name: "get_waapi_schema",
                params: const { &[opt("uri")] },
                doc: "Fetch the Authoring API schema, optionally for a single URI.",
                mutating: false,
                adapter: query::get_waapi_schema,
            },
            Verb {
                name: "get_waapi_topics",
                params: const { &[] },
                doc: "Fetch the list of subscribable Authoring API topics.",
                mutating: false,
                adapter: query::get_waapi_topics,
            },
            Verb {
                name: "ping",
                params: const { &[] },
                doc: "Check that the authoring app answers; returns its version info.",
                mutating: false,
                adapter: query::ping,
            },
            // --- Sound engine -----------------------------------------
            Verb {
                name: "post_event",
                params: const { &[req("event_name"), opt("game_obj_name"), opt("delay_ms")] },
                doc: "Post an event, optionally on a game object and after a delay.",
                mutating: true,
                adapter: soundengine::post_event,
            },
            Verb {
                name: "set_rtpc",
                params: const { &[
                    req("rtpc_name"),
                    req("start"),
                    req("end"),
                    req("duration_ms"),
                    opt("game_obj_name"),
                ] },
                doc: "Ramp a game parameter from start to end over the given duration.",
                mutating: true,
                adapter: soundengine::set_rtpc,
            },
            Verb {
                name: "set_state",
                params: const { &[req("state_group"), req("state"), opt("delay_ms")] },
                doc: "Set a state, optionally after a delay.",
                mutating: true,
                adapter: soundengine::set_state,
            },
            Verb {
                name: "set_switch",
                params: const { &[req("switch_group"), req("switch"), req("game_obj_name"), opt("delay_ms")] },
                doc: "Set a switch on a game object, optionally after a delay.",
                mutating: true,
                adapter: soundengine::set_switch,
            },
            Verb {
                name: "register_game_object",
                params: const { &[req("name"), opt("position")] },
                doc: "Register a named game object, optionally at a position.",
                mutating: true,
                adapter: soundengine::register_game_object,
            },
            Verb {
                name: "unregister_game_object",
                params: const { &[req("name")] },
                doc: "Unregister a previously registered game object.",
                mutating: true,
                adapter: soundengine::unregister_game_object,
            },
            Verb {
                name: "move_game_object",
                params: const { &[
                    req("game_obj_name"),
                    req("start_pos"),
                    req("end_pos"),
                    req("duration_ms"),
                    opt("delay_ms"),
                ] },
                doc: "Ramp a game object's position from start to end over the given duration.",
                mutating: true,
                adapter: soundengine::move_game_object,
            },
            Verb {
                name: "stop_all_sounds",
                params: const { &[] },
                doc: "Stop all playing sounds.",
                mutating: true,
                adapter: soundengine::stop_all_sounds,
            },
            // --- Soundbanks, source control, work units ---------------
            Verb {
                name: "include_in_soundbank",
                params: const { &[req("include_paths"), req("soundbank_path")] },
                doc: "Add the given objects to a soundbank's inclusion list.",
                mutating: true,
                adapter: soundbank::include_in_soundbank,
            },
            Verb {
                name: "generate_soundbanks",
                params: const { &[req("soundbank_names"), req("platforms"), opt("languages")] },
                doc: "Generate the named soundbanks for the given platforms.",
                mutating: true,
                adapter: soundbank::generate_soundbanks,
            },
            Verb {
                name: "get_soundbank_inclusions",
                params: const { &[req("soundbank_path")] },
                doc: "List a soundbank's current inclusions.",
                mutating: false,
                adapter: soundbank::get_soundbank_inclusions,
            },
            Verb {
                name: "source_control_status",
                params: const { &[opt("files")] },
                doc: "Query source control status for the given files (or the whole project).",
                mutating: false,
                adapter: soundbank::source_control_status,
            },
            Verb {
                name: "source_control_commit",
                params: const { &[req("files"), opt("message")] },
                doc: "Commit the given files to source control.",
                mutating: true,
                adapter: soundbank::source_control_commit,
            },
            Verb {
                name: "source_control_revert",
                params: const { &[req("files")] },
                doc: "Revert local changes to the given files.",
                mutating: true,
                adapter: soundbank::source_control_revert,
            },
            Verb {
                name: "load_work_unit",
                params: const { &[req("path")] },
                doc: "Load the work unit file at the given path.",
                mutating: true,
                adapter: soundbank::load_work_unit,
            },
            Verb {
                name: "unload_work_unit",
                params: const { &[req("path")] },
                doc: "Unload the work unit file at the given path.",
                mutating: true,
                adapter: soundbank::unload_work_unit,
            },
            // --- UI and project ---------------------------------------
            Verb {
                name: "switch_layout",
                params: const { &[req("layout_name")] },
                doc: "Switch the authoring UI to the named layout.",
                mutating: true,
                adapter: ui::switch_layout,
            },
            Verb {
                name: "execute_ui_command",
                params: const { &[req("command"), opt("object_paths")] },
                doc: "Execute an authoring UI command, optionally against objects.",
                mutating: true,
                adapter: ui::execute_ui_command,
            },
            Verb {
                name: "save_project",
                params: const { &[] },
                doc: "Save the project.",
                mutating: true,
                adapter: ui::save_project,
            },
            Verb {
                name: "undo",
                params: const { &[] },
                doc: "Undo the last authoring operation.",
                mutating: true,
                adapter: ui::undo,
            },
            Verb {
                name: "redo",
                params: const { &[] },
                doc: "Redo the last undone authoring operation.",
                mutating: true,
                adapter: ui::redo,
            },
            // --- Subscriptions ----------------------------------------
            Verb {
                name: "subscribe_topic",
                params: const { &[req("topic_uri"), opt("options")] },
                doc: "Subscribe to a topic; returns a subscription id for get_subscription_events.",
                mutating: false,
                adapter: topics::subscribe_topic,
            },
            Verb {
                name: "unsubscribe_topic",
                params: const { &[req("subscription_id")] },
                doc: "Drop a subscription created by subscribe_topic.",
                mutating: false,
                adapter: topics::unsubscribe_topic,
            },
            Verb {
                name: "get_subscription_events",
                params: const { &[req("subscription_id"), opt("max_count"), opt("clear")] },
                doc: "Drain buffered events from a subscription without blocking.",
                mutating: false,
                adapter: topics::get_subscription_events,
            },
            Verb {
                name: "list_topic_uris",
                params: const { &[] },
                doc: "List the subscribable topic URIs.",
                mutating: false,
                adapter: topics::list_topic_uris,
            },
        ];

        verbs.into_iter().map(|verb| (verb.name, verb)).collect()
    })
}

/// Look up a verb by name.
#[must_use]
pub fn find(name: &str) -> Option<&'static Verb> {
    table().get(name)
}

/// Whether the named verb mutates project state. Unknown verbs are not
/// mutating (they fail verb lookup before the undo decision matters).
#[must_use]
pub fn is_mutating(name: &str) -> bool {
    find(name).is_some_and(|verb| verb.mutating)
}

/// Discovery listing: one entry per verb, `"verb(sig)\n    doc"`, in
/// name order.
#[must_use]
pub fn list() -> Vec<String> {
    table()
        .values()
        .map(|verb| format!("{}\n    {}", verb.signature(), verb.doc))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_is_sorted_and_documented() {
        let listing = list();
        assert!(!listing.is_empty());
        let mut sorted = listing.clone();
        sorted.sort();
        assert_eq!(listing, sorted);
        for entry in &listing {
            let (sig, doc) = entry.split_once("\n    ").unwrap();
            assert!(sig.contains('('), "signature missing parens: {sig}");
            assert!(!doc.is_empty());
        }
    }

    #[test]
    fn mutating_classification() {
        for name in [
            "create_objects",
            "rename_objects",
            "move_object_by_path",
            "delete_objects",
            "set_object_property",
            "import_audio",
            "post_event",
            "generate_soundbanks",
            "source_control_commit",
            "load_work_unit",
            "switch_layout",
            "save_project",
        ] {
            assert!(is_mutating(name), "{name} should be mutating");
        }
        for name in [
            "list_all_event_names",
            "get_object_at_path",
            "get_selected_objects",
            "ping",
            "subscribe_topic",
            "get_subscription_events",
            "list_topic_uris",
            "source_control_status",
            "get_soundbank_inclusions",
        ] {
            assert!(!is_mutating(name), "{name} should not be mutating");
        }
        assert!(!is_mutating("no_such_verb"));
    }

    #[test]
    fn signature_renders_optionals() {
        let verb = find("post_event").unwrap();
        assert_eq!(
            verb.signature(),
            "post_event(event_name, game_obj_name=None, delay_ms=None)"
        );
    }

    #[test]
    fn bind_positional_then_keyword() {
        let verb = find("move_object_by_path").unwrap();
        let bound = verb
            .bind_args(vec![json!("\\Events\\A")], {
                let mut kw = Args::new();
                kw.insert("destination_parent_path".into(), json!("\\Events\\B"));
                kw
            })
            .unwrap();
        assert_eq!(bound["source_path"], "\\Events\\A");
        assert_eq!(bound["destination_parent_path"], "\\Events\\B");
    }

    #[test]
    fn bind_rejects_surplus_positionals() {
        let verb = find("ping").unwrap();
        let err = verb.bind_args(vec![json!(1)], Args::new()).unwrap_err();
        assert!(err.message.contains("at most 0"));
    }

    #[test]
    fn bind_rejects_unknown_keyword() {
        let verb = find("ping").unwrap();
        let mut kw = Args::new();
        kw.insert("bogus".into(), json!(true));
        let err = verb.bind_args(Vec::new(), kw).unwrap_err();
        assert!(err.message.contains("unknown argument 'bogus'"));
    }

    #[test]
    fn bind_rejects_duplicate_binding() {
        let verb = find("move_object_by_path").unwrap();
        let mut kw = Args::new();
        kw.insert("source_path".into(), json!("\\A"));
        let err = verb.bind_args(vec![json!("\\B")], kw).unwrap_err();
        assert!(err.message.contains("both positionally and by keyword"));
    }

    #[test]
    fn bind_rejects_missing_required() {
        let verb = find("move_object_by_path").unwrap();
        let err = verb.bind_args(Vec::new(), Args::new()).unwrap_err();
        assert!(err.message.contains("missing required argument"));
    }
}
