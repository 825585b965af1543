mod parser;
mod resolve;
mod runner;

use serde::Deserialize;
use serde_json::{Map, Value};

pub use runner::{PlanError, PlanReport, StepLog, execute_plan};

/// One submitted plan step, before validation.
///
/// Steps arrive either as call-expression strings
/// (`"post_event(\"Play_X\", delay_ms=500)"`) or as structured objects
/// (`{command, args, save_as?}`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StepInput {
    Expression(String),
    Structured {
        command: String,
        #[serde(default)]
        args: Map<String, Value>,
        #[serde(default)]
        save_as: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_input_deserializes_both_forms() {
        let steps: Vec<StepInput> = serde_json::from_value(json!([
            "list_all_event_names()",
            {"command": "create_objects", "args": {"child_names": ["A"]}, "save_as": "made"},
            {"command": "ping"},
        ]))
        .unwrap();

        assert!(matches!(&steps[0], StepInput::Expression(s) if s == "list_all_event_names()"));
        match &steps[1] {
            StepInput::Structured {
                command,
                args,
                save_as,
            } => {
                assert_eq!(command, "create_objects");
                assert_eq!(args["child_names"], json!(["A"]));
                assert_eq!(save_as.as_deref(), Some("made"));
            }
            StepInput::Expression(_) => panic!("expected structured step"),
        }
        match &steps[2] {
            StepInput::Structured { args, save_as, .. } => {
                assert!(args.is_empty());
                assert!(save_as.is_none());
            }
            StepInput::Expression(_) => panic!("expected structured step"),
        }
    }
}
