//! Maps a recorded step to the operation replay performs for it.

use serde_json::Value;
use std::fmt;

use crate::selector::derive_selector;
use crate::types::{INTERACTED_ELEMENT_KEY, Params, Step};

pub const DONE: &str = "done";
pub const INPUT_TEXT: &str = "input_text";
pub const CLICK_ELEMENT: &str = "click_element_by_index";

/// Actions that need live model reasoning or touch local files.
const NON_REPLAYABLE: [&str; 6] = [
    "extract_structured_data",
    "extract_content",
    "write_file",
    "replace_file_str",
    "read_file",
    "upload_file",
];

/// Top-level keys carried into native params next to a nested block.
const CARRIED_KEYS: [&str; 4] = ["url", "new_tab", "delay", "timeout"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Done,
    InputText,
    ClickElement,
    NonReplayable,
    Passthrough,
}

impl ActionKind {
    pub fn of(name: &str) -> Self {
        match name {
            DONE => ActionKind::Done,
            INPUT_TEXT => ActionKind::InputText,
            CLICK_ELEMENT => ActionKind::ClickElement,
            n if NON_REPLAYABLE.contains(&n) => ActionKind::NonReplayable,
            _ => ActionKind::Passthrough,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Ends the replay with this result.
    Finish(String),
    Fill { selector: String, text: String },
    Click { selector: String },
    /// Fill, press Enter, wait for the results page.
    SearchSubmit { selector: String, text: String },
    Native { name: String, params: Params },
    Skip(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    EmptyDone,
    NoTarget,
    MissingText,
    NonReplayable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::EmptyDone => "done step carries no result",
            SkipReason::NoTarget => "no selector and no index recorded",
            SkipReason::MissingText => "no text recorded",
            SkipReason::NonReplayable => "action is not replayable",
        };
        f.write_str(text)
    }
}

/// Plans one step whose placeholders are already substituted.
pub fn plan(step: &Step) -> Operation {
    match ActionKind::of(&step.name) {
        ActionKind::Done => plan_done(step),
        ActionKind::InputText => plan_input(step),
        ActionKind::ClickElement => plan_click(step),
        ActionKind::NonReplayable => Operation::Skip(SkipReason::NonReplayable),
        ActionKind::Passthrough => Operation::Native {
            name: step.name.clone(),
            params: flatten_for_native(&step.name, &step.params),
        },
    }
}

fn plan_done(step: &Step) -> Operation {
    match step.param("text").and_then(value_text) {
        Some(text) => Operation::Finish(text),
        None => Operation::Skip(SkipReason::EmptyDone),
    }
}

fn plan_input(step: &Step) -> Operation {
    let Some(text) = step.param("text").and_then(value_text) else {
        return Operation::Skip(SkipReason::MissingText);
    };
    if let Some(selector) = derive_selector(step.element().as_ref()) {
        return Operation::Fill { selector, text };
    }
    match step.param("index") {
        Some(index) => {
            let mut params = Params::new();
            params.insert("index".into(), index.clone());
            params.insert("text".into(), Value::String(text));
            Operation::Native {
                name: INPUT_TEXT.into(),
                params,
            }
        }
        None => Operation::Skip(SkipReason::NoTarget),
    }
}

fn plan_click(step: &Step) -> Operation {
    if let Some(selector) = derive_selector(step.element().as_ref()) {
        return Operation::Click { selector };
    }
    match step.param("index") {
        Some(index) => {
            let mut params = Params::new();
            params.insert("index".into(), index.clone());
            Operation::Native {
                name: CLICK_ELEMENT.into(),
                params,
            }
        }
        None => Operation::Skip(SkipReason::NoTarget),
    }
}

/// Flattens the `{name: {...}}` nesting agents serialize actions with. With a
/// nested block, its non-null entries plus a few carried top-level keys are
/// used; without one, every top-level entry but the element metadata is.
pub fn flatten_for_native(name: &str, params: &Params) -> Params {
    match params.get(name).and_then(Value::as_object) {
        Some(nested) => {
            let mut flat: Params = nested
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for key in CARRIED_KEYS {
                if let Some(v) = params.get(key).filter(|v| !v.is_null()) {
                    flat.entry(key).or_insert_with(|| v.clone());
                }
            }
            flat
        }
        None => params
            .iter()
            .filter(|(k, v)| k.as_str() != INTERACTED_ELEMENT_KEY && !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(value: Value) -> Step {
        Step::from_value(&value)
    }

    #[test]
    fn dispatch_table_is_closed_with_passthrough() {
        assert_eq!(ActionKind::of("done"), ActionKind::Done);
        assert_eq!(ActionKind::of("input_text"), ActionKind::InputText);
        assert_eq!(ActionKind::of("click_element_by_index"), ActionKind::ClickElement);
        assert_eq!(ActionKind::of("write_file"), ActionKind::NonReplayable);
        assert_eq!(ActionKind::of("scroll_down"), ActionKind::Passthrough);
        assert_eq!(ActionKind::of("unknown"), ActionKind::Passthrough);
    }

    #[test]
    fn done_yields_result_or_nothing() {
        let s = step(json!({"name": "done", "params": {"done": {"text": "ok", "success": true}}}));
        assert_eq!(plan(&s), Operation::Finish("ok".into()));

        let s = step(json!({"name": "done", "params": {"text": ["a", "b"]}}));
        assert_eq!(plan(&s), Operation::Finish(r#"["a","b"]"#.into()));

        let s = step(json!({"name": "done", "params": {}}));
        assert_eq!(plan(&s), Operation::Skip(SkipReason::EmptyDone));
    }

    #[test]
    fn input_uses_selector_then_index() {
        let s = step(json!({"name": "input_text", "params": {
            "input_text": {"index": 5, "text": "hi"},
            "interacted_element": {"attributes": {"id": "q"}}
        }}));
        assert_eq!(
            plan(&s),
            Operation::Fill {
                selector: "#q".into(),
                text: "hi".into()
            }
        );

        let s = step(json!({"name": "input_text", "params": {"input_text": {"index": 5, "text": "hi"}}}));
        match plan(&s) {
            Operation::Native { name, params } => {
                assert_eq!(name, "input_text");
                assert_eq!(Value::Object(params), json!({"index": 5, "text": "hi"}));
            }
            other => panic!("unexpected {other:?}"),
        }

        let s = step(json!({"name": "input_text", "params": {"text": "hi"}}));
        assert_eq!(plan(&s), Operation::Skip(SkipReason::NoTarget));
    }

    #[test]
    fn click_without_selector_or_index_is_skipped() {
        let s = step(json!({"name": "click_element_by_index", "params": {"interacted_element": null}}));
        assert_eq!(plan(&s), Operation::Skip(SkipReason::NoTarget));

        let s = step(json!({"name": "click_element_by_index", "params": {
            "interacted_element": {"xpath": "html/body/a"}
        }}));
        assert_eq!(
            plan(&s),
            Operation::Click {
                selector: "xpath=/html/body/a".into()
            }
        );
    }

    #[test]
    fn passthrough_flattens_nested_params() {
        let params = json!({
            "go_to_url": {"url": "https://a", "new_tab": null},
            "timeout": 5,
            "interacted_element": null
        });
        let flat = flatten_for_native("go_to_url", params.as_object().unwrap());
        assert_eq!(Value::Object(flat), json!({"url": "https://a", "timeout": 5}));

        let params = json!({"keys": "Enter", "interacted_element": {"attributes": {}}});
        let flat = flatten_for_native("send_keys", params.as_object().unwrap());
        assert_eq!(Value::Object(flat), json!({"keys": "Enter"}));
    }
}
