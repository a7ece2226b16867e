//! Turns whatever an agent emitted into canonical `{name, params}` steps.

use serde_json::{Map, Value};

use crate::types::{Params, Step, UNKNOWN_ACTION};

const NAME_KEYS: [&str; 4] = ["name", "action", "action_name", "type"];

const PARAM_KEYS: [&str; 3] = ["params", "arguments", "kwargs"];

/// Top-level fields that usually are action parameters.
const LIKELY_PARAM_KEYS: [&str; 12] = [
    "url", "index", "text", "value", "selector", "role", "name", "x", "y", "keys", "delay",
    "timeout",
];

/// Bookkeeping fields that never are action parameters.
const RESERVED_KEYS: [&str; 13] = [
    "name",
    "action",
    "action_name",
    "type",
    "timestamp",
    "ts",
    "id",
    "success",
    "error",
    "message",
    "result",
    "status",
    "duration",
];

/// Normalizes raw agent records. `canonical_names[i]` names record `i` when
/// the record carries no name of its own. Output length always equals input
/// length.
pub fn normalize(raw: &[Value], canonical_names: &[String]) -> Vec<Step> {
    raw.iter()
        .enumerate()
        .map(|(i, record)| normalize_record(record, canonical_names.get(i)))
        .collect()
}

fn normalize_record(record: &Value, canonical: Option<&String>) -> Step {
    let Some(obj) = record.as_object() else {
        return Step::unknown();
    };

    let name = NAME_KEYS
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str).filter(|s| !s.is_empty()))
        .or_else(|| canonical.map(String::as_str).filter(|s| !s.is_empty()))
        .unwrap_or(UNKNOWN_ACTION);

    let mut params = PARAM_KEYS
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_object).filter(|m| !m.is_empty()))
        .cloned()
        .unwrap_or_default();

    if params.is_empty() {
        params = recover_params(obj);
    }

    Step::new(name, params)
}

fn recover_params(obj: &Map<String, Value>) -> Params {
    let likely: Params = obj
        .iter()
        .filter(|(k, _)| LIKELY_PARAM_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if !likely.is_empty() {
        return likely;
    }
    obj.iter()
        .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
