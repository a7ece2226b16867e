//! `{{NAME}}` placeholder handling on the replay side: find the names a trace
//! needs, bind each to a value, and substitute them back into parameters.

use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{BufRead, Write};
use std::sync::LazyLock;
use tracing::warn;

use crate::error::{ReplayError, Result};

// {{NAME}}: anything but braces between the double braces
static TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("Invalid regex"));

/// Bound placeholder values, ordered by name.
pub type Variables = BTreeMap<String, String>;

/// Renders the placeholder for `name`.
pub fn token(name: &str) -> String {
    format!("{{{{{name}}}}}")
}

/// Sorted, deduplicated names of every placeholder in `value`.
pub fn collect_needed(value: &Value) -> Vec<String> {
    let mut needed = BTreeSet::new();
    scan(value, &mut needed);
    needed.into_iter().collect()
}

fn scan(value: &Value, needed: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            for cap in TOKEN_REGEX.captures_iter(s) {
                needed.insert(cap[1].to_string());
            }
        }
        Value::Array(items) => items.iter().for_each(|v| scan(v, needed)),
        Value::Object(map) => map.values().for_each(|v| scan(v, needed)),
        _ => {}
    }
}

/// Process environment values for `needed`. Unset and non-UTF-8 values are
/// left out, as is the rest of the environment.
pub fn environment_for(needed: &[String]) -> HashMap<String, String> {
    needed
        .iter()
        .filter_map(|name| std::env::var(name).ok().map(|value| (name.clone(), value)))
        .collect()
}

/// Binds every needed name: override first, then environment, then `prompt`.
/// Empty strings count as unset at every stage. Fails on the first name that
/// stays unbound.
pub fn resolve<F>(
    needed: &[String],
    overrides: &HashMap<String, String>,
    environment: &HashMap<String, String>,
    mut prompt: F,
) -> Result<Variables>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut variables = Variables::new();
    for name in needed {
        let value = overrides
            .get(name)
            .filter(|v| !v.is_empty())
            .or_else(|| environment.get(name).filter(|v| !v.is_empty()))
            .cloned()
            .or_else(|| prompt(name).filter(|v| !v.is_empty()))
            .ok_or_else(|| ReplayError::MissingVariable(name.clone()))?;
        variables.insert(name.clone(), value);
    }
    Ok(variables)
}

/// Replaces known placeholders in every string of `value`. Unknown
/// placeholders stay as they are.
pub fn substitute(value: &Value, variables: &Variables) -> Value {
    match value {
        Value::String(s) => Value::String(substitute_str(s, variables)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, variables)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, variables)))
                .collect(),
        ),
        other => other.clone(),
    }
}

pub fn substitute_str(text: &str, variables: &Variables) -> String {
    if variables.is_empty() {
        return text.to_string();
    }
    TOKEN_REGEX
        .replace_all(text, |cap: &Captures| match variables.get(&cap[1]) {
            Some(value) => value.clone(),
            None => cap[0].to_string(),
        })
        .into_owned()
}

/// Parses `KEY=VALUE` pairs, splitting on the first `=`.
pub fn parse_overrides<S: AsRef<str>>(pairs: &[S]) -> HashMap<String, String> {
    let mut overrides = HashMap::new();
    for pair in pairs {
        match pair.as_ref().split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                overrides.insert(key.to_string(), value.to_string());
            }
            _ => warn!("Ignoring override '{}': expected KEY=VALUE", pair.as_ref()),
        }
    }
    overrides
}

/// Asks for a value on stdin. `None` on EOF or a read error.
pub fn prompt_stdin(name: &str) -> Option<String> {
    print!("Enter value for {name}: ");
    std::io::stdout().flush().ok()?;
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn collect_is_sorted_and_deduplicated() {
        let trace = json!([
            {"params": {"text": "{{USER}}-{{PASS}}"}},
            {"params": {"nested": [{"url": "{{USER}}"}, 3, null]}}
        ]);
        assert_eq!(collect_needed(&trace), vec!["PASS", "USER"]);
        assert!(collect_needed(&json!({"text": "{{}} and {single}"})).is_empty());
    }

    #[test]
    fn unresolved_tokens_are_left_in_place() {
        let vars: Variables = [("USER".to_string(), "alice".to_string())].into();
        assert_eq!(
            substitute(&json!("hello {{USER}} {{MISSING}}"), &vars),
            json!("hello alice {{MISSING}}")
        );
    }

    #[test]
    fn substitute_walks_containers_and_skips_non_strings() {
        let vars: Variables = [("N".to_string(), "5".to_string())].into();
        let value = json!({"a": ["{{N}}", 1, true], "b": {"c": "x{{N}}x"}, "d": null});
        assert_eq!(
            substitute(&value, &vars),
            json!({"a": ["5", 1, true], "b": {"c": "x5x"}, "d": null})
        );
    }

    #[test]
    fn resolve_prefers_override_then_environment_then_prompt() {
        let needed = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let overrides = map(&[("A", "from-cli"), ("B", "")]);
        let env = map(&[("A", "from-env"), ("B", "env-b")]);
        let mut asked = Vec::new();
        let vars = resolve(&needed, &overrides, &env, |name| {
            asked.push(name.to_string());
            Some(format!("typed-{name}"))
        })
        .unwrap();
        assert_eq!(vars["A"], "from-cli");
        assert_eq!(vars["B"], "env-b");
        assert_eq!(vars["C"], "typed-C");
        assert_eq!(asked, vec!["C"]);
    }

    #[test]
    fn resolve_fails_when_a_name_stays_unbound() {
        let needed = vec!["PASS".to_string()];
        let err = resolve(&needed, &HashMap::new(), &HashMap::new(), |_| None).unwrap_err();
        assert!(matches!(err, ReplayError::MissingVariable(name) if name == "PASS"));

        let err = resolve(&needed, &HashMap::new(), &HashMap::new(), |_| Some(String::new()))
            .unwrap_err();
        assert!(matches!(err, ReplayError::MissingVariable(_)));
    }

    #[test]
    fn overrides_split_on_first_equals() {
        let parsed = parse_overrides(&["USER=foo", "URL=https://a/?x=1", "junk", "=nokey"]);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["USER"], "foo");
        assert_eq!(parsed["URL"], "https://a/?x=1");
    }
}
