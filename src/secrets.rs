//! Replaces secret literals in recorded steps with `{{NAME}}` placeholders so
//! a trace can be shared without leaking credentials.

use serde_json::Value;

use crate::types::Step;
use crate::vars::token;

/// Secret name to literal value, in registration order.
#[derive(Debug, Clone, Default)]
pub struct SecretMap {
    entries: Vec<(String, String)>,
}

impl SecretMap {
    /// Reads each key from the process environment, skipping unset or empty ones.
    pub fn from_env<S: AsRef<str>>(keys: &[S]) -> Self {
        Self::from_lookup(keys, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<S, F>(keys: &[S], lookup: F) -> Self
    where
        S: AsRef<str>,
        F: Fn(&str) -> Option<String>,
    {
        let entries = keys
            .iter()
            .filter_map(|key| {
                let key = key.as_ref();
                lookup(key)
                    .filter(|value| !value.is_empty())
                    .map(|value| (key.to_string(), value))
            })
            .collect();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    fn abstract_str(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (name, value) in &self.entries {
            if out.contains(value.as_str()) {
                out = out.replace(value.as_str(), &token(name));
            }
        }
        out
    }

    fn abstract_value(&self, value: &mut Value) {
        match value {
            Value::String(s) => *s = self.abstract_str(s),
            Value::Array(items) => items.iter_mut().for_each(|v| self.abstract_value(v)),
            Value::Object(map) => map.values_mut().for_each(|v| self.abstract_value(v)),
            _ => {}
        }
    }
}

/// Rewrites every string leaf of every step's params in place.
pub fn abstract_secrets(steps: &mut [Step], secrets: &SecretMap) {
    if secrets.is_empty() {
        return;
    }
    for step in steps.iter_mut() {
        step.params
            .values_mut()
            .for_each(|v| secrets.abstract_value(v));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::{Variables, substitute};
    use serde_json::json;
    use std::collections::HashMap;

    fn secrets(pairs: &[(&str, &str)]) -> SecretMap {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| *k).collect();
        SecretMap::from_lookup(&keys, |k| env.get(k).cloned())
    }

    #[test]
    fn unset_and_empty_keys_are_skipped() {
        let map = SecretMap::from_lookup(&["USER", "PASS", "BASE_URL"], |k| match k {
            "USER" => Some("alice".into()),
            "PASS" => Some(String::new()),
            _ => None,
        });
        assert_eq!(map.names().collect::<Vec<_>>(), vec!["USER"]);
    }

    #[test]
    fn replaces_secrets_at_any_depth() {
        let map = secrets(&[("USER", "standard_user"), ("BASE_URL", "https://shop.test/")]);
        let mut steps = vec![Step::from_value(&json!({
            "name": "input_text",
            "params": {
                "input_text": {"index": 3, "text": "standard_user"},
                "history": ["visit https://shop.test/ as standard_user", 7, null],
            }
        }))];

        abstract_secrets(&mut steps, &map);

        assert_eq!(
            Value::Object(steps[0].params.clone()),
            json!({
                "input_text": {"index": 3, "text": "{{USER}}"},
                "history": ["visit {{BASE_URL}} as {{USER}}", 7, null],
            })
        );
    }

    #[test]
    fn overlapping_values_are_replaced_in_registration_order() {
        let step = || Step::from_value(&json!({"name": "input_text", "params": {"text": "abcdef"}}));

        let mut steps = vec![step()];
        abstract_secrets(&mut steps, &secrets(&[("PASS", "abc"), ("USER", "abcdef")]));
        assert_eq!(steps[0].params["text"], json!("{{PASS}}def"));

        let mut steps = vec![step()];
        abstract_secrets(&mut steps, &secrets(&[("USER", "abcdef"), ("PASS", "abc")]));
        assert_eq!(steps[0].params["text"], json!("{{USER}}"));
    }

    #[test]
    fn abstracting_then_substituting_restores_every_string() {
        let pairs = [("USER", "standard_user"), ("PASS", "secret_sauce")];
        let map = secrets(&pairs);
        let original = vec![
            Step::from_value(&json!({"name": "input_text", "params": {"text": "standard_user"}})),
            Step::from_value(&json!({"name": "x", "params": {"a": {"b": ["secret_sauce!", "plain"]}}})),
        ];
        let mut steps = original.clone();
        abstract_secrets(&mut steps, &map);
        assert_ne!(steps, original);

        let vars: Variables = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (abstracted, original) in steps.iter().zip(&original) {
            let restored = substitute(&Value::Object(abstracted.params.clone()), &vars);
            assert_eq!(restored, Value::Object(original.params.clone()));
        }
    }
}
