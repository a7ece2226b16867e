use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Returned instead of an envelope when a run produced no result.
pub const NO_RESULT: &str = "No result was produced.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Text,
    List,
    Json,
}

/// Standard shape of a learn or replay result handed to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub content: Value,
    pub data_type: DataType,
}

impl ResultEnvelope {
    /// Classifies a final answer: JSON arrays are lists, JSON objects are
    /// json (unless they already are an envelope), everything else is text.
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(Value::Array(items)) => Self {
                content: Value::Array(items),
                data_type: DataType::List,
            },
            Ok(Value::Object(map)) => {
                let value = Value::Object(map);
                serde_json::from_value::<ResultEnvelope>(value.clone()).unwrap_or(Self {
                    content: value,
                    data_type: DataType::Json,
                })
            }
            _ => Self {
                content: Value::String(text.to_string()),
                data_type: DataType::Text,
            },
        }
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| NO_RESULT.to_string())
    }
}

/// Serialized envelope for `result`, or the no-result sentinel.
pub fn payload(result: Option<&str>) -> String {
    match result {
        Some(text) => ResultEnvelope::from_text(text).to_json_string(),
        None => NO_RESULT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_final_answers() {
        let text = ResultEnvelope::from_text("Inventory has 6 items");
        assert_eq!(text.data_type, DataType::Text);
        assert_eq!(text.content, json!("Inventory has 6 items"));

        let list = ResultEnvelope::from_text(r#"[{"name": "Backpack", "price": "29.99"}]"#);
        assert_eq!(list.data_type, DataType::List);

        let object = ResultEnvelope::from_text(r#"{"total": 3}"#);
        assert_eq!(object.data_type, DataType::Json);
        assert_eq!(object.content, json!({"total": 3}));

        assert_eq!(ResultEnvelope::from_text("42").data_type, DataType::Text);
    }

    #[test]
    fn existing_envelopes_pass_through() {
        let env = ResultEnvelope::from_text(r#"{"content": ["a"], "data_type": "list"}"#);
        assert_eq!(env.data_type, DataType::List);
        assert_eq!(env.content, json!(["a"]));
    }

    #[test]
    fn payload_serializes_or_reports_nothing() {
        assert_eq!(payload(None), NO_RESULT);
        let parsed: Value = serde_json::from_str(&payload(Some("ok"))).unwrap();
        assert_eq!(parsed, json!({"content": "ok", "data_type": "text"}));
    }
}
