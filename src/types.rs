use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameters of a step, keyed by parameter name.
pub type Params = Map<String, Value>;

/// Key under which a step carries the metadata of the element it acted on.
pub const INTERACTED_ELEMENT_KEY: &str = "interacted_element";

pub const UNKNOWN_ACTION: &str = "unknown";

/// One recorded or replayable action.
///
/// `name` is an open set: kinds the replay engine does not know are passed
/// through to the page by name instead of being rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default = "unknown_action")]
    pub name: String,
    #[serde(default)]
    pub params: Params,
}

fn unknown_action() -> String {
    UNKNOWN_ACTION.to_string()
}

impl Step {
    pub fn new(name: impl Into<String>, params: Params) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN_ACTION, Params::new())
    }

    /// Lenient conversion of a persisted trace entry. Anything that is not an
    /// object degrades to the unknown step; a non-string name or a non-object
    /// `params` falls back to the defaults.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::unknown();
        };
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_ACTION);
        let params = obj
            .get("params")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Self::new(name, params)
    }

    /// The element metadata captured at record time, if any.
    pub fn element(&self) -> Option<ElementMetadata> {
        self.params
            .get(INTERACTED_ELEMENT_KEY)
            .and_then(ElementMetadata::from_value)
    }

    /// Looks a parameter up in the nested `{name: {...}}` block first and at
    /// the top level second.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params
            .get(&self.name)
            .and_then(Value::as_object)
            .and_then(|inner| inner.get(key))
            .filter(|v| !v.is_null())
            .or_else(|| self.params.get(key).filter(|v| !v.is_null()))
    }
}

/// Snapshot of the DOM node an action targeted, captured once at record time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementMetadata {
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
}

impl ElementMetadata {
    /// Lenient parse: only object input yields metadata, and string fields of
    /// the wrong type are treated as absent.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        Some(Self {
            attributes: obj
                .get("attributes")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            css_selector: text("css_selector"),
            xpath: text("xpath"),
            tag_name: text("tag_name"),
        })
    }

    /// A non-empty string attribute. Non-string values count as absent.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Companion artifact written next to each trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub visited_urls: Vec<String>,
    #[serde(default)]
    pub action_names: Vec<String>,
    #[serde(default)]
    pub raw: Vec<Value>,
}
