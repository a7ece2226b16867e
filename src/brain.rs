use anyhow::{Result, anyhow};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::types::Params;

const SYSTEM_PROMPT: &str = r#"You are a browser automation agent. You control a real Chrome browser by issuing ONE action at a time as JSON.

Available actions:
- {"name":"go_to_url","params":{"url":"https://...","new_tab":false}}
- {"name":"input_text","params":{"index":3,"text":"search query"}}
- {"name":"click_element_by_index","params":{"index":3}}
- {"name":"send_keys","params":{"keys":"Enter"}}
- {"name":"scroll_down","params":{}}
- {"name":"scroll_up","params":{}}
- {"name":"go_back","params":{}}
- {"name":"wait","params":{"seconds":3}}
- {"name":"extract_content","params":{"goal":"what to read from the page"}}
- {"name":"done","params":{"text":"final answer","success":true}}

Rules:
1. Return ONLY a single JSON object per response. No markdown, no explanation.
2. Target elements by the [N] numbers in the DOM snapshot, passed as "index".
3. After every action you will see the new page state. Decide the next action from what you see.
4. When the task is accomplished, use done. Put the answer the user asked for in "text". Lists of records go in "text" as a JSON array string.
5. If you hit an error, try another approach. If stuck after 3 attempts, use done and explain.
6. Keep actions minimal. Do not over-navigate."#;

/// One action the model asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub name: String,
    #[serde(default)]
    pub params: Params,
}

/// What the model sees after each action.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub url: String,
    pub title: String,
    pub dom_snapshot: String,
    pub extracted: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Chat-completions client that drives one learn session.
pub struct Brain {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    temperature: f32,
    conversation: Vec<ChatMessage>,
}

impl Brain {
    pub fn new(api_key: Option<String>, api_base: &str, model: &str, temperature: f32) -> Result<Self> {
        let api_key = api_key.ok_or_else(|| anyhow!("OPENAI_API_KEY not set in environment"))?;
        Ok(Self {
            client: Client::new(),
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
            conversation: vec![ChatMessage {
                role: "system".to_string(),
                content: SYSTEM_PROMPT.to_string(),
            }],
        })
    }

    pub fn start_task(&mut self, prompt: &str) {
        self.push("user", format!("Task: {prompt}"));
    }

    /// Feed observation back to the LLM.
    pub fn observe(&mut self, state: &Observation) {
        let mut text = format!(
            "Page URL: {}\nTitle: {}\n\nDOM:\n{}",
            state.url, state.title, state.dom_snapshot
        );
        if let Some(ref err) = state.error {
            text.push_str(&format!("\n\nERROR from last action: {err}"));
        }
        if let Some(ref extracted) = state.extracted {
            text.push_str(&format!("\n\nExtracted page text:\n{extracted}"));
        }
        text.push_str("\n\nWhat is your next action?");
        self.push("user", text);
    }

    /// Ask the LLM for the next action.
    pub async fn decide_next_action(&mut self) -> Result<AgentAction> {
        if self.conversation.len() > 40 {
            warn!("Conversation history is long ({} messages)", self.conversation.len());
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": self.conversation,
                "temperature": self.temperature,
            }))
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            let message = body["error"]["message"].as_str().unwrap_or("Unknown API error");
            return Err(anyhow!("LLM API error ({status}): {message}"));
        }

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("No content in LLM response: {body}"))?
            .to_string();
        debug!("LLM says: {}", content);
        self.push("assistant", content.clone());

        let action = parse_action(&content)?;
        info!("Model chose {}", action.name);
        Ok(action)
    }

    fn push(&mut self, role: &str, content: String) {
        self.conversation.push(ChatMessage {
            role: role.to_string(),
            content,
        });
    }
}

/// Parses a model reply, tolerating markdown fences around the JSON.
pub fn parse_action(content: &str) -> Result<AgentAction> {
    let cleaned = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str(cleaned).map_err(|e| anyhow!("Failed to parse LLM response: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_and_bare_actions() {
        let action = parse_action("```json\n{\"name\":\"go_to_url\",\"params\":{\"url\":\"https://a\"}}\n```").unwrap();
        assert_eq!(action.name, "go_to_url");
        assert_eq!(action.params["url"], "https://a");

        let action = parse_action(r#"{"name":"scroll_down"}"#).unwrap();
        assert!(action.params.is_empty());

        assert!(parse_action("I will click the button").is_err());
    }

    #[test]
    fn observation_includes_errors_and_extractions() {
        let mut brain = Brain::new(Some("k".into()), "https://api.test/v1/", "m", 0.0).unwrap();
        brain.observe(&Observation {
            url: "https://a".into(),
            error: Some("element gone".into()),
            extracted: Some("Price: 3".into()),
            ..Observation::default()
        });
        let last = &brain.conversation.last().unwrap().content;
        assert!(last.contains("ERROR from last action: element gone"));
        assert!(last.contains("Price: 3"));
        assert_eq!(brain.api_base, "https://api.test/v1");
    }

    #[test]
    fn missing_key_is_an_error() {
        assert!(Brain::new(None, "https://api.test", "m", 0.0).is_err());
    }
}
