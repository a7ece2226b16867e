//! Records one model-driven session and persists it as a replayable trace.

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::brain::{AgentAction, Brain, Observation};
use crate::config::Config;
use crate::dom;
use crate::envelope;
use crate::hands::{ChromeDriver, ChromePage};
use crate::normalize::normalize;
use crate::page::{Page, SessionGuard};
use crate::replay::ops::DONE;
use crate::secrets::{SecretMap, abstract_secrets};
use crate::store::{self, TracePaths};
use crate::types::{ElementMetadata, INTERACTED_ELEMENT_KEY, Step, TraceMetadata};

pub const DEFAULT_ENV_KEYS: [&str; 3] = ["USER", "PASS", "BASE_URL"];

#[derive(Debug, Clone)]
pub struct LearnOptions {
    pub model: String,
    pub temperature: f32,
    /// Environment variables whose values become placeholders in the trace.
    pub env_keys: Vec<String>,
    pub max_steps: usize,
}

impl LearnOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            env_keys: DEFAULT_ENV_KEYS.iter().map(|k| k.to_string()).collect(),
            max_steps: config.max_steps,
        }
    }
}

/// Actions in the shape external agents serialize them:
/// `{<name>: {params}, "interacted_element": metadata-or-null}`.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    pub raw: Vec<Value>,
    pub action_names: Vec<String>,
    pub visited_urls: Vec<String>,
    pub result: Option<String>,
}

impl Recording {
    pub fn record(&mut self, action: &AgentAction, element: Option<ElementMetadata>) {
        let mut record = serde_json::Map::new();
        record.insert(action.name.clone(), Value::Object(action.params.clone()));
        record.insert(INTERACTED_ELEMENT_KEY.to_string(), json!(element));
        self.raw.push(Value::Object(record));
        self.action_names.push(action.name.clone());
    }

    pub fn visit(&mut self, url: &str) {
        if url.is_empty() || url == "about:blank" || self.visited_urls.last().is_some_and(|u| u == url) {
            return;
        }
        self.visited_urls.push(url.to_string());
    }

    /// Canonical steps with the given secrets turned into placeholders.
    pub fn steps(&self, secrets: &SecretMap) -> Vec<Step> {
        let mut steps = normalize(&self.raw, &self.action_names);
        abstract_secrets(&mut steps, secrets);
        steps
    }

    pub fn metadata(&self, prompt: &str, options: &LearnOptions) -> TraceMetadata {
        TraceMetadata {
            prompt: Some(prompt.to_string()),
            model: Some(options.model.clone()),
            temperature: Some(options.temperature),
            visited_urls: self.visited_urls.clone(),
            action_names: self.action_names.clone(),
            raw: self.raw.clone(),
        }
    }
}

type SharedSession = Arc<Mutex<SessionGuard<ChromePage>>>;

/// Runs one learn session end to end. Writes `<base>.json` and
/// `<base>.meta.json` and returns the metadata path with the result payload.
pub async fn record_trace(
    prompt: &str,
    output_base: &Path,
    options: &LearnOptions,
    config: &Config,
) -> Result<(PathBuf, String)> {
    let mut brain = Brain::new(
        config.api_key.clone(),
        &config.api_base,
        &options.model,
        options.temperature,
    )?;

    let driver = ChromeDriver::new(config.browser.clone());
    let session: SharedSession = tokio::task::spawn_blocking(move || SessionGuard::open(&driver))
        .await
        .map_err(|e| anyhow!("Browser launch panicked: {e}"))?
        .context("failed to start browser session")
        .map(|guard| Arc::new(Mutex::new(guard)))?;

    let recording = drive(&mut brain, &session, prompt, options.max_steps).await;

    // Closing talks to Chrome synchronously; keep it off the async workers.
    if tokio::task::spawn_blocking(move || drop(session)).await.is_err() {
        warn!("Browser session release panicked");
    }
    let recording = recording?;

    let steps = recording.steps(&SecretMap::from_env(&options.env_keys));
    let paths = TracePaths::from_base(output_base);
    store::save_trace(&paths.trace, &steps)?;
    store::save_metadata(&paths.metadata, &recording.metadata(prompt, options))?;
    info!(
        "Recorded {} actions in {} (metadata in {})",
        steps.len(),
        paths.trace.display(),
        paths.metadata.display()
    );

    Ok((paths.metadata, envelope::payload(recording.result.as_deref())))
}

async fn drive(
    brain: &mut Brain,
    session: &SharedSession,
    prompt: &str,
    max_steps: usize,
) -> Result<Recording> {
    let mut recording = Recording::default();
    brain.start_task(prompt);

    let first = run_blocking(session, |page| Ok(observe(page, None, None))).await?;
    recording.visit(&first.url);
    brain.observe(&first);

    for step in 1..=max_steps {
        let action = match brain.decide_next_action().await {
            Ok(action) => action,
            Err(e) => {
                warn!("Stopping: model error: {:#}", e);
                return Ok(recording);
            }
        };

        if action.name == DONE {
            let text = action.params.get("text").and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            });
            info!("Task complete after {} action(s)", step);
            recording.record(&action, None);
            recording.result = text;
            return Ok(recording);
        }

        let params = Value::Object(action.params.clone());
        info!("Step {}: {} {}", step, action.name, params);
        let learned = action.clone();
        let (element, observation) = run_blocking(session, move |page| Ok(execute(page, &learned))).await?;
        if let Some(ref err) = observation.error {
            warn!("Step {} failed: {}", step, err);
        }
        recording.record(&action, element);
        recording.visit(&observation.url);
        brain.observe(&observation);
    }

    warn!("Reached maximum step limit ({})", max_steps);
    Ok(recording)
}

async fn run_blocking<T, F>(session: &SharedSession, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut ChromePage) -> Result<T> + Send + 'static,
{
    let session = session.clone();
    tokio::task::spawn_blocking(move || {
        let mut guard = session
            .lock()
            .map_err(|_| anyhow!("browser session lock poisoned"))?;
        f(&mut guard)
    })
    .await
    .map_err(|e| anyhow!("browser worker panicked: {e}"))?
}

fn execute(page: &mut ChromePage, action: &AgentAction) -> (Option<ElementMetadata>, Observation) {
    let element = action
        .params
        .get("index")
        .and_then(Value::as_u64)
        .and_then(|index| match dom::describe_element(page.tab(), index) {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Could not capture element {}: {:#}", index, e);
                None
            }
        });

    let (extracted, error) = if action.name == "extract_content" {
        match dom::page_text(page.tab()) {
            Ok(text) => (Some(text), None),
            Err(e) => (None, Some(format!("{:#}", e))),
        }
    } else {
        match page.execute_native(&action.name, &action.params) {
            Ok(()) => (None, None),
            Err(e) => (None, Some(format!("{:#}", e))),
        }
    };

    (element, observe(page, extracted, error))
}

fn observe(page: &ChromePage, extracted: Option<String>, error: Option<String>) -> Observation {
    let tab = page.tab();
    Observation {
        url: dom::get_current_url(tab).unwrap_or_else(|_| "unknown".into()),
        title: dom::get_page_title(tab).unwrap_or_else(|_| "untitled".into()),
        dom_snapshot: dom::capture_dom_snapshot(tab).unwrap_or_default(),
        extracted,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::ops::{Operation, plan};

    fn action(value: Value) -> AgentAction {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn recorded_session_normalizes_into_replayable_steps() {
        let mut recording = Recording::default();
        recording.record(
            &action(json!({"name": "go_to_url", "params": {"url": "https://shop.test/"}})),
            None,
        );
        recording.record(
            &action(json!({"name": "input_text", "params": {"index": 2, "text": "standard_user"}})),
            ElementMetadata::from_value(&json!({"attributes": {"id": "user-name"}, "xpath": "html/body/input"})),
        );
        recording.record(
            &action(json!({"name": "done", "params": {"text": "ok", "success": true}})),
            None,
        );

        let secrets = SecretMap::from_lookup(&["USER", "BASE_URL"], |k| match k {
            "USER" => Some("standard_user".into()),
            "BASE_URL" => Some("https://shop.test/".into()),
            _ => None,
        });
        let steps = recording.steps(&secrets);

        assert_eq!(recording.action_names, vec!["go_to_url", "input_text", "done"]);
        assert_eq!(steps[0].name, "go_to_url");
        assert_eq!(steps[0].param("url"), Some(&json!("{{BASE_URL}}")));
        assert_eq!(
            plan(&steps[1]),
            Operation::Fill {
                selector: "#user-name".into(),
                text: "{{USER}}".into()
            }
        );
        assert_eq!(plan(&steps[2]), Operation::Finish("ok".into()));
    }

    #[test]
    fn visited_urls_skip_blank_and_repeats() {
        let mut recording = Recording::default();
        for url in ["about:blank", "https://a", "https://a", "https://b", "", "https://a"] {
            recording.visit(url);
        }
        assert_eq!(recording.visited_urls, vec!["https://a", "https://b", "https://a"]);
    }

    #[test]
    fn metadata_carries_session_details() {
        let mut recording = Recording::default();
        recording.record(&action(json!({"name": "scroll_down"})), None);
        let options = LearnOptions {
            model: "m".into(),
            temperature: 0.7,
            env_keys: vec![],
            max_steps: 5,
        };
        let meta = recording.metadata("scroll a bit", &options);
        assert_eq!(meta.prompt.as_deref(), Some("scroll a bit"));
        assert_eq!(meta.model.as_deref(), Some("m"));
        assert_eq!(meta.raw, vec![json!({"scroll_down": {}, "interacted_element": null})]);
    }
}
