//! Deterministic replay of a recorded trace.

pub mod engine;
pub mod ops;
pub mod patterns;

pub use engine::{
    ReplayEngine, ReplayOptions, ReplayOutcome, ReplayState, StepPhase, StepReport, StepStatus,
};
pub use ops::{ActionKind, Operation, SkipReason};
pub use patterns::{Collapse, SearchSubmit, StepPattern};

use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::config::Config;
use crate::envelope;
use crate::error::{ReplayError, Result};
use crate::hands::ChromeDriver;
use crate::page::Driver;
use crate::store::{self, TracePaths};
use crate::types::Step;
use crate::vars::{self, collect_needed};

/// Sorted placeholder names a trace needs before it can be replayed.
pub fn list_needed_variables(steps: &[Step]) -> Vec<String> {
    let params: Vec<Value> = steps
        .iter()
        .map(|s| Value::Object(s.params.clone()))
        .collect();
    collect_needed(&Value::Array(params))
}

/// Replays the trace at `trace_path` in Chrome and returns the result payload.
pub async fn replay_trace<F>(
    trace_path: &Path,
    overrides: &HashMap<String, String>,
    prompt: F,
    config: &Config,
) -> Result<String>
where
    F: FnMut(&str) -> Option<String> + Send + 'static,
{
    let options = ReplayOptions {
        step_timeout: config.step_timeout,
        ..ReplayOptions::default()
    };
    let driver = ChromeDriver::new(config.browser.clone());
    replay_trace_with(driver, trace_path, overrides, prompt, options)
        .await
        .map(|outcome| envelope::payload(outcome.result.as_deref()))
}

/// Loads, binds and replays a trace against any driver. Binding may prompt,
/// so it runs on the blocking worker together with the engine; every
/// variable is bound before the session opens.
pub async fn replay_trace_with<D, F>(
    driver: D,
    trace_path: &Path,
    overrides: &HashMap<String, String>,
    prompt: F,
    options: ReplayOptions,
) -> Result<ReplayOutcome>
where
    D: Driver + Send + 'static,
    F: FnMut(&str) -> Option<String> + Send + 'static,
{
    let paths = TracePaths::from_base(trace_path);
    let steps = store::load_trace(&paths.trace)?;
    info!("Loaded {} steps from {}", steps.len(), paths.trace.display());

    let needed = list_needed_variables(&steps);
    let overrides = overrides.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let environment = vars::environment_for(&needed);
        let variables = vars::resolve(&needed, &overrides, &environment, prompt)?;
        ReplayEngine::new(options).replay(&driver, &steps, &variables)
    })
    .await
    .map_err(|e| ReplayError::Worker(e.to_string()))??;

    let failed = outcome.failed_steps().count();
    if failed > 0 {
        warn!("Replay finished with {} failed step(s)", failed);
    } else {
        info!("Replay completed");
    }
    Ok(outcome)
}
