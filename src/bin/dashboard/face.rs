use anyhow::{Result, anyhow};
use arpa::store::{self, TracePaths};
use arpa::{Config, LearnOptions, list_needed_variables, record_trace, replay_trace};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

/// Job progress streamed to the page via SSE.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DashboardEvent {
    Started { job: &'static str, name: String },
    Finished { job: &'static str, name: String, payload: String },
    Failed { job: &'static str, name: String, message: String },
}

impl DashboardEvent {
    fn to_sse_event(&self) -> Event {
        let kind = match self {
            DashboardEvent::Started { .. } => "started",
            DashboardEvent::Finished { .. } => "finished",
            DashboardEvent::Failed { .. } => "failed",
        };
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        Event::default().event(kind).data(data)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub event_tx: broadcast::Sender<DashboardEvent>,
}

impl AppState {
    fn trace_base(&self, name: &str) -> Option<std::path::PathBuf> {
        let name = store::sanitize_name(name);
        (!name.is_empty()).then(|| self.config.workflows_dir.join(name))
    }

    fn emit(&self, event: DashboardEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[derive(Deserialize)]
struct LearnRequest {
    prompt: String,
    name: String,
}

#[derive(Deserialize)]
struct ReplayRequest {
    name: String,
    #[serde(default)]
    overrides: HashMap<String, String>,
}

/// Serve the dashboard on the configured port, or the next free one of ten.
pub async fn serve(config: Arc<Config>) -> Result<()> {
    let (event_tx, _) = broadcast::channel::<DashboardEvent>(64);
    let first_port = config.dashboard_port;
    let state = Arc::new(AppState { config, event_tx });

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/workflows", get(workflows_handler))
        .route("/workflows/{name}/variables", get(variables_handler))
        .route("/learn", post(learn_handler))
        .route("/replay", post(replay_handler))
        .route("/events", get(sse_handler))
        .route("/favicon.ico", get(|| async { StatusCode::NO_CONTENT }))
        .with_state(state);

    let mut listener = None;
    for port in first_port..first_port.saturating_add(10) {
        if let Ok(l) = tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
            listener = Some((l, port));
            break;
        }
    }
    let (listener, port) = listener.ok_or_else(|| {
        anyhow!("Could not bind to any port {}-{}", first_port, first_port.saturating_add(9))
    })?;

    info!("Dashboard running at http://localhost:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn workflows_handler(State(state): State<Arc<AppState>>) -> Response {
    match store::list_workflows(&state.config.workflows_dir) {
        Ok(names) => Json(names).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn variables_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    let Some(base) = state.trace_base(&name) else {
        return (StatusCode::BAD_REQUEST, "invalid workflow name").into_response();
    };
    match store::load_trace(&TracePaths::from_base(base).trace) {
        Ok(steps) => Json(list_needed_variables(&steps)).into_response(),
        Err(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

async fn learn_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LearnRequest>,
) -> Response {
    let Some(base) = state.trace_base(&request.name) else {
        return (StatusCode::BAD_REQUEST, "invalid workflow name").into_response();
    };
    if request.prompt.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "prompt is required").into_response();
    }
    let name = store::sanitize_name(&request.name);
    info!("Learning workflow '{}'", name);
    state.emit(DashboardEvent::Started { job: "learn", name: name.clone() });

    tokio::spawn(async move {
        let options = LearnOptions::from_config(&state.config);
        let event = match record_trace(&request.prompt, &base, &options, &state.config).await {
            Ok((_, payload)) => DashboardEvent::Finished { job: "learn", name, payload },
            Err(e) => {
                warn!("Learning '{}' failed: {:#}", name, e);
                DashboardEvent::Failed { job: "learn", name, message: format!("{:#}", e) }
            }
        };
        state.emit(event);
    });

    (StatusCode::ACCEPTED, "started").into_response()
}

async fn replay_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReplayRequest>,
) -> Response {
    let Some(base) = state.trace_base(&request.name) else {
        return (StatusCode::BAD_REQUEST, "invalid workflow name").into_response();
    };
    let name = store::sanitize_name(&request.name);
    info!("Replaying workflow '{}'", name);
    state.emit(DashboardEvent::Started { job: "replay", name: name.clone() });

    tokio::spawn(async move {
        // No terminal here: anything not supplied in the form is unbound.
        let event = match replay_trace(&base, &request.overrides, |_| None, &state.config).await {
            Ok(payload) => DashboardEvent::Finished { job: "replay", name, payload },
            Err(e) => {
                warn!("Replaying '{}' failed: {}", name, e);
                DashboardEvent::Failed { job: "replay", name, message: e.to_string() }
            }
        };
        state.emit(event);
    });

    (StatusCode::ACCEPTED, "started").into_response()
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();
    let stream =
        BroadcastStream::new(rx).filter_map(|result: Result<DashboardEvent, _>| match result {
            Ok(event) => Some(Ok::<_, Infallible>(event.to_sse_event())),
            Err(_) => None,
        });
    Sse::new(stream)
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Agentic RPA</title>
<style>
  * { margin: 0; padding: 0; box-sizing: border-box; }
  body { background: #1a1a1a; color: #fff; font-family: system-ui, sans-serif; padding: 32px; }
  h1 { font-size: 22px; margin-bottom: 24px; }
  section { background: #2a2a2a; border: 1px solid #444; border-radius: 8px; padding: 20px; margin-bottom: 20px; max-width: 800px; }
  h2 { font-size: 16px; margin-bottom: 12px; }
  label { display: block; font-size: 13px; color: #aaa; margin: 10px 0 4px; }
  input, textarea, select { width: 100%; background: #1f1f1f; color: #fff; border: 1px solid #444; border-radius: 6px; padding: 8px; }
  button { margin-top: 12px; background: #87c540; color: #1a1a1a; border: 0; border-radius: 6px; padding: 8px 16px; font-weight: 600; cursor: pointer; }
  button.secondary { background: #333; color: #fff; }
  pre { white-space: pre-wrap; background: #111; padding: 12px; border-radius: 6px; margin-top: 12px; font-size: 13px; }
</style>
</head>
<body>
<h1>Agentic RPA</h1>

<section>
  <h2>Record a workflow</h2>
  <label for="prompt">Task prompt</label>
  <textarea id="prompt" rows="4" placeholder="Go to wikipedia.org, search 'Rust' and extract the first paragraph."></textarea>
  <label for="learn-name">Workflow name</label>
  <input id="learn-name" placeholder="wikipedia_search">
  <button onclick="learn()">Record</button>
</section>

<section>
  <h2>Run a workflow</h2>
  <label for="workflow">Workflow</label>
  <select id="workflow" onchange="loadVariables()"></select>
  <button class="secondary" onclick="loadWorkflows()">Refresh</button>
  <div id="variables"></div>
  <button onclick="replay()">Run</button>
</section>

<section>
  <h2>Activity</h2>
  <pre id="log"></pre>
</section>

<script>
const log = document.getElementById('log');
function write(line) { log.textContent = line + '\n' + log.textContent; }

function show(payload) {
  try {
    const env = JSON.parse(payload);
    return env.data_type === 'text' ? String(env.content) : JSON.stringify(env.content, null, 2);
  } catch (_) { return payload; }
}

async function post(path, body) {
  const res = await fetch(path, { method: 'POST', headers: { 'Content-Type': 'application/json' }, body: JSON.stringify(body) });
  if (!res.ok) write('Error: ' + await res.text());
}

function learn() {
  post('/learn', { prompt: document.getElementById('prompt').value, name: document.getElementById('learn-name').value });
}

async function loadWorkflows() {
  const names = await (await fetch('/workflows')).json();
  const select = document.getElementById('workflow');
  select.replaceChildren(new Option('-', ''), ...names.map(n => new Option(n, n)));
  loadVariables();
}

async function loadVariables() {
  const name = document.getElementById('workflow').value;
  const box = document.getElementById('variables');
  box.replaceChildren();
  if (!name) return;
  const res = await fetch('/workflows/' + encodeURIComponent(name) + '/variables');
  if (!res.ok) { write('Error: ' + await res.text()); return; }
  for (const v of await res.json()) {
    const label = document.createElement('label');
    label.textContent = v;
    const input = document.createElement('input');
    input.dataset.var = v;
    box.append(label, input);
  }
}

function replay() {
  const overrides = {};
  document.querySelectorAll('[data-var]').forEach(el => { overrides[el.dataset.var] = el.value; });
  post('/replay', { name: document.getElementById('workflow').value, overrides });
}

const events = new EventSource('/events');
events.addEventListener('started', e => { const d = JSON.parse(e.data); write(d.job + ' started: ' + d.name); });
events.addEventListener('finished', e => {
  const d = JSON.parse(e.data);
  write(d.job + ' finished: ' + d.name + '\n' + show(d.payload));
  if (d.job === 'learn') loadWorkflows();
});
events.addEventListener('failed', e => { const d = JSON.parse(e.data); write(d.job + ' failed: ' + d.name + '\n' + d.message); });

loadWorkflows();
</script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_builds_trace_derived_text_as_nodes() {
        for sink in ["innerHTML", "insertAdjacentHTML", "outerHTML", "document.write"] {
            assert!(!INDEX_HTML.contains(sink), "page uses {sink}");
        }
        assert!(INDEX_HTML.contains("label.textContent = v"));
        assert!(INDEX_HTML.contains("input.dataset.var = v"));
        assert!(INDEX_HTML.contains("new Option(n, n)"));
    }

    #[test]
    fn workflow_names_are_sanitized_before_use() {
        let (event_tx, _) = broadcast::channel(1);
        let state = AppState {
            config: Arc::new(Config::from_lookup(|_| None)),
            event_tx,
        };
        assert_eq!(state.trace_base("<script>"), Some(state.config.workflows_dir.join("script")));
        assert_eq!(state.trace_base("<>/"), None);
    }
}
