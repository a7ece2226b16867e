//! Settings read from the environment (and `.env`, loaded by the binaries).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_MODEL: &str = "gpt-5.2";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHROME_URL: &str = "http://127.0.0.1:9222";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub max_steps: usize,
    pub step_timeout: Duration,
    pub browser: BrowserConfig,
    pub workflows_dir: PathBuf,
    pub dashboard_port: u16,
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// DevTools endpoint of an already running Chrome to attach to.
    pub attach_url: String,
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub step_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let step_timeout = Duration::from_millis(parse_or(&get, "ARPA_STEP_TIMEOUT_MS", 15_000u64));
        Self {
            api_key: get("OPENAI_API_KEY"),
            api_base: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: get("ARPA_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: parse_or(&get, "ARPA_TEMPERATURE", 0.7f32),
            max_steps: parse_or(&get, "ARPA_MAX_STEPS", 25usize),
            step_timeout,
            browser: BrowserConfig {
                attach_url: get("ARPA_CHROME_URL").unwrap_or_else(|| DEFAULT_CHROME_URL.to_string()),
                chrome_path: get("ARPA_CHROME_PATH").map(PathBuf::from),
                headless: parse_or(&get, "ARPA_HEADLESS", false),
                step_timeout,
            },
            workflows_dir: get("ARPA_WORKFLOWS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("workflows")),
            dashboard_port: parse_or(&get, "ARPA_DASHBOARD_PORT", 3000u16),
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> T
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}, using default", key, raw);
            default
        }),
    }
}
