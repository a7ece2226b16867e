//! Chrome-backed implementation of the page capability.

use anyhow::{Context, Result, anyhow, bail};
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::dom;
use crate::page::{self, Driver, Page};
use crate::selector::Locator;
use crate::types::Params;

/// Pause after actions that usually trigger rendering.
const SETTLE_DELAY: Duration = Duration::from_millis(1000);
const MAX_WAIT_SECONDS: u64 = 60;

/// Attaches to a running Chrome or launches one.
#[derive(Debug, Clone)]
pub struct ChromeDriver {
    config: BrowserConfig,
}

impl ChromeDriver {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

impl Driver for ChromeDriver {
    type Page = ChromePage;

    fn open(&self) -> Result<ChromePage> {
        ChromePage::launch(&self.config)
    }
}

/// One browser session. Tabs it opened are closed on [`Page::close`]; a
/// browser it launched goes away when the page is dropped.
pub struct ChromePage {
    browser: Browser,
    tab: Arc<Tab>,
    opened_tabs: Vec<Arc<Tab>>,
    timeout: Duration,
}

impl ChromePage {
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        info!("Attempting to attach to existing Chrome at {}", config.attach_url);
        let browser = match Browser::connect(config.attach_url.clone()) {
            Ok(browser) => {
                info!("Attached to existing Chrome");
                browser
            }
            Err(e) => {
                debug!("Attach failed: {:#}", e);
                info!("Launching Chrome");
                launch_browser(config)?
            }
        };

        let tab = browser.new_tab().context("failed to open a tab")?;
        tab.set_default_timeout(config.step_timeout);
        let session = Self {
            browser,
            tab: tab.clone(),
            opened_tabs: vec![tab],
            timeout: config.step_timeout,
        };

        let session = page::prepare(session, |session| {
            session
                .tab
                .navigate_to("about:blank")
                .map(|_| ())
                .context("failed to prepare the new tab")
        })?;
        info!("Chrome ready");
        Ok(session)
    }

    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    fn find(&self, selector: &str) -> Result<Element<'_>> {
        let element = match Locator::parse(selector) {
            Locator::Css(css) => self.tab.find_element(css),
            Locator::XPath(xpath) => self.tab.find_element_by_xpath(xpath),
        };
        element.with_context(|| format!("element {selector} not found"))
    }

    fn navigate(&mut self, url: &str, new_tab: bool) -> Result<()> {
        if new_tab {
            let tab = self.browser.new_tab()?;
            tab.set_default_timeout(self.timeout);
            self.opened_tabs.push(tab.clone());
            self.tab = tab;
        }
        self.tab.navigate_to(url)?;
        self.tab.wait_until_navigated()?;
        self.tab
            .wait_for_element_with_custom_timeout("body", self.timeout)?;
        std::thread::sleep(SETTLE_DELAY);
        Ok(())
    }

    /// Resolves a recorded element index against a fresh snapshot.
    fn index_selector(&self, params: &Params) -> Result<String> {
        let index = params
            .get("index")
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .ok_or_else(|| anyhow!("missing element index"))?;
        dom::capture_dom_snapshot(&self.tab)?;
        Ok(dom::index_selector(index))
    }

    fn scroll(&self, params: &Params, direction: i64) -> Result<()> {
        let amount = params
            .get("amount")
            .and_then(Value::as_i64)
            .map(|px| px.to_string())
            .unwrap_or_else(|| "window.innerHeight".to_string());
        self.tab
            .evaluate(&format!("window.scrollBy(0, {direction} * {amount})"), false)?;
        Ok(())
    }
}

impl Page for ChromePage {
    fn wait_until_visible(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        let element = match Locator::parse(selector) {
            Locator::Css(css) => self.tab.wait_for_element_with_custom_timeout(css, timeout),
            Locator::XPath(xpath) => self.tab.wait_for_xpath_with_custom_timeout(xpath, timeout),
        }
        .with_context(|| format!("element {selector} did not appear within {timeout:?}"))?;
        element.scroll_into_view()?;
        Ok(())
    }

    fn fill(&mut self, selector: &str, text: &str) -> Result<()> {
        let element = self.find(selector)?;
        element.click()?;
        element.call_js_fn("function() { this.value = ''; }", vec![], false)?;
        element.type_into(text)?;
        Ok(())
    }

    fn click(&mut self, selector: &str) -> Result<()> {
        self.find(selector)?.click()?;
        std::thread::sleep(SETTLE_DELAY);
        Ok(())
    }

    fn press_key(&mut self, key: &str) -> Result<()> {
        self.tab.press_key(key)?;
        Ok(())
    }

    fn wait_for_load(&mut self, timeout: Duration) -> Result<()> {
        self.tab.wait_until_navigated()?;
        self.tab.wait_for_element_with_custom_timeout("body", timeout)?;
        std::thread::sleep(SETTLE_DELAY);
        Ok(())
    }

    fn execute_native(&mut self, name: &str, params: &Params) -> Result<()> {
        let text = |key: &str| params.get(key).and_then(Value::as_str);
        match name {
            "go_to_url" | "open_tab" => {
                let url = text("url").ok_or_else(|| anyhow!("{name} needs a url"))?;
                let new_tab = name == "open_tab"
                    || params.get("new_tab").and_then(Value::as_bool).unwrap_or(false);
                self.navigate(url, new_tab)
            }
            "go_back" => {
                self.tab.evaluate("history.back()", false)?;
                std::thread::sleep(SETTLE_DELAY);
                Ok(())
            }
            "send_keys" => {
                let keys = text("keys").ok_or_else(|| anyhow!("send_keys needs keys"))?;
                self.press_key(keys)
            }
            "scroll_down" => self.scroll(params, 1),
            "scroll_up" => self.scroll(params, -1),
            "wait" => {
                let seconds = params
                    .get("seconds")
                    .and_then(Value::as_u64)
                    .unwrap_or(3)
                    .min(MAX_WAIT_SECONDS);
                std::thread::sleep(Duration::from_secs(seconds));
                Ok(())
            }
            "input_text" => {
                let value = text("text").ok_or_else(|| anyhow!("input_text needs text"))?;
                let selector = self.index_selector(params)?;
                self.wait_until_visible(&selector, self.timeout)?;
                self.fill(&selector, value)
            }
            "click_element_by_index" => {
                let selector = self.index_selector(params)?;
                self.wait_until_visible(&selector, self.timeout)?;
                self.click(&selector)
            }
            other => bail!("unsupported action '{other}'"),
        }
    }

    fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for tab in self.opened_tabs.drain(..) {
            if let Err(e) = tab.close(false) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.context("failed to close tab")),
            None => Ok(()),
        }
    }
}

fn launch_browser(config: &BrowserConfig) -> Result<Browser> {
    let profile = profile_dir()?;
    std::fs::create_dir_all(&profile)?;
    debug!("Using Chrome profile at {}", profile.display());

    let options = LaunchOptions {
        headless: config.headless,
        path: config.chrome_path.clone().or_else(find_chrome),
        user_data_dir: Some(profile),
        args: vec![
            OsStr::new("--no-first-run"),
            OsStr::new("--no-default-browser-check"),
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--disable-infobars"),
            OsStr::new("--password-store=basic"),
        ],
        idle_browser_timeout: Duration::from_secs(300),
        ..Default::default()
    };

    Browser::new(options).map_err(|e| {
        warn!("Browser launch failed: {:#}", e);
        anyhow!("Browser launch failed: {:#}", e)
    })
}

/// Persistent profile so logins made while learning survive into replays.
fn profile_dir() -> Result<PathBuf> {
    let base = dirs::data_local_dir().ok_or_else(|| anyhow!("no local data directory"))?;
    Ok(base.join("arpa").join("chrome-profile"))
}

/// Well-known install locations; `None` lets headless_chrome search itself.
fn find_chrome() -> Option<PathBuf> {
    let mut candidates = vec![
        PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
        PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
        PathBuf::from("/usr/bin/google-chrome"),
        PathBuf::from("/usr/bin/chromium"),
        PathBuf::from("/usr/bin/chromium-browser"),
    ];
    if let Some(local) = dirs::data_local_dir() {
        candidates.push(local.join("Google").join("Chrome").join("Application").join("chrome.exe"));
    }
    candidates.into_iter().find(|p| p.exists())
}
