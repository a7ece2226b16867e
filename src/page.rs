//! The browser capability surface replay runs against, and the scoped
//! session that owns it.

use anyhow::Result;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::Params;

/// Operations a replay needs from one browser page. Every wait is bounded by
/// the timeout passed in; implementations fail instead of blocking forever.
pub trait Page {
    fn wait_until_visible(&mut self, selector: &str, timeout: Duration) -> Result<()>;

    fn fill(&mut self, selector: &str, text: &str) -> Result<()>;

    fn click(&mut self, selector: &str) -> Result<()>;

    fn press_key(&mut self, key: &str) -> Result<()>;

    fn wait_for_load(&mut self, timeout: Duration) -> Result<()>;

    /// Runs a recorded action by name with flat parameters. Unknown names are
    /// an error, which the replay engine logs and moves past.
    fn execute_native(&mut self, name: &str, params: &Params) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Opens one page per replay or learn session.
pub trait Driver {
    type Page: Page;

    fn open(&self) -> Result<Self::Page>;
}

/// Finishes setting up a freshly opened page. If `setup` fails the page is
/// closed before the error is returned.
pub fn prepare<P: Page>(mut page: P, setup: impl FnOnce(&mut P) -> Result<()>) -> Result<P> {
    match setup(&mut page) {
        Ok(()) => Ok(page),
        Err(e) => {
            if let Err(close_err) = page.close() {
                warn!("Could not release a half-opened session: {:#}", close_err);
            }
            Err(e)
        }
    }
}

/// Owns an open page and closes it exactly once, on every exit path.
pub struct SessionGuard<P: Page> {
    page: P,
}

impl<P: Page> SessionGuard<P> {
    pub fn open<D: Driver<Page = P>>(driver: &D) -> Result<Self> {
        let page = driver.open()?;
        debug!("Browser session opened");
        Ok(Self { page })
    }
}

impl<P: Page> Deref for SessionGuard<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.page
    }
}

impl<P: Page> DerefMut for SessionGuard<P> {
    fn deref_mut(&mut self) -> &mut P {
        &mut self.page
    }
}

impl<P: Page> Drop for SessionGuard<P> {
    fn drop(&mut self) {
        match self.page.close() {
            Ok(()) => debug!("Browser session closed"),
            Err(e) => warn!("Could not close the browser cleanly: {:#}", e),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use serde_json::Value;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    /// Everything a [`RecordingPage`] was asked to do, in order.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Wait(String),
        Fill(String, String),
        Click(String),
        Press(String),
        Load,
        Native(String, Value),
        Close,
    }

    /// A page that records calls and fails on request.
    #[derive(Clone, Default)]
    pub struct RecordingPage {
        pub calls: Arc<Mutex<Vec<Call>>>,
        pub failing_selectors: HashSet<String>,
        pub failing_natives: HashSet<String>,
        pub fail_close: bool,
    }

    impl RecordingPage {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn check(&self, selector: &str) -> Result<()> {
            if self.failing_selectors.contains(selector) {
                anyhow::bail!("element {selector} never became visible");
            }
            Ok(())
        }
    }

    impl Page for RecordingPage {
        fn wait_until_visible(&mut self, selector: &str, _timeout: Duration) -> Result<()> {
            self.record(Call::Wait(selector.to_string()));
            self.check(selector)
        }

        fn fill(&mut self, selector: &str, text: &str) -> Result<()> {
            self.record(Call::Fill(selector.to_string(), text.to_string()));
            Ok(())
        }

        fn click(&mut self, selector: &str) -> Result<()> {
            self.record(Call::Click(selector.to_string()));
            Ok(())
        }

        fn press_key(&mut self, key: &str) -> Result<()> {
            self.record(Call::Press(key.to_string()));
            Ok(())
        }

        fn wait_for_load(&mut self, _timeout: Duration) -> Result<()> {
            self.record(Call::Load);
            Ok(())
        }

        fn execute_native(&mut self, name: &str, params: &Params) -> Result<()> {
            self.record(Call::Native(name.to_string(), Value::Object(params.clone())));
            if self.failing_natives.contains(name) {
                anyhow::bail!("unsupported action '{name}'");
            }
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.record(Call::Close);
            if self.fail_close {
                anyhow::bail!("browser already gone");
            }
            Ok(())
        }
    }

    /// Hands out clones of one shared [`RecordingPage`], or fails to open.
    #[derive(Default)]
    pub struct RecordingDriver {
        pub page: RecordingPage,
        pub fail_open: bool,
    }

    impl Driver for RecordingDriver {
        type Page = RecordingPage;

        fn open(&self) -> Result<RecordingPage> {
            if self.fail_open {
                anyhow::bail!("chrome not found");
            }
            Ok(self.page.clone())
        }
    }
}
