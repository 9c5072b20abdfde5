use crate::{browser::config::{ConnectionOptions, LaunchOptions},
            browser::{ElementHandle, PageDriver, Teardown},
            error::{Result, ScrapeError}};
use headless_chrome::{Browser, Element, Tab, protocol::cdp::Page::{CaptureScreenshotFormatOption, Viewport}};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{ffi::OsStr,
          fmt::Display,
          sync::{Arc,
                 atomic::{AtomicBool, Ordering}},
          time::Duration};

/// Prelude wrapped around every injected script; keeps element references alive
/// between calls and reports exceptions in-band.
const REGISTRY_TEMPLATE: &str = include_str!("element_registry.js");

/// Attribute set on an element while a native CDP lookup needs to find it
const HANDLE_ATTRIBUTE: &str = "data-scrape-handle";

const STALE_PREFIX: &str = "stale element reference";

/// CDP errors raised while the page's execution context is being replaced
const CONTEXT_LOST_MARKERS: [&str; 4] = [
    "Execution context was destroyed",
    "Cannot find context with specified id",
    "Cannot find default execution context",
    "Inspected target navigated or closed",
];

/// Map a failed CDP call: a context torn down by a navigation is transient, anything
/// else means the transport or the tab is gone
fn cdp_error(action: &str, e: impl Display) -> ScrapeError {
    let message = e.to_string();
    if CONTEXT_LOST_MARKERS.iter().any(|marker| message.contains(marker)) {
        ScrapeError::ContextLost(format!("{}: {}", action, message))
    } else {
        ScrapeError::SessionFailure(format!("{}: {}", action, message))
    }
}

#[derive(Debug, Deserialize)]
struct ScriptReply {
    #[serde(default)]
    ok: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// One Chrome/Chromium instance with a single dedicated tab.
///
/// The session owns the browser process; dropping it (or calling [`close`](Self::close))
/// ends the scrape. Every operation after `close` fails with
/// [`ScrapeError::SessionFailure`].
pub struct BrowserSession {
    /// The underlying headless_chrome Browser instance
    browser: Browser,

    /// Tab all page operations run against
    tab: Arc<Tab>,

    closed: AtomicBool,
}

impl BrowserSession {
    /// Launch a new browser instance with the given options
    pub fn launch(options: LaunchOptions) -> Result<Self> {
        let mut launch_opts = headless_chrome::LaunchOptions::default();

        // Ignore default arguments to prevent detection by anti-bot services
        launch_opts.ignore_default_args.push(OsStr::new("--enable-automation"));
        launch_opts.args.push(OsStr::new("--disable-blink-features=AutomationControlled"));
        launch_opts.args.push(OsStr::new("--disable-dev-shm-usage"));

        // The budget supervisor decides when a scrape is over, not the idle timer
        launch_opts.idle_browser_timeout = Duration::from_secs(60 * 60);

        launch_opts.headless = options.headless;
        launch_opts.window_size = Some((options.window_width, options.window_height));

        if let Some(path) = options.chrome_path {
            launch_opts.path = Some(path);
        }

        if let Some(dir) = options.user_data_dir {
            launch_opts.user_data_dir = Some(dir);
        }

        launch_opts.sandbox = options.sandbox;

        let browser = Browser::new(launch_opts).map_err(|e| ScrapeError::LaunchFailed(e.to_string()))?;

        let tab = browser
            .new_tab()
            .map_err(|e| ScrapeError::LaunchFailed(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(Duration::from_secs(60));

        if let Some(user_agent) = options.user_agent.as_deref() {
            tab.set_user_agent(user_agent, Some("nl-NL,nl;q=0.9,en;q=0.8"), None)
                .map_err(|e| ScrapeError::LaunchFailed(format!("Failed to set user agent: {}", e)))?;
        }

        log::info!("Launched browser (headless: {})", options.headless);

        Ok(Self { browser, tab, closed: AtomicBool::new(false) })
    }

    /// Connect to an existing browser instance via WebSocket and open a dedicated tab
    pub fn connect(options: ConnectionOptions) -> Result<Self> {
        let browser = Browser::connect(options.ws_url.clone())
            .map_err(|e| ScrapeError::ConnectionFailed(e.to_string()))?;

        let tab = browser
            .new_tab()
            .map_err(|e| ScrapeError::ConnectionFailed(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(Duration::from_millis(options.timeout));

        log::info!("Connected to browser at {}", options.ws_url);

        Ok(Self { browser, tab, closed: AtomicBool::new(false) })
    }

    /// Get the underlying Browser instance
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// The session's tab, unless the session has been closed
    pub fn tab(&self) -> Result<&Arc<Tab>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ScrapeError::SessionFailure("Browser session has been closed".to_string()));
        }
        Ok(&self.tab)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the session's tab. Idempotent; the browser process exits when the session is dropped.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.tab
            .close(false)
            .map_err(|e| ScrapeError::SessionFailure(format!("Failed to close tab: {}", e)))?;

        log::info!("Browser session closed");
        Ok(())
    }

    /// Evaluate `body` inside the element-registry prelude and unwrap its in-band reply
    fn run(&self, body: &str, args: &[Value]) -> Result<Value> {
        let args_json = serde_json::to_string(args)?;
        let script = REGISTRY_TEMPLATE.replace("__BODY__", body).replace("__ARGS__", &args_json);

        let result = self
            .tab()?
            .evaluate(&script, false)
            .map_err(|e| cdp_error("Failed to evaluate script", e))?;

        let value = result
            .value
            .ok_or_else(|| ScrapeError::Script("No value returned from script".to_string()))?;

        // The prelude returns a JSON string, so decode it as a string first
        let json_str: String = serde_json::from_value(value)
            .map_err(|e| ScrapeError::Script(format!("Unexpected script result: {}", e)))?;

        let reply: ScriptReply = serde_json::from_str(&json_str)?;

        match reply.error {
            Some(message) if message.starts_with(STALE_PREFIX) => Err(ScrapeError::StaleElement(message)),
            Some(message) => Err(ScrapeError::Script(message)),
            None => Ok(reply.ok.unwrap_or(Value::Null)),
        }
    }

    fn run_on(&self, element: &ElementHandle, body: &str) -> Result<Value> {
        self.run(body, &[json!(element.id())])
    }

    fn run_bool(&self, element: &ElementHandle, body: &str) -> Result<bool> {
        Ok(self.run_on(element, body)?.as_bool().unwrap_or(false))
    }

    fn handle_selector(element: &ElementHandle) -> String {
        format!("[{}=\"{}\"]", HANDLE_ATTRIBUTE, element.id())
    }

    /// Run `action` on the CDP node behind `element`. The node is tagged with the handle
    /// attribute only for the duration of the lookup.
    fn with_native<T>(&self, element: &ElementHandle, action: impl FnOnce(&Element<'_>) -> Result<T>) -> Result<T> {
        self.run(
            "lookup(args[0]).setAttribute(args[1], args[0]); return true;",
            &[json!(element.id()), json!(HANDLE_ATTRIBUTE)],
        )?;

        let tab = self.tab()?;
        let found = tab
            .find_element(&Self::handle_selector(element))
            .map_err(|e| ScrapeError::ElementNotFound(format!("Element {} not found: {}", element, e)));
        let outcome = found.and_then(|node| action(&node));

        // The node may be gone after a click that navigated
        if let Err(e) = self.run(
            "const el = registry.elements.get(args[0]); if (el) { el.removeAttribute(args[1]); } return true;",
            &[json!(element.id()), json!(HANDLE_ATTRIBUTE)],
        ) {
            if e.is_session_failure() && outcome.is_ok() {
                return Err(e);
            }
            log::debug!("Could not untag {}: {}", element, e);
        }

        outcome
    }
}

impl PageDriver for BrowserSession {
    fn navigate(&self, url: &str) -> Result<()> {
        let tab = self.tab()?;

        tab.navigate_to(url)
            .map_err(|e| ScrapeError::NavigationFailed(format!("Failed to navigate to {}: {}", url, e)))?;

        tab.wait_until_navigated()
            .map_err(|e| ScrapeError::NavigationFailed(format!("Navigation to {} did not complete: {}", url, e)))?;

        log::debug!("Navigated to {}", url);
        Ok(())
    }

    fn find_elements(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        let ids = self
            .run("return Array.from(document.querySelectorAll(args[0])).map(register);", &[json!(selector)])
            .map_err(|e| match e {
                ScrapeError::Script(msg) if msg.contains("is not a valid selector") => {
                    ScrapeError::InvalidSelector(selector.to_string())
                }
                other => other,
            })?;

        let ids: Vec<String> = serde_json::from_value(ids)?;
        Ok(ids.into_iter().map(ElementHandle::new).collect())
    }

    fn element_attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        let value = self.run("return lookup(args[0]).getAttribute(args[1]);", &[json!(element.id()), json!(name)])?;
        Ok(value.as_str().map(str::to_string))
    }

    fn element_text(&self, element: &ElementHandle) -> Result<String> {
        let value = self.run_on(element, "const el = lookup(args[0]); return (el.innerText || el.textContent || '').trim();")?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn is_displayed(&self, element: &ElementHandle) -> Result<bool> {
        self.run_bool(
            element,
            r#"
            const el = lookup(args[0]);
            const rect = el.getBoundingClientRect();
            const style = window.getComputedStyle(el);
            return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none';
            "#,
        )
    }

    fn is_enabled(&self, element: &ElementHandle) -> Result<bool> {
        self.run_bool(element, "const el = lookup(args[0]); return !el.disabled && !el.hasAttribute('disabled');")
    }

    fn is_stale(&self, element: &ElementHandle) -> Result<bool> {
        self.run_bool(element, "const el = registry.elements.get(args[0]); return !el || !el.isConnected;")
    }

    fn click(&self, element: &ElementHandle) -> Result<()> {
        self.with_native(element, |node| {
            node.click()
                .map_err(|e| ScrapeError::Script(format!("Click on {} failed: {}", element, e)))?;
            Ok(())
        })
    }

    fn script_click(&self, element: &ElementHandle) -> Result<()> {
        self.run_on(element, "lookup(args[0]).click(); return true;")?;
        Ok(())
    }

    fn scroll_into_view(&self, element: &ElementHandle) -> Result<()> {
        self.run_on(element, "lookup(args[0]).scrollIntoView(true); return true;")?;
        Ok(())
    }

    fn clear_and_type(&self, element: &ElementHandle, text: &str) -> Result<()> {
        self.run_on(
            element,
            r#"
            const el = lookup(args[0]);
            el.focus();
            el.value = '';
            el.dispatchEvent(new Event('input', { bubbles: true }));
            return true;
            "#,
        )?;

        self.with_native(element, |node| {
            node.type_into(text)
                .map_err(|e| ScrapeError::Script(format!("Typing into {} failed: {}", element, e)))?;
            Ok(())
        })
    }

    fn execute_script(&self, script: &str, args: &[Value]) -> Result<Value> {
        // Compile through Function so syntax errors surface in-band instead of as transport errors
        let body = format!("return (new Function('args', {}))(args);", serde_json::to_string(script)?);
        self.run(&body, args)
    }

    fn current_url(&self) -> Result<String> {
        Ok(self.tab()?.get_url())
    }

    fn page_title(&self) -> Result<String> {
        self.tab()?
            .get_title()
            .map_err(|e| cdp_error("Failed to read page title", e))
    }

    fn page_markup(&self) -> Result<String> {
        self.tab()?
            .get_content()
            .map_err(|e| cdp_error("Failed to read page source", e))
    }

    fn screenshot(&self) -> Result<Vec<u8>> {
        let size = self.run(
            "const d = document.documentElement; return [Math.max(d.scrollWidth, window.innerWidth), Math.max(d.scrollHeight, window.innerHeight)];",
            &[],
        )?;
        let (width, height): (f64, f64) = serde_json::from_value(size)?;

        let clip = Viewport { x: 0.0, y: 0.0, width, height, scale: 1.0 };

        self.tab()?
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, Some(clip), true)
            .map_err(|e| cdp_error("Failed to capture screenshot", e))
    }

    fn viewport_size(&self) -> Result<(u32, u32)> {
        let size = self.run("return [window.innerWidth, window.innerHeight];", &[])?;
        Ok(serde_json::from_value(size)?)
    }
}

impl Teardown for BrowserSession {
    fn teardown(&self) {
        if let Err(e) = self.close() {
            log::warn!("Teardown: {}", e);
        }
    }
}
