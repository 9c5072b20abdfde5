//! Offline page driver
//!
//! [`FixtureBrowser`] serves saved HTML documents by URL and follows configured click
//! routes, so the whole pipeline can run against captured pages (for example the page
//! sources written by diagnostic capture) without a browser. Scripts are not executed;
//! a click only has an effect when a route matches the clicked element.

use crate::browser::{ElementHandle, PageDriver, Teardown};
use crate::error::{Result, ScrapeError};
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

const BLANK_PAGE: &str = "<html><head><title></title></head><body></body></html>";

/// Navigation triggered by clicking an element matching `selector`
#[derive(Debug, Clone)]
struct ClickRoute {
    /// Only applies while this URL is loaded; any page when `None`
    from_url: Option<String>,
    selector: String,
    to_url: String,
}

#[derive(Debug, Clone)]
struct HandleEntry {
    selector: String,
    nth: usize,
}

#[derive(Debug, Default)]
struct FixtureState {
    current_url: String,
    /// Bumped on every navigation; handles from older generations are stale
    generation: u64,
    handles: Vec<HandleEntry>,
    /// Typed input values keyed by handle id
    values: HashMap<String, String>,
    navigations: Vec<String>,
    clicks: Vec<String>,
    closed: bool,
}

/// Offline [`PageDriver`] over a fixed set of HTML pages
#[derive(Debug)]
pub struct FixtureBrowser {
    pages: HashMap<String, String>,
    routes: Vec<ClickRoute>,
    /// URLs whose loading fails, whether navigated to or reached by a click
    failing: HashSet<String>,
    viewport: (u32, u32),
    state: Mutex<FixtureState>,
}

impl Default for FixtureBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureBrowser {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            routes: Vec::new(),
            failing: HashSet::new(),
            viewport: (1920, 1080),
            state: Mutex::new(FixtureState { current_url: "about:blank".to_string(), ..Default::default() }),
        }
    }

    /// Builder method: serve `html` at `url`
    pub fn page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }

    /// Builder method: clicking an element matching `selector` on any page loads `to_url`
    pub fn on_click(mut self, selector: impl Into<String>, to_url: impl Into<String>) -> Self {
        self.routes.push(ClickRoute { from_url: None, selector: selector.into(), to_url: to_url.into() });
        self
    }

    /// Builder method: like [`on_click`](Self::on_click), restricted to clicks made while `from_url` is loaded
    pub fn on_click_from(
        mut self,
        from_url: impl Into<String>,
        selector: impl Into<String>,
        to_url: impl Into<String>,
    ) -> Self {
        self.routes.push(ClickRoute {
            from_url: Some(from_url.into()),
            selector: selector.into(),
            to_url: to_url.into(),
        });
        self
    }

    /// Builder method: loading `url` fails with [`ScrapeError::NavigationFailed`] and
    /// leaves the current page in place
    pub fn fail_navigation(mut self, url: impl Into<String>) -> Self {
        self.failing.insert(url.into());
        self
    }

    /// Every URL loaded so far, including those reached through click routes
    pub fn navigations(&self) -> Vec<String> {
        self.lock().map(|s| s.navigations.clone()).unwrap_or_default()
    }

    /// Handle ids of clicked elements, in order
    pub fn clicks(&self) -> Vec<String> {
        self.lock().map(|s| s.clicks.clone()).unwrap_or_default()
    }

    /// Value typed into the element behind `element`, if any
    pub fn typed_value(&self, element: &ElementHandle) -> Option<String> {
        self.lock().ok().and_then(|s| s.values.get(element.id()).cloned())
    }

    /// Mark the driver closed; every later call fails like a torn-down session
    pub fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, FixtureState>> {
        let state = self
            .state
            .lock()
            .map_err(|e| ScrapeError::SessionFailure(format!("Fixture state poisoned: {}", e)))?;

        if state.closed {
            return Err(ScrapeError::SessionFailure("Browser session has been closed".to_string()));
        }
        Ok(state)
    }

    fn markup_for(&self, url: &str) -> &str {
        self.pages.get(url).map(String::as_str).unwrap_or(BLANK_PAGE)
    }

    fn load(&self, state: &mut FixtureState, url: &str) -> Result<()> {
        if self.failing.contains(url) {
            log::debug!("Fixture navigation to {} fails", url);
            return Err(ScrapeError::NavigationFailed(format!("Failed to navigate to {}: net::ERR_FAILED", url)));
        }
        if !self.pages.contains_key(url) {
            log::debug!("No fixture for {}, serving a blank page", url);
        }
        state.current_url = url.to_string();
        state.generation += 1;
        state.handles.clear();
        state.values.clear();
        state.navigations.push(url.to_string());
        Ok(())
    }

    fn parse_selector(selector: &str) -> Result<Selector> {
        Selector::parse(selector).map_err(|_| ScrapeError::InvalidSelector(selector.to_string()))
    }

    /// Resolve a handle against the current document and run `f` on the element
    fn with_element<T>(&self, element: &ElementHandle, f: impl FnOnce(ElementRef<'_>) -> T) -> Result<T> {
        let state = self.lock()?;
        let entry = Self::entry(&state, element)?;
        let document = Html::parse_document(self.markup_for(&state.current_url));
        let selector = Self::parse_selector(&entry.selector)?;

        let node = document
            .select(&selector)
            .nth(entry.nth)
            .ok_or_else(|| ScrapeError::StaleElement(format!("stale element reference: {}", element)))?;

        Ok(f(node))
    }

    fn entry<'s>(state: &'s FixtureState, element: &ElementHandle) -> Result<&'s HandleEntry> {
        let stale = || ScrapeError::StaleElement(format!("stale element reference: {}", element));

        let (generation, slot) = element.id().split_once(':').ok_or_else(stale)?;
        let generation: u64 = generation.parse().map_err(|_| stale())?;
        let slot: usize = slot.parse().map_err(|_| stale())?;

        if generation != state.generation {
            return Err(stale());
        }
        state.handles.get(slot).ok_or_else(stale)
    }

    fn follow_route(&self, element: &ElementHandle) -> Result<()> {
        let target = {
            let state = self.lock()?;
            let current_url = state.current_url.clone();
            drop(state);

            let mut target = None;
            for route in &self.routes {
                if route.from_url.as_deref().is_some_and(|from| from != current_url) {
                    continue;
                }
                let route_selector = Self::parse_selector(&route.selector)?;
                if self.with_element(element, |node| route_selector.matches(&node))? {
                    target = Some(route.to_url.clone());
                    break;
                }
            }
            target
        };

        let mut state = self.lock()?;
        state.clicks.push(element.id().to_string());
        if let Some(url) = target {
            log::debug!("Click on {} routes to {}", element, url);
            self.load(&mut state, &url)?;
        }
        Ok(())
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl PageDriver for FixtureBrowser {
    fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.lock()?;
        self.load(&mut state, url)
    }

    fn find_elements(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        let parsed = Self::parse_selector(selector)?;
        let mut state = self.lock()?;
        let count = Html::parse_document(self.markup_for(&state.current_url)).select(&parsed).count();

        let generation = state.generation;
        let mut handles = Vec::with_capacity(count);
        for nth in 0..count {
            let slot = state.handles.len();
            state.handles.push(HandleEntry { selector: selector.to_string(), nth });
            handles.push(ElementHandle::new(format!("{}:{}", generation, slot)));
        }
        Ok(handles)
    }

    fn element_attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        self.with_element(element, |node| node.value().attr(name).map(str::to_string))
    }

    fn element_text(&self, element: &ElementHandle) -> Result<String> {
        self.with_element(element, |node| collapse_whitespace(&node.text().collect::<String>()))
    }

    fn is_displayed(&self, element: &ElementHandle) -> Result<bool> {
        self.with_element(element, |node| {
            let hidden_style = node
                .value()
                .attr("style")
                .map(|style| style.replace(' ', "").contains("display:none"))
                .unwrap_or(false);
            !hidden_style && node.value().attr("hidden").is_none()
        })
    }

    fn is_enabled(&self, element: &ElementHandle) -> Result<bool> {
        self.with_element(element, |node| node.value().attr("disabled").is_none())
    }

    fn is_stale(&self, element: &ElementHandle) -> Result<bool> {
        match self.with_element(element, |_| ()) {
            Ok(()) => Ok(false),
            Err(ScrapeError::StaleElement(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    fn click(&self, element: &ElementHandle) -> Result<()> {
        self.follow_route(element)
    }

    fn script_click(&self, element: &ElementHandle) -> Result<()> {
        self.follow_route(element)
    }

    fn scroll_into_view(&self, element: &ElementHandle) -> Result<()> {
        self.with_element(element, |_| ())
    }

    fn clear_and_type(&self, element: &ElementHandle, text: &str) -> Result<()> {
        self.with_element(element, |_| ())?;
        let mut state = self.lock()?;
        state.values.insert(element.id().to_string(), text.to_string());
        Ok(())
    }

    fn execute_script(&self, script: &str, _args: &[serde_json::Value]) -> Result<serde_json::Value> {
        let _state = self.lock()?;
        log::debug!("Fixture browser does not run scripts; ignoring {} bytes", script.len());
        Ok(serde_json::Value::Null)
    }

    fn current_url(&self) -> Result<String> {
        Ok(self.lock()?.current_url.clone())
    }

    fn page_title(&self) -> Result<String> {
        let state = self.lock()?;
        let document = Html::parse_document(self.markup_for(&state.current_url));
        let title = Self::parse_selector("title")?;
        Ok(document
            .select(&title)
            .next()
            .map(|t| collapse_whitespace(&t.text().collect::<String>()))
            .unwrap_or_default())
    }

    fn page_markup(&self) -> Result<String> {
        let state = self.lock()?;
        Ok(self.markup_for(&state.current_url).to_string())
    }

    fn screenshot(&self) -> Result<Vec<u8>> {
        let _state = self.lock()?;
        // Nothing is rendered offline
        Ok(Vec::new())
    }

    fn viewport_size(&self) -> Result<(u32, u32)> {
        let _state = self.lock()?;
        Ok(self.viewport)
    }
}

impl Teardown for FixtureBrowser {
    fn teardown(&self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = r#"<html><head><title>Lijst</title></head><body>
        <ul id="result-list"><li>Eerste</li><li>  Tweede
        regel </li></ul>
        <input type="submit" value=">" disabled="disabled">
        <a href="/next" id="go">verder</a>
    </body></html>"#;

    fn browser() -> FixtureBrowser {
        FixtureBrowser::new()
            .page("https://site.test/list", LIST)
            .page("https://site.test/next", "<html><body><p>next</p></body></html>")
            .on_click("#go", "https://site.test/next")
    }

    #[test]
    fn test_find_and_read() {
        let browser = browser();
        browser.navigate("https://site.test/list").unwrap();

        let items = browser.find_elements("ul#result-list li").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(browser.element_text(&items[1]).unwrap(), "Tweede regel");
        assert_eq!(browser.page_title().unwrap(), "Lijst");

        let submit = browser.find_elements("input[type='submit'][value='>']").unwrap().remove(0);
        assert!(!browser.is_enabled(&submit).unwrap());
        assert_eq!(browser.element_attribute(&submit, "value").unwrap().as_deref(), Some(">"));
    }

    #[test]
    fn test_click_route_makes_handles_stale() {
        let browser = browser();
        browser.navigate("https://site.test/list").unwrap();

        let link = browser.find_elements("#go").unwrap().remove(0);
        browser.script_click(&link).unwrap();

        assert_eq!(browser.current_url().unwrap(), "https://site.test/next");
        assert!(browser.is_stale(&link).unwrap());
        assert!(matches!(browser.element_text(&link), Err(ScrapeError::StaleElement(_))));
        assert_eq!(browser.navigations(), vec!["https://site.test/list", "https://site.test/next"]);
    }

    #[test]
    fn test_click_without_route_stays() {
        let browser = browser();
        browser.navigate("https://site.test/list").unwrap();

        let item = browser.find_elements("li").unwrap().remove(0);
        browser.click(&item).unwrap();
        assert_eq!(browser.current_url().unwrap(), "https://site.test/list");
        assert!(!browser.is_stale(&item).unwrap());
        assert_eq!(browser.clicks().len(), 1);
    }

    #[test]
    fn test_unknown_url_serves_blank_page() {
        let browser = browser();
        browser.navigate("https://site.test/missing").unwrap();
        assert!(browser.find_elements("li").unwrap().is_empty());
    }

    #[test]
    fn test_failing_navigation_keeps_current_page() {
        let browser = browser().fail_navigation("https://site.test/next");
        browser.navigate("https://site.test/list").unwrap();

        let err = browser.navigate("https://site.test/next").unwrap_err();
        assert!(matches!(err, ScrapeError::NavigationFailed(_)));
        assert!(!err.is_session_failure());
        assert_eq!(browser.current_url().unwrap(), "https://site.test/list");

        // A click routed to the failing URL fails the same way
        let link = browser.find_elements("#go").unwrap().remove(0);
        assert!(matches!(browser.click(&link), Err(ScrapeError::NavigationFailed(_))));
        assert!(!browser.is_stale(&link).unwrap());
        assert_eq!(browser.navigations(), vec!["https://site.test/list"]);
    }

    #[test]
    fn test_invalid_selector() {
        let browser = browser();
        assert!(matches!(browser.find_elements("ul[["), Err(ScrapeError::InvalidSelector(_))));
    }

    #[test]
    fn test_closed_driver_is_session_failure() {
        let browser = browser();
        browser.close();
        let err = browser.navigate("https://site.test/list").unwrap_err();
        assert!(err.is_session_failure());
    }
}
