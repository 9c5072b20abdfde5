//! Browser capability layer
//!
//! The scraping pipeline never talks to Chrome directly. It drives a [`PageDriver`],
//! a narrow, synchronous capability over one page: navigate, query elements by CSS
//! selector, read attributes and text, click, run a script, read the markup and take
//! a screenshot. Two implementations ship with the crate:
//! - [`BrowserSession`]: a real Chrome/Chromium instance controlled over CDP
//! - [`FixtureBrowser`]: an offline driver that replays saved HTML pages

pub mod config;
pub mod fixture;
pub mod session;

pub use config::{ConnectionOptions, LaunchOptions};
pub use fixture::FixtureBrowser;
pub use session::BrowserSession;

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Opaque reference to an element found on the current page.
///
/// A handle stays valid until the node it refers to leaves the document (client-side
/// re-render) or the page is replaced by a navigation. After that every operation on
/// it fails with [`ScrapeError::StaleElement`](crate::error::ScrapeError::StaleElement)
/// and [`PageDriver::is_stale`] reports `true`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Synchronous control surface over a single browser page.
///
/// Calls are issued sequentially by one scrape; implementations are not expected to
/// interleave operations from several callers.
pub trait PageDriver: Send + Sync {
    /// Load `url` and wait for the navigation to commit
    fn navigate(&self, url: &str) -> Result<()>;

    /// All elements currently matching a CSS selector, in document order
    fn find_elements(&self, selector: &str) -> Result<Vec<ElementHandle>>;

    fn element_attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>>;

    /// Rendered text of the element, trimmed
    fn element_text(&self, element: &ElementHandle) -> Result<String>;

    fn is_displayed(&self, element: &ElementHandle) -> Result<bool>;

    fn is_enabled(&self, element: &ElementHandle) -> Result<bool>;

    /// Whether the handle no longer refers to a node in the live document
    fn is_stale(&self, element: &ElementHandle) -> Result<bool>;

    /// Native (pointer) click at the element's position
    fn click(&self, element: &ElementHandle) -> Result<()>;

    /// Click dispatched from script; not blocked by overlays intercepting the pointer
    fn script_click(&self, element: &ElementHandle) -> Result<()>;

    fn scroll_into_view(&self, element: &ElementHandle) -> Result<()>;

    /// Clear an input's current value and type `text` into it
    fn clear_and_type(&self, element: &ElementHandle, text: &str) -> Result<()>;

    /// Run a script body; `args` are available to it as the `args` array
    fn execute_script(&self, script: &str, args: &[serde_json::Value]) -> Result<serde_json::Value>;

    fn current_url(&self) -> Result<String>;

    fn page_title(&self) -> Result<String>;

    /// Serialized markup of the current document
    fn page_markup(&self) -> Result<String>;

    /// Full-page PNG screenshot
    fn screenshot(&self) -> Result<Vec<u8>>;

    /// Viewport size in CSS pixels (width, height)
    fn viewport_size(&self) -> Result<(u32, u32)>;
}

/// Releases a browser session. Used on every exit path of a supervised scrape.
pub trait Teardown: Send + Sync {
    fn teardown(&self);
}
