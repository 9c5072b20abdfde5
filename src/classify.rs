//! Landing page classification

use crate::browser::PageDriver;
use crate::config::{SiteProfile, Timeouts};
use crate::error::Result;
use crate::wait::Wait;

/// What the browser is showing after the model lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Concrete item listings are present
    Results,
    /// A category menu, which has to be resolved against the part name first
    Category,
    /// Blank or error page
    Unknown,
}

/// Classify the current page
pub fn classify(driver: &dyn PageDriver, site: &SiteProfile) -> Result<PageKind> {
    if !driver.find_elements(&site.results_list)?.is_empty() {
        return Ok(PageKind::Results);
    }

    let url = driver.current_url()?;
    if url.is_empty() || url == "about:blank" || url.starts_with("chrome-error://") {
        return Ok(PageKind::Unknown);
    }

    Ok(PageKind::Category)
}

/// Wait for either a results list or a category menu, then classify.
///
/// A page showing neither within `page_ready` is classified as-is.
pub fn await_ready(driver: &dyn PageDriver, site: &SiteProfile, timeouts: &Timeouts) -> Result<PageKind> {
    let wait = Wait::new(timeouts.page_ready()).poll_interval(timeouts.poll_interval());
    let ready = wait.until("results list or category menu", || {
        let results = driver.find_elements(&site.results_list)?;
        let menu = driver.find_elements(&site.category_container)?;
        Ok((!results.is_empty() || !menu.is_empty()).then_some(()))
    });

    match ready {
        Ok(()) => {}
        Err(e) if e.is_timeout() => log::warn!("Page not ready, classifying anyway: {}", e),
        Err(e) => return Err(e),
    }

    let kind = classify(driver, site)?;
    log::info!("Page classified as {:?}", kind);
    Ok(kind)
}
