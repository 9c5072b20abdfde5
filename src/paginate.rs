//! Client-side pagination
//!
//! Results pages are paged by a submit control labelled `>`. Clicking it swaps the
//! list without a full page load, so a page change is detected by the old control
//! going stale rather than by a navigation event.

use crate::browser::PageDriver;
use crate::config::{SiteProfile, Timeouts};
use crate::consent::dismiss_consent;
use crate::error::{Result, ScrapeError};
use crate::extract::{ExtractContext, PageExtractor};
use crate::model::PartRecord;
use crate::wait::Wait;
use chrono::{DateTime, Utc};

/// Why pagination stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No "next" control on the page
    NoNextControl,
    /// The "next" control is disabled
    LastPage,
    /// The page ceiling was reached
    PageLimit,
    /// Advancing failed in a way that does not affect the session
    AdvanceFailed,
    /// The session failed; the error was yielded
    SessionFailure,
}

/// Outcome of one advance attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Advance {
    /// Old control went stale; a new page is rendered
    Swapped,
    /// Clicked, but the old control never went stale; assumed swapped after settling
    Settled,
    Stopped(StopReason),
}

/// Walks the result pages of the currently loaded listing
pub struct Paginator<'a> {
    driver: &'a dyn PageDriver,
    site: &'a SiteProfile,
    timeouts: &'a Timeouts,
    extractor: &'a PageExtractor,
    max_pages: usize,
}

impl<'a> Paginator<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        site: &'a SiteProfile,
        timeouts: &'a Timeouts,
        extractor: &'a PageExtractor,
        max_pages: usize,
    ) -> Self {
        Self { driver, site, timeouts, extractor, max_pages }
    }

    /// Records of every page, starting with the one already loaded.
    ///
    /// Each step extracts the current page and then tries to advance. Only a session
    /// failure is yielded as an error, after which the iterator is exhausted.
    pub fn pages<'c>(&'c self, category: &'c str) -> Pages<'a, 'c> {
        Pages { paginator: self, category, page: 0, stopped: None, pending: None }
    }

    fn extract_current(&self, category: &str, scraped_at: DateTime<Utc>) -> Result<Vec<PartRecord>> {
        let markup = self.driver.page_markup()?;
        Ok(self.extractor.extract(&markup, &ExtractContext { category, scraped_at }))
    }

    fn advance(&self, page: usize) -> Result<Advance> {
        if page >= self.max_pages {
            log::warn!("Stopping at page limit ({})", self.max_pages);
            return Ok(Advance::Stopped(StopReason::PageLimit));
        }

        dismiss_consent(self.driver, &self.site.consent_buttons)?;

        let Some(next) = self.driver.find_elements(&self.site.next_button)?.into_iter().next() else {
            log::debug!("No next control on page {}", page);
            return Ok(Advance::Stopped(StopReason::NoNextControl));
        };

        if !self.driver.is_enabled(&next)? {
            log::debug!("Next control disabled on page {}", page);
            return Ok(Advance::Stopped(StopReason::LastPage));
        }

        self.driver.scroll_into_view(&next)?;
        self.driver.script_click(&next)?;

        let staleness = Wait::new(self.timeouts.staleness()).poll_interval(self.timeouts.poll_interval());
        match staleness.for_staleness(self.driver, &next) {
            Ok(()) => {
                std::thread::sleep(self.timeouts.post_advance());
                Ok(Advance::Swapped)
            }
            Err(e) if e.is_timeout() => {
                log::debug!("Next control did not go stale, settling for {:?}", self.timeouts.settle());
                std::thread::sleep(self.timeouts.settle());
                Ok(Advance::Settled)
            }
            Err(e) => Err(e),
        }
    }
}

/// Iterator over result pages, see [`Paginator::pages`]
pub struct Pages<'a, 'c> {
    paginator: &'c Paginator<'a>,
    category: &'c str,
    page: usize,
    stopped: Option<StopReason>,
    /// Session failure hit while advancing, yielded after that page's records
    pending: Option<ScrapeError>,
}

impl Pages<'_, '_> {
    /// Why the iteration ended; `None` while pages remain
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stopped
    }

    pub fn pages_seen(&self) -> usize {
        self.page
    }
}

impl Iterator for Pages<'_, '_> {
    type Item = Result<Vec<PartRecord>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending.take() {
            return Some(Err(e));
        }
        if self.stopped.is_some() {
            return None;
        }

        let records = match self.paginator.extract_current(self.category, Utc::now()) {
            Ok(records) => records,
            Err(e) => {
                self.stopped = Some(if e.is_session_failure() {
                    StopReason::SessionFailure
                } else {
                    StopReason::AdvanceFailed
                });
                return Some(Err(e));
            }
        };

        self.page += 1;
        log::info!("Page {}: {} part(s)", self.page, records.len());

        match self.paginator.advance(self.page) {
            Ok(Advance::Swapped | Advance::Settled) => {}
            Ok(Advance::Stopped(reason)) => self.stopped = Some(reason),
            Err(e) if e.is_session_failure() => {
                self.stopped = Some(StopReason::SessionFailure);
                self.pending = Some(e);
            }
            Err(e) => {
                log::warn!("Could not advance past page {}: {}", self.page, e);
                self.stopped = Some(StopReason::AdvanceFailed);
            }
        }

        Some(Ok(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::FixtureBrowser;

    const BASE: &str = "https://www.onderdelenlijn.nl/onderdeel/velgen/";

    fn page(n: usize, items: usize, next: Option<bool>) -> String {
        let items: String = (1..=items)
            .map(|i| {
                format!(
                    r#"<li class="shoppingcart" onclick="window.location.href='/onderdeel/velg/{n}{i}/'">
                    <div class="description"><span class="bold">Velg {n}.{i}</span></div>
                    <div class="pricing"><span class="price">€ {i}0,00</span></div></li>"#
                )
            })
            .collect();
        let next = match next {
            Some(true) => r#"<input type="submit" value=">">"#,
            Some(false) => r#"<input type="submit" value=">" disabled="disabled">"#,
            None => "",
        };
        format!(r#"<html><body><ul id="result-list">{items}</ul>{next}</body></html>"#)
    }

    fn url(n: usize) -> String {
        if n == 1 { BASE.to_string() } else { format!("{}?page={}", BASE, n) }
    }

    /// `counts[i]` items on page i+1; the last page has a disabled next control
    fn site(counts: &[usize]) -> FixtureBrowser {
        let mut driver = FixtureBrowser::new();
        for (i, &count) in counts.iter().enumerate() {
            let n = i + 1;
            let last = n == counts.len();
            driver = driver.page(url(n), page(n, count, Some(!last)));
            if !last {
                driver = driver.on_click_from(url(n), "input[type='submit']", url(n + 1));
            }
        }
        driver.navigate(BASE).unwrap();
        driver
    }

    fn collect(driver: &FixtureBrowser, max_pages: usize) -> (Vec<Result<Vec<PartRecord>>>, Option<StopReason>) {
        let site = SiteProfile::default();
        let timeouts = Timeouts::immediate();
        let extractor = PageExtractor::new(&site).unwrap();
        let paginator = Paginator::new(driver, &site, &timeouts, &extractor, max_pages);

        let mut pages = paginator.pages("Velgen");
        let collected: Vec<_> = pages.by_ref().collect();
        (collected, pages.stop_reason())
    }

    #[test]
    fn test_walks_until_next_disabled() {
        let driver = site(&[3, 3, 2]);
        let (pages, reason) = collect(&driver, 50);

        assert_eq!(pages.len(), 3);
        let counts: Vec<_> = pages.iter().map(|p| p.as_ref().unwrap().len()).collect();
        assert_eq!(counts, vec![3, 3, 2]);
        assert_eq!(reason, Some(StopReason::LastPage));
        assert_eq!(pages[2].as_ref().unwrap()[0].title, "Velg 3.1");
        assert_eq!(driver.clicks().len(), 2);
    }

    #[test]
    fn test_single_page_without_next_control() {
        let driver = FixtureBrowser::new().page(BASE, page(1, 2, None));
        driver.navigate(BASE).unwrap();
        let (pages, reason) = collect(&driver, 50);

        assert_eq!(pages.len(), 1);
        assert_eq!(reason, Some(StopReason::NoNextControl));
    }

    #[test]
    fn test_page_limit_is_a_normal_stop() {
        let driver = site(&[1, 1, 1, 1]);
        let (pages, reason) = collect(&driver, 2);

        assert_eq!(pages.len(), 2);
        assert!(pages.iter().all(|p| p.is_ok()));
        assert_eq!(reason, Some(StopReason::PageLimit));
    }

    #[test]
    fn test_unresponsive_next_control_settles_and_hits_limit() {
        // The control never routes anywhere, so it never goes stale
        let driver = FixtureBrowser::new().page(BASE, page(1, 1, Some(true)));
        driver.navigate(BASE).unwrap();
        let (pages, reason) = collect(&driver, 3);

        assert_eq!(pages.len(), 3);
        assert_eq!(reason, Some(StopReason::PageLimit));
    }

    #[test]
    fn test_failed_advance_keeps_pages_read_so_far() {
        let driver = site(&[2, 2, 1]).fail_navigation(url(2));
        let (pages, reason) = collect(&driver, 50);

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].as_ref().unwrap().len(), 2);
        assert_eq!(reason, Some(StopReason::AdvanceFailed));
    }

    #[test]
    fn test_session_failure_is_yielded_and_ends_iteration() {
        let driver = site(&[1, 1]);
        driver.close();
        let (pages, reason) = collect(&driver, 50);

        assert_eq!(pages.len(), 1);
        assert!(pages[0].as_ref().unwrap_err().is_session_failure());
        assert_eq!(reason, Some(StopReason::SessionFailure));
    }
}
