//! Bounded condition polling
//!
//! A [`Wait`] re-evaluates a probe until it yields a value or the timeout elapses. A
//! zero timeout still probes once. Stale handles, missing elements and a script
//! context lost to a navigation count as "not yet"; session failures end the wait
//! immediately.

use crate::browser::{ElementHandle, PageDriver};
use crate::error::{Result, ScrapeError};
use std::time::{Duration, Instant};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy)]
pub struct Wait {
    timeout: Duration,
    poll_interval: Duration,
}

impl Wait {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, poll_interval: DEFAULT_POLL_INTERVAL }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Poll `probe` until it returns `Some`, or fail with
    /// [`ScrapeError::NavigationTimeout`] naming `condition`
    pub fn until<T>(&self, condition: &str, mut probe: impl FnMut() -> Result<Option<T>>) -> Result<T> {
        let deadline = Instant::now() + self.timeout;

        loop {
            match probe() {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(
                    e @ (ScrapeError::StaleElement(_) | ScrapeError::ElementNotFound(_) | ScrapeError::ContextLost(_)),
                ) => {
                    log::trace!("Retrying {}: {}", condition, e);
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ScrapeError::NavigationTimeout { condition: condition.to_string(), timeout: self.timeout });
            }
            std::thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    /// First element matching `selector`
    pub fn for_presence(&self, driver: &dyn PageDriver, selector: &str) -> Result<ElementHandle> {
        self.until(&format!("presence of {}", selector), || Ok(driver.find_elements(selector)?.into_iter().next()))
    }

    /// All elements matching `selector`, once there is at least one
    pub fn for_all_present(&self, driver: &dyn PageDriver, selector: &str) -> Result<Vec<ElementHandle>> {
        self.until(&format!("presence of all {}", selector), || {
            let found = driver.find_elements(selector)?;
            Ok((!found.is_empty()).then_some(found))
        })
    }

    /// First element matching `selector` that is displayed and enabled
    pub fn for_clickable(&self, driver: &dyn PageDriver, selector: &str) -> Result<ElementHandle> {
        self.until(&format!("{} to be clickable", selector), || {
            for element in driver.find_elements(selector)? {
                if driver.is_displayed(&element)? && driver.is_enabled(&element)? {
                    return Ok(Some(element));
                }
            }
            Ok(None)
        })
    }

    /// Until `element` has left the document
    pub fn for_staleness(&self, driver: &dyn PageDriver, element: &ElementHandle) -> Result<()> {
        self.until(&format!("staleness of {}", element), || Ok(driver.is_stale(element)?.then_some(())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::FixtureBrowser;
    use std::cell::Cell;

    const PAGE: &str = r#"<html><body>
        <input id="hidden" type="text" style="display: none">
        <input id="plate" type="text">
        <input id="off" type="submit" disabled>
    </body></html>"#;

    fn driver() -> FixtureBrowser {
        let browser = FixtureBrowser::new().page("https://site.test/", PAGE);
        browser.navigate("https://site.test/").unwrap();
        browser
    }

    #[test]
    fn test_until_returns_first_value() {
        let calls = Cell::new(0);
        let wait = Wait::new(Duration::from_secs(1)).poll_interval(Duration::from_millis(1));

        let value = wait
            .until("third call", || {
                calls.set(calls.get() + 1);
                Ok((calls.get() == 3).then_some(calls.get()))
            })
            .unwrap();

        assert_eq!(value, 3);
    }

    #[test]
    fn test_zero_timeout_probes_once() {
        let calls = Cell::new(0);
        let err = Wait::new(Duration::ZERO)
            .until::<()>("never", || {
                calls.set(calls.get() + 1);
                Ok(None)
            })
            .unwrap_err();

        assert_eq!(calls.get(), 1);
        assert!(err.is_timeout());
        assert!(err.to_string().contains("never"));
    }

    #[test]
    fn test_stale_errors_are_retried_and_session_errors_are_not() {
        let calls = Cell::new(0);
        let wait = Wait::new(Duration::from_secs(1)).poll_interval(Duration::from_millis(1));
        let value = wait
            .until("recovers", || {
                calls.set(calls.get() + 1);
                if calls.get() < 2 { Err(ScrapeError::StaleElement("h1".into())) } else { Ok(Some("ok")) }
            })
            .unwrap();
        assert_eq!(value, "ok");

        let calls = Cell::new(0);
        let value = wait
            .until("redirect", || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(ScrapeError::ContextLost("Execution context was destroyed.".into()))
                } else {
                    Ok(Some(calls.get()))
                }
            })
            .unwrap();
        assert_eq!(value, 3);

        let err = wait.until::<()>("dies", || Err(ScrapeError::SessionFailure("gone".into()))).unwrap_err();
        assert!(err.is_session_failure());
    }

    #[test]
    fn test_presence_and_clickable() {
        let driver = driver();
        let wait = Wait::new(Duration::ZERO);

        assert!(wait.for_presence(&driver, "#plate").is_ok());
        assert!(wait.for_presence(&driver, "#missing").unwrap_err().is_timeout());
        assert_eq!(wait.for_all_present(&driver, "input").unwrap().len(), 3);

        let clickable = wait.for_clickable(&driver, "input").unwrap();
        assert_eq!(driver.element_attribute(&clickable, "id").unwrap().as_deref(), Some("plate"));
        assert!(wait.for_clickable(&driver, "#off").unwrap_err().is_timeout());
    }

    #[test]
    fn test_staleness() {
        let driver = driver();
        let wait = Wait::new(Duration::ZERO);
        let plate = wait.for_presence(&driver, "#plate").unwrap();

        assert!(wait.for_staleness(&driver, &plate).unwrap_err().is_timeout());

        driver.navigate("https://site.test/other").unwrap();
        assert!(wait.for_staleness(&driver, &plate).is_ok());
    }
}
