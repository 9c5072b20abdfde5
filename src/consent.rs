//! Cookie-consent overlay dismissal

use crate::browser::PageDriver;
use crate::error::Result;

/// Script-click the first displayed, enabled consent control.
///
/// Returns whether a control was clicked. Only session failures are reported; a
/// selector that errors is skipped.
pub fn dismiss_consent(driver: &dyn PageDriver, selectors: &[String]) -> Result<bool> {
    for selector in selectors {
        let candidates = match driver.find_elements(selector) {
            Ok(found) => found,
            Err(e) if e.is_session_failure() => return Err(e),
            Err(e) => {
                log::debug!("Consent selector {} skipped: {}", selector, e);
                continue;
            }
        };

        for element in candidates {
            let clickable = match (driver.is_displayed(&element), driver.is_enabled(&element)) {
                (Ok(displayed), Ok(enabled)) => displayed && enabled,
                (Err(e), _) | (_, Err(e)) if e.is_session_failure() => return Err(e),
                _ => false,
            };

            if !clickable {
                continue;
            }

            match driver.script_click(&element) {
                Ok(()) => {
                    log::info!("Cookie banner dismissed via {}", selector);
                    return Ok(true);
                }
                Err(e) if e.is_session_failure() => return Err(e),
                Err(e) => log::debug!("Consent click on {} failed: {}", selector, e),
            }
        }
    }

    Ok(false)
}
