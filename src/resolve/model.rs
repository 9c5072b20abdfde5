use crate::browser::PageDriver;
use crate::config::{SiteProfile, Timeouts};
use crate::consent::dismiss_consent;
use crate::error::Result;
use crate::model::ModelType;
use crate::wait::Wait;

/// Discovers a vehicle's model type by submitting the plate lookup form.
///
/// On success the site redirects to the vehicle's listing page, which is where the
/// browser is left.
pub struct ModelResolver<'a> {
    driver: &'a dyn PageDriver,
    site: &'a SiteProfile,
    timeouts: &'a Timeouts,
}

impl<'a> ModelResolver<'a> {
    pub fn new(driver: &'a dyn PageDriver, site: &'a SiteProfile, timeouts: &'a Timeouts) -> Self {
        Self { driver, site, timeouts }
    }

    /// Model type for `plate`, or `None` when the form gave no answer.
    ///
    /// Only session failures are returned as errors; a slow, changed or blocked form
    /// is reported as `None` so the caller can fall back to the static table.
    pub fn resolve(&self, plate: &str) -> Result<Option<ModelType>> {
        log::info!("Looking up model type for plate {}", plate);

        match self.lookup(plate) {
            Ok(Some(model)) => {
                log::info!("Model type found: {}", model);
                Ok(Some(model))
            }
            Ok(None) => {
                log::warn!("Lookup form returned no model type for {}", plate);
                Ok(None)
            }
            Err(e) if e.is_session_failure() => Err(e),
            Err(e) => {
                log::warn!("Dynamic model lookup failed for {}: {}", plate, e);
                Ok(None)
            }
        }
    }

    fn lookup(&self, plate: &str) -> Result<Option<ModelType>> {
        let wait = Wait::new(self.timeouts.element()).poll_interval(self.timeouts.poll_interval());

        self.driver.navigate(&self.site.search_url()?)?;
        wait.for_presence(self.driver, &self.site.plate_input)?;
        dismiss_consent(self.driver, &self.site.consent_buttons)?;

        let input = wait.for_clickable(self.driver, &self.site.plate_input)?;
        self.driver.clear_and_type(&input, plate)?;

        let submit = wait.for_clickable(self.driver, &self.site.submit_button)?;
        // Script click: overlays on this form intercept pointer clicks
        self.driver.script_click(&submit)?;

        let result = match Wait::new(self.timeouts.model_lookup())
            .poll_interval(self.timeouts.poll_interval())
            .for_presence(self.driver, &self.site.model_result)
        {
            Ok(element) => element,
            Err(e) if e.is_timeout() => return Ok(None),
            Err(e) => return Err(e),
        };

        let model = self
            .driver
            .element_attribute(&result, &self.site.model_attribute)?
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        if model.is_some() {
            if let Ok(text) = self.driver.element_text(&result) {
                log::info!("Vehicle: {}", text);
            }
        }

        Ok(model.map(ModelType::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::FixtureBrowser;

    const SEARCH_URL: &str = "https://www.onderdelenlijn.nl/auto-onderdelen-voorraad/zoeken/";
    const LISTING_URL: &str = "https://www.onderdelenlijn.nl/auto-onderdelen-voorraad/zoeken/kenteken/27xhvx/modeltype/8601/";

    const SEARCH_PAGE: &str = r#"<html><body>
        <form>
            <input id="objlicenseplate" name="m$mpc$objlicenseplate" type="text">
            <input type="submit" value="Gegevens ophalen">
        </form>
    </body></html>"#;

    const LISTING_PAGE: &str = r#"<html><body>
        <div class="result-item" data-type="8601"><span>Volkswagen Golf V (1K1) 1.6 FSI 16V</span></div>
    </body></html>"#;

    fn site_browser(listing: &str) -> FixtureBrowser {
        FixtureBrowser::new()
            .page(SEARCH_URL, SEARCH_PAGE)
            .page(LISTING_URL, listing)
            .on_click_from(SEARCH_URL, "input[type='submit']", LISTING_URL)
    }

    #[test]
    fn test_resolves_model_from_form() {
        let driver = site_browser(LISTING_PAGE);
        let site = SiteProfile::default();
        let timeouts = Timeouts::immediate();

        let model = ModelResolver::new(&driver, &site, &timeouts).resolve("27XHVX").unwrap();

        assert_eq!(model, Some(ModelType::new("8601")));
        assert_eq!(driver.current_url().unwrap(), LISTING_URL);
    }

    #[test]
    fn test_missing_model_element_is_not_found() {
        let driver = site_browser("<html><body><p>Geen voertuig gevonden</p></body></html>");
        let site = SiteProfile::default();
        let timeouts = Timeouts::immediate();

        let model = ModelResolver::new(&driver, &site, &timeouts).resolve("00XXX0").unwrap();
        assert_eq!(model, None);
    }

    #[test]
    fn test_missing_form_is_not_found() {
        let driver = FixtureBrowser::new();
        let site = SiteProfile::default();
        let timeouts = Timeouts::immediate();

        let model = ModelResolver::new(&driver, &site, &timeouts).resolve("27XHVX").unwrap();
        assert_eq!(model, None);
    }

    #[test]
    fn test_empty_attribute_is_not_found() {
        let driver = site_browser(r#"<html><body><div class="result-item" data-type=" "></div></body></html>"#);
        let site = SiteProfile::default();
        let timeouts = Timeouts::immediate();

        assert_eq!(ModelResolver::new(&driver, &site, &timeouts).resolve("27XHVX").unwrap(), None);
    }

    #[test]
    fn test_session_failure_propagates() {
        let driver = site_browser(LISTING_PAGE);
        driver.close();
        let site = SiteProfile::default();
        let timeouts = Timeouts::immediate();

        let err = ModelResolver::new(&driver, &site, &timeouts).resolve("27XHVX").unwrap_err();
        assert!(err.is_session_failure());
    }
}
