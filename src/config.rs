//! Scraper configuration
//!
//! Everything site-specific lives here: URLs, CSS selectors, timeouts and the static
//! plate → model table. Every struct is `#[serde(default)]`, so a JSON file only has to
//! name the values it overrides.

use crate::error::{Result, ScrapeError};
use crate::model::{ModelSource, ModelType, normalize_plate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Top-level configuration for one scrape
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub site: SiteProfile,
    pub timeouts: Timeouts,
    /// Hard ceiling on result pages visited per category
    pub max_pages: usize,
    pub model_table: ModelTable,
    /// Where diagnostic screenshots and page sources are written
    pub diagnostics_dir: PathBuf,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            site: SiteProfile::default(),
            timeouts: Timeouts::default(),
            max_pages: 50,
            model_table: ModelTable::default(),
            diagnostics_dir: PathBuf::from("diagnostics"),
        }
    }
}

impl ScraperConfig {
    /// Load a configuration file; missing keys keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ScrapeError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| ScrapeError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_pages == 0 {
            return Err(ScrapeError::Config("max_pages must be at least 1".to_string()));
        }
        self.site.base()?;
        self.site.validate()
    }
}

/// URLs and selectors of the target site
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    pub base_url: String,
    /// Path of the plate lookup form
    pub search_path: String,
    /// Listing page for a plate/model pair; `{plate}` and `{model}` are substituted
    pub listing_path_template: String,
    pub plate_input: String,
    pub submit_button: String,
    /// Element carrying the model identifier after the lookup form is submitted
    pub model_result: String,
    pub model_attribute: String,
    /// Present only on pages listing concrete items
    pub results_list: String,
    pub result_item: String,
    /// Menu of part categories on a category page
    pub category_container: String,
    /// Category links must contain this segment to count as part listings
    pub listing_path_segment: String,
    pub next_button: String,
    /// Cookie banner close/accept controls, tried in order
    pub consent_buttons: Vec<String>,
    /// Lowercase phrase marking a price that is only given on request
    pub price_on_request_phrase: String,
    /// Category label for items found directly after the model lookup
    pub direct_results_label: String,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            base_url: "https://www.onderdelenlijn.nl".to_string(),
            search_path: "/auto-onderdelen-voorraad/zoeken/".to_string(),
            listing_path_template: "/auto-onderdelen-voorraad/zoeken/kenteken/{plate}/modeltype/{model}/".to_string(),
            plate_input: "#objlicenseplate".to_string(),
            submit_button: "input[type='submit'][value='Gegevens ophalen']".to_string(),
            model_result: ".result-item[data-type]".to_string(),
            model_attribute: "data-type".to_string(),
            results_list: "ul#result-list".to_string(),
            result_item: "li.shoppingcart".to_string(),
            category_container: "div.search-results-list".to_string(),
            listing_path_segment: "onderdeel".to_string(),
            next_button: "input[type='submit'][value='>']".to_string(),
            consent_buttons: vec![
                ".cookie-close".to_string(),
                "#btCloseCookie".to_string(),
                ".cookies .close".to_string(),
                ".cookie-banner .close".to_string(),
                "[class*='cookie'] [class*='close']".to_string(),
                "[class*='cookie'] [class*='accept']".to_string(),
            ],
            price_on_request_phrase: "prijs op aanvraag".to_string(),
            direct_results_label: "Direct Results".to_string(),
        }
    }
}

impl SiteProfile {
    pub fn base(&self) -> Result<Url> {
        Url::parse(&self.base_url).map_err(|e| ScrapeError::Config(format!("Invalid base_url '{}': {}", self.base_url, e)))
    }

    /// Resolve a possibly relative reference against the base URL
    pub fn absolutize(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        self.base().ok()?.join(reference).ok().map(String::from)
    }

    pub fn search_url(&self) -> Result<String> {
        self.join(&self.search_path)
    }

    /// Listing page for a plate (lowercased) and model
    pub fn listing_url(&self, plate: &str, model: &ModelType) -> Result<String> {
        let path = self
            .listing_path_template
            .replace("{plate}", &plate.to_lowercase())
            .replace("{model}", model.as_str());
        self.join(&path)
    }

    fn join(&self, path: &str) -> Result<String> {
        self.base()?
            .join(path)
            .map(String::from)
            .map_err(|e| ScrapeError::Config(format!("Invalid path '{}': {}", path, e)))
    }

    fn validate(&self) -> Result<()> {
        let selectors = [
            ("plate_input", &self.plate_input),
            ("submit_button", &self.submit_button),
            ("model_result", &self.model_result),
            ("model_attribute", &self.model_attribute),
            ("results_list", &self.results_list),
            ("result_item", &self.result_item),
            ("category_container", &self.category_container),
            ("next_button", &self.next_button),
        ];

        for (name, value) in selectors {
            if value.trim().is_empty() {
                return Err(ScrapeError::Config(format!("{} must not be empty", name)));
            }
        }
        Ok(())
    }
}

/// Bounds for every wait in the pipeline, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Form fields and other single elements
    pub element_ms: u64,
    /// Model result after submitting the plate form
    pub model_lookup_ms: u64,
    /// Results list or category menu after arriving on a listing page
    pub page_ready_ms: u64,
    /// Category menu container (stage 1)
    pub category_container_ms: u64,
    /// Each category match strategy (stage 2)
    pub category_match_ms: u64,
    /// Old "next" control going stale after a pagination click
    pub staleness_ms: u64,
    /// Fixed delay when the staleness wait expires
    pub settle_ms: u64,
    /// Delay after a detected page swap, for the new content to render
    pub post_advance_ms: u64,
    pub poll_interval_ms: u64,
    /// Wall-clock budget for a whole scrape
    pub budget_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            element_ms: 15_000,
            model_lookup_ms: 15_000,
            page_ready_ms: 15_000,
            category_container_ms: 20_000,
            category_match_ms: 10_000,
            staleness_ms: 15_000,
            settle_ms: 3_000,
            post_advance_ms: 2_000,
            poll_interval_ms: 250,
            budget_secs: 240,
        }
    }
}

impl Timeouts {
    /// Single-poll waits and no settle delays, for replaying saved pages
    pub fn immediate() -> Self {
        Self {
            element_ms: 0,
            model_lookup_ms: 0,
            page_ready_ms: 0,
            category_container_ms: 0,
            category_match_ms: 0,
            staleness_ms: 0,
            settle_ms: 0,
            post_advance_ms: 0,
            poll_interval_ms: 0,
            budget_secs: 30,
        }
    }

    pub fn element(&self) -> Duration {
        Duration::from_millis(self.element_ms)
    }

    pub fn model_lookup(&self) -> Duration {
        Duration::from_millis(self.model_lookup_ms)
    }

    pub fn page_ready(&self) -> Duration {
        Duration::from_millis(self.page_ready_ms)
    }

    pub fn category_container(&self) -> Duration {
        Duration::from_millis(self.category_container_ms)
    }

    pub fn category_match(&self) -> Duration {
        Duration::from_millis(self.category_match_ms)
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_millis(self.staleness_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn post_advance(&self) -> Duration {
        Duration::from_millis(self.post_advance_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.budget_secs)
    }
}

/// Static plate → model mapping used when the lookup form gives no answer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelTable {
    pub entries: BTreeMap<String, String>,
    /// Model for plates missing from `entries`; unmapped plates fail without it
    pub default_model: Option<String>,
}

impl Default for ModelTable {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        // Volkswagen Golf V (1K1) 1.6 FSI 16V
        entries.insert("27XHVX".to_string(), "8601".to_string());
        // Toyota Yaris Verso (P2) 1.3 16V
        entries.insert("37LKBB".to_string(), "6593".to_string());

        Self { entries, default_model: Some("8601".to_string()) }
    }
}

impl ModelTable {
    pub fn empty() -> Self {
        Self { entries: BTreeMap::new(), default_model: None }
    }

    pub fn with_entry(mut self, plate: &str, model: impl Into<String>) -> Self {
        self.entries.insert(normalize_plate(plate), model.into());
        self
    }

    pub fn with_default(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Model for `plate`, falling back to the default
    pub fn lookup(&self, plate: &str) -> Result<(ModelType, ModelSource)> {
        let plate = normalize_plate(plate);

        let mapped = self
            .entries
            .iter()
            .find(|(key, _)| normalize_plate(key) == plate)
            .map(|(_, model)| model);

        if let Some(model) = mapped {
            return Ok((ModelType::new(model.clone()), ModelSource::FallbackTable));
        }

        match &self.default_model {
            Some(model) => Ok((ModelType::new(model.clone()), ModelSource::FallbackDefault)),
            None => Err(ScrapeError::ResolutionFailure { what: "model type".to_string(), input: plate }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_table_mapped_plates() {
        let table = ModelTable::default();

        let (model, source) = table.lookup("27XHVX").unwrap();
        assert_eq!(model.as_str(), "8601");
        assert_eq!(source, ModelSource::FallbackTable);

        let (model, source) = table.lookup("37-lk-bb").unwrap();
        assert_eq!(model.as_str(), "6593");
        assert_eq!(source, ModelSource::FallbackTable);
    }

    #[test]
    fn test_model_table_default_for_unmapped() {
        let table = ModelTable::empty().with_entry("12-AB-34", "1111").with_default("9999");

        let (model, source) = table.lookup("99ZZZ9").unwrap();
        assert_eq!(model.as_str(), "9999");
        assert_eq!(source, ModelSource::FallbackDefault);

        let (model, _) = table.lookup("12ab34").unwrap();
        assert_eq!(model.as_str(), "1111");
    }

    #[test]
    fn test_model_table_without_default() {
        let err = ModelTable::empty().lookup("99ZZZ9").unwrap_err();
        assert!(matches!(err, ScrapeError::ResolutionFailure { .. }));
    }

    #[test]
    fn test_unnormalized_table_keys_match() {
        let json = r#"{ "entries": { "27-xh-vx": "8601" }, "default_model": null }"#;
        let table: ModelTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.lookup("27XHVX").unwrap().0.as_str(), "8601");
    }

    #[test]
    fn test_site_urls() {
        let site = SiteProfile::default();
        assert_eq!(site.search_url().unwrap(), "https://www.onderdelenlijn.nl/auto-onderdelen-voorraad/zoeken/");
        assert_eq!(
            site.listing_url("27XHVX", &ModelType::new("8601")).unwrap(),
            "https://www.onderdelenlijn.nl/auto-onderdelen-voorraad/zoeken/kenteken/27xhvx/modeltype/8601/"
        );
        assert_eq!(
            site.absolutize("/onderdeel/123/").as_deref(),
            Some("https://www.onderdelenlijn.nl/onderdeel/123/")
        );
        assert_eq!(site.absolutize("https://cdn.example.com/a.jpg").as_deref(), Some("https://cdn.example.com/a.jpg"));
        assert_eq!(site.absolutize("  "), None);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let json = r#"{ "max_pages": 3, "timeouts": { "settle_ms": 10 } }"#;
        let config: ScraperConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.max_pages, 3);
        assert_eq!(config.timeouts.settle(), Duration::from_millis(10));
        assert_eq!(config.timeouts.staleness(), Duration::from_secs(15));
        assert_eq!(config.site.results_list, "ul#result-list");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = ScraperConfig::default();
        config.max_pages = 0;
        assert!(config.validate().is_err());

        let mut config = ScraperConfig::default();
        config.site.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = ScraperConfig::default();
        config.site.next_button = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scraper.json");
        std::fs::write(&path, r#"{ "diagnostics_dir": "/tmp/diag" }"#).unwrap();

        let config = ScraperConfig::from_json_file(&path).unwrap();
        assert_eq!(config.diagnostics_dir, PathBuf::from("/tmp/diag"));

        assert!(matches!(ScraperConfig::from_json_file(dir.path().join("missing.json")), Err(ScrapeError::Config(_))));
    }
}
