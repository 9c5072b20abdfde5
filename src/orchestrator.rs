//! End-to-end scrape
//!
//! ```text
//! Start -> ModelResolved -> Classified -> DirectExtract ------------------> Done
//!                                      \-> CategoryResolved -> Paginating -> Done
//! ```
//!
//! `Failed` is reachable from every state. A failed category is recorded and the
//! remaining categories are still processed; only a session failure aborts the run.

use crate::browser::PageDriver;
use crate::classify::{self, PageKind};
use crate::config::ScraperConfig;
use crate::consent::dismiss_consent;
use crate::diagnostics::DiagnosticCapture;
use crate::error::{Result, ScrapeError};
use crate::extract::{ExtractContext, PageExtractor};
use crate::model::{CategoryCandidate, ModelSource, ModelType, PartRecord, ScrapeResult, SearchRequest};
use crate::paginate::Paginator;
use crate::resolve::{CategoryResolver, ModelResolver};
use crate::wait::Wait;
use chrono::Utc;
use serde::Serialize;

/// Where a scrape ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "cause")]
pub enum ScrapeState {
    Start,
    ModelResolved,
    Classified,
    DirectExtract,
    CategoryResolved,
    Paginating,
    Done,
    Failed(FailureCause),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum FailureCause {
    /// Neither the lookup form nor the table produced a model type
    NoModel,
    /// The category menu had no entry for the part name
    NoCategory,
    /// The browser session became unusable, or the budget ran out
    Session(String),
    /// Any other error that stopped the run (e.g. bad configuration)
    Other(String),
}

/// A category that could not be scraped; the others were still processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryFailure {
    pub category: String,
    pub url: String,
    pub error: String,
}

/// Result of one scrape. `result` is always present, possibly with no categories.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeOutcome {
    pub result: ScrapeResult,
    pub state: ScrapeState,
    pub category_failures: Vec<CategoryFailure>,
}

impl ScrapeOutcome {
    /// Empty result for `request` that ended in `cause`
    pub fn failed(request: &SearchRequest, cause: FailureCause) -> Self {
        Self {
            result: ScrapeResult::new(request, Utc::now()),
            state: ScrapeState::Failed(cause),
            category_failures: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == ScrapeState::Done
    }

    /// Whether the run was cut short by the session, as opposed to finding nothing
    pub fn is_session_failure(&self) -> bool {
        matches!(self.state, ScrapeState::Failed(FailureCause::Session(_)))
    }

    pub fn failure(&self) -> Option<&FailureCause> {
        match &self.state {
            ScrapeState::Failed(cause) => Some(cause),
            _ => None,
        }
    }
}

/// Milestones reported to a progress callback
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    ModelResolved { model: ModelType, source: ModelSource },
    Classified(PageKind),
    CategoriesFound(Vec<CategoryCandidate>),
    PageScraped { category: String, page: usize, parts: usize },
    Finished { total_parts: usize, state: ScrapeState },
}

type ProgressFn<'a> = Box<dyn Fn(&ProgressEvent) + Send + Sync + 'a>;

/// Drives one browser page through model lookup, classification, category
/// resolution and pagination.
///
/// Holds no state between [`scrape`](Self::scrape) calls.
pub struct Scraper<'a> {
    driver: &'a dyn PageDriver,
    config: &'a ScraperConfig,
    diagnostics: &'a dyn DiagnosticCapture,
    extractor: PageExtractor,
    progress: Option<ProgressFn<'a>>,
}

/// Mutable bookkeeping of a single run
struct Run {
    result: ScrapeResult,
    state: ScrapeState,
    category_failures: Vec<CategoryFailure>,
}

impl<'a> Scraper<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        config: &'a ScraperConfig,
        diagnostics: &'a dyn DiagnosticCapture,
    ) -> Result<Self> {
        Ok(Self { driver, config, diagnostics, extractor: PageExtractor::new(&config.site)?, progress: None })
    }

    /// Builder method: call `callback` on every [`ProgressEvent`]
    pub fn on_progress(mut self, callback: impl Fn(&ProgressEvent) + Send + Sync + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Run the whole pipeline for `request`
    pub fn scrape(&self, request: &SearchRequest) -> ScrapeOutcome {
        log::info!("Scraping '{}' for plate {}", request.part_name(), request.license_plate());

        let mut run = Run {
            result: ScrapeResult::new(request, Utc::now()),
            state: ScrapeState::Start,
            category_failures: Vec::new(),
        };

        if let Err(e) = self.run(request, &mut run) {
            log::error!("Scrape aborted in state {:?}: {}", run.state, e);
            run.state = ScrapeState::Failed(e.into());
        }

        let total_parts = run.result.total_parts();
        log::info!(
            "Scrape finished: {} part(s) in {} categor{}, state {:?}",
            total_parts,
            run.result.categories.len(),
            if run.result.categories.len() == 1 { "y" } else { "ies" },
            run.state
        );
        self.emit(ProgressEvent::Finished { total_parts, state: run.state.clone() });

        ScrapeOutcome { result: run.result, state: run.state, category_failures: run.category_failures }
    }

    /// Advances `run.state`; terminal failures other than errors are set directly
    fn run(&self, request: &SearchRequest, run: &mut Run) -> Result<()> {
        let site = &self.config.site;
        let timeouts = &self.config.timeouts;

        let Some((model, source)) = self.resolve_model(request.license_plate())? else {
            run.state = ScrapeState::Failed(FailureCause::NoModel);
            return Ok(());
        };
        run.result.search_info.model_type = Some(model.clone());
        run.result.search_info.model_source = Some(source);
        run.state = ScrapeState::ModelResolved;
        self.emit(ProgressEvent::ModelResolved { model: model.clone(), source });

        self.ensure_listing(request.license_plate(), &model)?;

        let kind = classify::await_ready(self.driver, site, timeouts)?;
        run.state = ScrapeState::Classified;
        self.emit(ProgressEvent::Classified(kind));

        if kind == PageKind::Results {
            run.state = ScrapeState::DirectExtract;
            let label = &site.direct_results_label;
            let markup = self.driver.page_markup()?;
            let records = self.extractor.extract(&markup, &ExtractContext { category: label, scraped_at: Utc::now() });

            self.emit(ProgressEvent::PageScraped { category: label.clone(), page: 1, parts: records.len() });
            if !records.is_empty() {
                run.result.file_records(label, records);
            }
            run.state = ScrapeState::Done;
            return Ok(());
        }

        if kind == PageKind::Unknown {
            log::warn!("Unrecognised page, looking for a category menu anyway");
        }

        let candidates =
            CategoryResolver::new(self.driver, site, timeouts, self.diagnostics).find_categories(request.part_name())?;
        if candidates.is_empty() {
            run.state = ScrapeState::Failed(FailureCause::NoCategory);
            return Ok(());
        }
        run.state = ScrapeState::CategoryResolved;
        self.emit(ProgressEvent::CategoriesFound(candidates.clone()));

        run.state = ScrapeState::Paginating;
        for (index, candidate) in candidates.iter().enumerate() {
            log::info!("Category {}/{}: {}", index + 1, candidates.len(), candidate.label);

            let mut records = Vec::new();
            let outcome = self.scrape_category(candidate, &mut records);

            if records.is_empty() {
                log::warn!("No parts in category {}", candidate.label);
            } else {
                run.result.file_records(&candidate.label, records);
            }

            match outcome {
                Ok(()) => {}
                Err(e) if e.is_session_failure() => return Err(e),
                Err(e) => {
                    log::warn!("Category {} failed: {}", candidate.label, e);
                    run.category_failures.push(CategoryFailure {
                        category: candidate.label.clone(),
                        url: candidate.url.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        run.state = ScrapeState::Done;
        Ok(())
    }

    /// Dynamic lookup first, then the static table
    fn resolve_model(&self, plate: &str) -> Result<Option<(ModelType, ModelSource)>> {
        let resolver = ModelResolver::new(self.driver, &self.config.site, &self.config.timeouts);
        if let Some(model) = resolver.resolve(plate)? {
            return Ok(Some((model, ModelSource::Dynamic)));
        }

        match self.config.model_table.lookup(plate) {
            Ok((model, source)) => {
                log::info!("Using model type {} from the fallback table ({:?})", model, source);
                Ok(Some((model, source)))
            }
            Err(e) => {
                log::error!("{}", e);
                Ok(None)
            }
        }
    }

    /// Make sure the listing page of `model` is loaded; after a table fallback the
    /// browser is still on the lookup form
    fn ensure_listing(&self, plate: &str, model: &ModelType) -> Result<()> {
        let marker = format!("/modeltype/{}/", model);
        let current = self.driver.current_url()?;
        if current.contains(&marker) {
            return Ok(());
        }

        let url = self.config.site.listing_url(plate, model)?;
        log::info!("Navigating to listing {}", url);
        self.driver.navigate(&url)?;
        Ok(())
    }

    /// Paginate one category, pushing records into `sink` as pages are read so a
    /// failure part-way keeps what was already collected
    fn scrape_category(&self, candidate: &CategoryCandidate, sink: &mut Vec<PartRecord>) -> Result<()> {
        let site = &self.config.site;
        let timeouts = &self.config.timeouts;

        self.driver.navigate(&candidate.url)?;
        dismiss_consent(self.driver, &site.consent_buttons)?;

        match Wait::new(timeouts.page_ready())
            .poll_interval(timeouts.poll_interval())
            .for_presence(self.driver, &site.results_list)
        {
            Ok(_) => {}
            Err(e) if e.is_timeout() => log::warn!("No results list for {}, extracting anyway", candidate.label),
            Err(e) => return Err(e),
        }

        let paginator = Paginator::new(self.driver, site, timeouts, &self.extractor, self.config.max_pages);
        for (index, page) in paginator.pages(&candidate.label).enumerate() {
            let records = page?;
            self.emit(ProgressEvent::PageScraped {
                category: candidate.label.clone(),
                page: index + 1,
                parts: records.len(),
            });
            sink.extend(records);
        }

        Ok(())
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(progress) = &self.progress {
            progress(&event);
        }
    }
}

impl From<ScrapeError> for FailureCause {
    fn from(e: ScrapeError) -> Self {
        if e.is_session_failure() { FailureCause::Session(e.to_string()) } else { FailureCause::Other(e.to_string()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::FixtureBrowser;
    use crate::config::{ModelTable, Timeouts};
    use crate::diagnostics::RecordingCapture;
    use std::sync::Mutex;

    const SEARCH: &str = "https://www.onderdelenlijn.nl/auto-onderdelen-voorraad/zoeken/";
    const LISTING: &str = "https://www.onderdelenlijn.nl/auto-onderdelen-voorraad/zoeken/kenteken/27xhvx/modeltype/8601/";

    const RESULTS: &str = r#"<html><body><ul id="result-list">
        <li class="shoppingcart"><div class="description"><span class="bold">Velg 15 inch</span></div>
        <div class="pricing"><span class="price">€ 40,00</span></div></li>
    </ul></body></html>"#;

    const MENU: &str = r#"<html><body><div class="search-results-list">
        <a href="/onderdeel/velg-links/" title="Velg links">Velg links</a>
        <a href="/onderdeel/velg-rechts/" title="Velg rechts">Velg rechts</a>
    </div></body></html>"#;

    fn config() -> ScraperConfig {
        ScraperConfig { timeouts: Timeouts::immediate(), ..Default::default() }
    }

    fn request() -> SearchRequest {
        SearchRequest::new("27-XH-VX", "Velg").unwrap()
    }

    #[test]
    fn test_direct_results_after_table_fallback() {
        // No lookup form: the table provides the model and the listing is opened directly
        let driver = FixtureBrowser::new().page(LISTING, RESULTS);
        let config = config();
        let capture = RecordingCapture::default();

        let outcome = Scraper::new(&driver, &config, &capture).unwrap().scrape(&request());

        assert!(outcome.is_done());
        assert_eq!(outcome.result.search_info.model_type, Some(ModelType::new("8601")));
        assert_eq!(outcome.result.search_info.model_source, Some(ModelSource::FallbackTable));
        assert_eq!(outcome.result.categories["Direct Results"].len(), 1);
        assert!(driver.navigations().contains(&LISTING.to_string()));
    }

    #[test]
    fn test_no_model_without_default() {
        let driver = FixtureBrowser::new();
        let config = ScraperConfig { model_table: ModelTable::empty(), ..config() };
        let capture = RecordingCapture::default();

        let outcome = Scraper::new(&driver, &config, &capture).unwrap().scrape(&request());

        assert_eq!(outcome.failure(), Some(&FailureCause::NoModel));
        assert!(outcome.result.categories.is_empty());
        assert!(!outcome.is_session_failure());
    }

    #[test]
    fn test_empty_category_is_not_filed() {
        // "Velg rechts" has no results list and no items; "Velg links" does
        let driver = FixtureBrowser::new()
            .page(LISTING, MENU)
            .page("https://www.onderdelenlijn.nl/onderdeel/velg-links/", RESULTS);
        let config = config();
        let capture = RecordingCapture::default();

        let outcome = Scraper::new(&driver, &config, &capture).unwrap().scrape(&request());

        assert!(outcome.is_done());
        assert_eq!(outcome.result.categories.len(), 1);
        assert_eq!(outcome.result.categories["Velg links"][0].category, "Velg links");
        assert!(capture.reasons().is_empty());
    }

    #[test]
    fn test_repeated_menu_link_is_scraped_once() {
        let menu = r#"<html><body><div class="search-results-list">
            <a href="/onderdeel/velg-links/" title="Velg links"><img src="/img/velg.png"></a>
            <a href="/onderdeel/velg-links/" title="Velg links">Velg links</a>
        </div></body></html>"#;
        let driver = FixtureBrowser::new()
            .page(LISTING, menu)
            .page("https://www.onderdelenlijn.nl/onderdeel/velg-links/", RESULTS);
        let config = config();
        let capture = RecordingCapture::default();

        let outcome = Scraper::new(&driver, &config, &capture).unwrap().scrape(&request());

        assert_eq!(outcome.result.categories["Velg links"].len(), 1);
        let visits = driver.navigations().iter().filter(|url| url.ends_with("/velg-links/")).count();
        assert_eq!(visits, 1);
    }

    #[test]
    fn test_failed_category_does_not_stop_the_next() {
        let driver = FixtureBrowser::new()
            .page(LISTING, MENU)
            .fail_navigation("https://www.onderdelenlijn.nl/onderdeel/velg-links/")
            .page("https://www.onderdelenlijn.nl/onderdeel/velg-rechts/", RESULTS);
        let config = config();
        let capture = RecordingCapture::default();

        let outcome = Scraper::new(&driver, &config, &capture).unwrap().scrape(&request());

        assert_eq!(outcome.state, ScrapeState::Done);
        assert_eq!(outcome.category_failures.len(), 1);
        assert_eq!(outcome.category_failures[0].category, "Velg links");
        assert_eq!(outcome.category_failures[0].url, "https://www.onderdelenlijn.nl/onderdeel/velg-links/");
        assert!(outcome.category_failures[0].error.contains("Navigation failed"));

        let labels: Vec<_> = outcome.result.categories.keys().map(String::as_str).collect();
        assert_eq!(labels, vec!["Velg rechts"]);
    }

    #[test]
    fn test_listing_of_other_model_is_replaced() {
        // Lookup lands on model 8601 while the table says 86
        let other = "https://www.onderdelenlijn.nl/auto-onderdelen-voorraad/zoeken/kenteken/27xhvx/modeltype/86/";
        let driver = FixtureBrowser::new().page(LISTING, MENU).page(other, RESULTS);
        driver.navigate(LISTING).unwrap();
        let config = config();
        let capture = RecordingCapture::default();
        let scraper = Scraper::new(&driver, &config, &capture).unwrap();

        scraper.ensure_listing("27XHVX", &ModelType::new("86")).unwrap();
        assert_eq!(driver.current_url().unwrap(), other);

        scraper.ensure_listing("27XHVX", &ModelType::new("86")).unwrap();
        assert_eq!(driver.navigations().len(), 2);
    }

    #[test]
    fn test_no_category_match() {
        let driver = FixtureBrowser::new().page(LISTING, MENU);
        let config = config();
        let capture = RecordingCapture::default();
        let request = SearchRequest::new("27XHVX", "Uitlaat").unwrap();

        let outcome = Scraper::new(&driver, &config, &capture).unwrap().scrape(&request);

        assert_eq!(outcome.failure(), Some(&FailureCause::NoCategory));
        assert_eq!(capture.reasons(), vec!["no match"]);
    }

    #[test]
    fn test_session_failure_is_signalled() {
        let driver = FixtureBrowser::new().page(SEARCH, "<html></html>");
        driver.close();
        let config = config();
        let capture = RecordingCapture::default();

        let outcome = Scraper::new(&driver, &config, &capture).unwrap().scrape(&request());

        assert!(outcome.is_session_failure());
        assert!(outcome.result.categories.is_empty());
    }

    #[test]
    fn test_progress_events() {
        let driver = FixtureBrowser::new().page(LISTING, RESULTS);
        let config = config();
        let capture = RecordingCapture::default();
        let events = Mutex::new(Vec::new());

        Scraper::new(&driver, &config, &capture)
            .unwrap()
            .on_progress(|event| events.lock().unwrap().push(event.clone()))
            .scrape(&request());

        let events = events.into_inner().unwrap();
        assert!(matches!(events[0], ProgressEvent::ModelResolved { source: ModelSource::FallbackTable, .. }));
        assert_eq!(events[1], ProgressEvent::Classified(PageKind::Results));
        assert!(matches!(events.last(), Some(ProgressEvent::Finished { total_parts: 1, state: ScrapeState::Done })));
    }
}
