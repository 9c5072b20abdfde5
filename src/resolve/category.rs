use crate::browser::{ElementHandle, PageDriver};
use crate::config::{SiteProfile, Timeouts};
use crate::consent::dismiss_consent;
use crate::diagnostics::DiagnosticCapture;
use crate::error::Result;
use crate::model::CategoryCandidate;
use crate::wait::Wait;

/// Diagnostic tag when the category menu never rendered
pub const CONTAINER_TIMEOUT: &str = "container timeout";

/// Diagnostic tag when the menu rendered but no entry matched
pub const NO_MATCH: &str = "no match";

/// Ways of matching a part name against category links, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// `title` attribute contains the full term
    Title,
    /// Visible link text contains the full term
    LinkText,
    /// `title` contains the term without a trailing "s"
    SingularS,
    /// `title` contains the term without a trailing "en" (Dutch plural)
    SingularEn,
    /// Any titled link on the page, inside the menu or not
    PageWide,
}

impl MatchStrategy {
    pub const ORDERED: [MatchStrategy; 5] = [
        MatchStrategy::Title,
        MatchStrategy::LinkText,
        MatchStrategy::SingularS,
        MatchStrategy::SingularEn,
        MatchStrategy::PageWide,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MatchStrategy::Title => "title",
            MatchStrategy::LinkText => "link text",
            MatchStrategy::SingularS => "singular (-s)",
            MatchStrategy::SingularEn => "singular (-en)",
            MatchStrategy::PageWide => "page-wide",
        }
    }

    /// Lowercase search needle for `term`, or `None` when the strategy does not apply
    /// (no plural suffix to strip)
    pub fn needle(&self, term: &str) -> Option<String> {
        let term = term.trim().to_lowercase();
        let needle = match self {
            MatchStrategy::Title | MatchStrategy::LinkText | MatchStrategy::PageWide => term,
            MatchStrategy::SingularS => term.strip_suffix('s')?.trim_end().to_string(),
            MatchStrategy::SingularEn => term.strip_suffix("en")?.trim_end().to_string(),
        };
        (!needle.is_empty()).then_some(needle)
    }

    /// Anchors this strategy inspects
    fn scope(&self, container: &str) -> String {
        match self {
            MatchStrategy::PageWide => "a[title]".to_string(),
            _ => format!("{} a", container),
        }
    }

    fn matches_text(&self) -> bool {
        matches!(self, MatchStrategy::LinkText)
    }
}

/// Finds category menu links for a free-text part name.
///
/// Stage 1 waits (long) for the menu container, which tells "page not loaded" apart
/// from "nothing matches". Stage 2 tries each [`MatchStrategy`] in order with a shorter
/// wait; the first one producing a listing link wins.
pub struct CategoryResolver<'a> {
    driver: &'a dyn PageDriver,
    site: &'a SiteProfile,
    timeouts: &'a Timeouts,
    diagnostics: &'a dyn DiagnosticCapture,
}

impl<'a> CategoryResolver<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        site: &'a SiteProfile,
        timeouts: &'a Timeouts,
        diagnostics: &'a dyn DiagnosticCapture,
    ) -> Self {
        Self { driver, site, timeouts, diagnostics }
    }

    /// Candidate categories for `part_name`; empty when nothing matched.
    ///
    /// Every empty answer is preceded by exactly one diagnostic capture, tagged
    /// [`CONTAINER_TIMEOUT`] or [`NO_MATCH`].
    pub fn find_categories(&self, part_name: &str) -> Result<Vec<CategoryCandidate>> {
        log::info!("Searching categories for '{}'", part_name);
        dismiss_consent(self.driver, &self.site.consent_buttons)?;

        let container_wait =
            Wait::new(self.timeouts.category_container()).poll_interval(self.timeouts.poll_interval());
        match container_wait.for_presence(self.driver, &self.site.category_container) {
            Ok(_) => log::debug!("Category menu present"),
            Err(e) if e.is_session_failure() => return Err(e),
            Err(e) => {
                log::error!("Category menu did not load: {}", e);
                self.diagnostics.capture(self.driver, CONTAINER_TIMEOUT, Some(part_name));
                return Ok(Vec::new());
            }
        }

        let match_wait = Wait::new(self.timeouts.category_match()).poll_interval(self.timeouts.poll_interval());

        for strategy in MatchStrategy::ORDERED {
            let Some(needle) = strategy.needle(part_name) else {
                log::debug!("Strategy '{}' does not apply to '{}'", strategy.name(), part_name);
                continue;
            };

            match match_wait.until(&format!("{} match for '{}'", strategy.name(), needle), || {
                self.probe(strategy, &needle)
            }) {
                Ok(candidates) => {
                    log::info!(
                        "Found {} categor{} for '{}' ({} strategy)",
                        candidates.len(),
                        if candidates.len() == 1 { "y" } else { "ies" },
                        part_name,
                        strategy.name()
                    );
                    for candidate in candidates.iter().take(3) {
                        log::info!("  {}", candidate.label);
                    }
                    return Ok(candidates);
                }
                Err(e) if e.is_session_failure() => return Err(e),
                Err(e) => log::debug!("Strategy '{}' gave nothing: {}", strategy.name(), e),
            }
        }

        log::error!("No category matches '{}'", part_name);
        self.diagnostics.capture(self.driver, NO_MATCH, Some(part_name));
        Ok(Vec::new())
    }

    /// One pass of `strategy`; `Some` only if at least one listing link matched.
    /// A URL linked more than once is kept once, under its first label.
    fn probe(&self, strategy: MatchStrategy, needle: &str) -> Result<Option<Vec<CategoryCandidate>>> {
        let mut candidates: Vec<CategoryCandidate> = Vec::new();

        for anchor in self.driver.find_elements(&strategy.scope(&self.site.category_container))? {
            let title = self.driver.element_attribute(&anchor, "title")?;

            let haystack = if strategy.matches_text() {
                self.driver.element_text(&anchor)?
            } else {
                title.clone().unwrap_or_default()
            };

            if !haystack.to_lowercase().contains(needle) {
                continue;
            }

            if let Some(candidate) = self.candidate(&anchor, title)? {
                if candidates.iter().any(|c| c.url == candidate.url) {
                    log::debug!("Duplicate link to {}", candidate.url);
                    continue;
                }
                candidates.push(candidate);
            }
        }

        Ok((!candidates.is_empty()).then_some(candidates))
    }

    fn candidate(&self, anchor: &ElementHandle, title: Option<String>) -> Result<Option<CategoryCandidate>> {
        let Some(href) = self.driver.element_attribute(anchor, "href")? else {
            return Ok(None);
        };

        if !href.contains(&self.site.listing_path_segment) {
            log::debug!("Skipping non-listing link {}", href);
            return Ok(None);
        }

        let Some(url) = self.site.absolutize(&href) else {
            return Ok(None);
        };

        let label = match title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
            Some(title) => title,
            None => self.driver.element_text(anchor)?,
        };

        Ok(Some(CategoryCandidate { label, url }))
    }
}
