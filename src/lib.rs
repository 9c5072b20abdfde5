//! # onderdelen-scraper
//!
//! Spare-part listing scraper for onderdelenlijn.nl, driving a headless Chrome over the
//! Chrome DevTools Protocol (CDP).
//!
//! Given a license plate and a free-text part name, the scraper discovers the
//! vehicle's model type through the site's lookup form, works out whether it landed
//! on a results page or a category menu, resolves the part name to category links,
//! and walks every result page of those categories. The output is a [`ScrapeResult`]
//! with one list of [`PartRecord`]s per category.
//!
//! ## Features
//!
//! - **Two-tier model resolution**: lookup form first, static plate table second
//! - **Category matching**: ordered strategies from exact title to page-wide, first hit wins
//! - **Staleness-based pagination**: client-side page swaps detected without page loads
//! - **Diagnostics**: screenshot, page source and context report whenever a page cannot be resolved
//! - **Offline replay**: the whole pipeline runs against saved HTML through [`FixtureBrowser`]
//!
//! ## Command line
//!
//! ```bash
//! # Headless scrape, result written to onderdelen_<plate>_<part>_<timestamp>.json
//! cargo run -- 27XHVX "Aandrijfas links-voor"
//!
//! # Visible browser, explicit output file
//! cargo run -- 27XHVX Velgen --headed -o velgen.json
//! ```
//!
//! ## Library usage
//!
//! ```rust,no_run
//! use onderdelen_scraper::{BrowserSession, FileCapture, LaunchOptions, Scraper, ScraperConfig, SearchRequest};
//!
//! # fn main() -> onderdelen_scraper::Result<()> {
//! let config = ScraperConfig::default();
//! let session = BrowserSession::launch(LaunchOptions::new().headless(true))?;
//! let diagnostics = FileCapture::new(&config.diagnostics_dir);
//!
//! let request = SearchRequest::new("27-XH-VX", "Aandrijfas links-voor")?;
//! let outcome = Scraper::new(&session, &config, &diagnostics)?.scrape(&request);
//!
//! println!("{} parts", outcome.result.total_parts());
//! # Ok(())
//! # }
//! ```
//!
//! ### Replaying saved pages
//!
//! ```rust
//! use onderdelen_scraper::{FixtureBrowser, NoCapture, Scraper, ScraperConfig, SearchRequest, Timeouts};
//!
//! # fn main() -> onderdelen_scraper::Result<()> {
//! let listing = "https://www.onderdelenlijn.nl/auto-onderdelen-voorraad/zoeken/kenteken/27xhvx/modeltype/8601/";
//! let driver = FixtureBrowser::new().page(
//!     listing,
//!     r#"<ul id="result-list"><li class="shoppingcart">
//!          <div class="description"><span class="bold">Velg</span></div>
//!        </li></ul>"#,
//! );
//!
//! let config = ScraperConfig { timeouts: Timeouts::immediate(), ..Default::default() };
//! let outcome = Scraper::new(&driver, &config, &NoCapture)?.scrape(&SearchRequest::new("27XHVX", "Velg")?);
//!
//! assert_eq!(outcome.result.categories["Direct Results"].len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`browser`]: the [`PageDriver`] capability, Chrome session and offline fixture driver
//! - [`orchestrator`]: the end-to-end state machine; **start here**
//! - [`resolve`]: model type and category resolution
//! - [`classify`], [`extract`], [`paginate`]: page classification, item extraction, page walking
//! - [`wait`], [`consent`], [`diagnostics`]: bounded waits, cookie banners, failure capture
//! - [`config`], [`model`], [`error`]: configuration, data model, error types
//! - [`supervisor`]: wall-clock budget with guaranteed teardown (requires `tokio` feature)

pub mod browser;
pub mod classify;
pub mod config;
pub mod consent;
pub mod diagnostics;
pub mod error;
pub mod extract;
pub mod model;
pub mod orchestrator;
pub mod paginate;
pub mod resolve;
pub mod wait;

#[cfg(feature = "tokio")]
pub mod supervisor;

pub use browser::{BrowserSession, ConnectionOptions, ElementHandle, FixtureBrowser, LaunchOptions, PageDriver, Teardown};
pub use classify::PageKind;
pub use config::{ModelTable, ScraperConfig, SiteProfile, Timeouts};
pub use diagnostics::{DiagnosticCapture, FileCapture, NoCapture};
pub use error::{ErrorKind, Result, ScrapeError};
pub use model::{CategoryCandidate, ModelSource, ModelType, PartRecord, Price, ScrapeResult, SearchInfo, SearchRequest};
pub use orchestrator::{FailureCause, ProgressEvent, ScrapeOutcome, ScrapeState, Scraper};

#[cfg(feature = "tokio")]
pub use supervisor::run_with_budget;
