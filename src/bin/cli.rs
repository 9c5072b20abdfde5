//! onderdelen-scraper command line
//!
//! Scrapes part listings for one license plate and part name and writes the result
//! as JSON.
//!
//! Exit status: 0 when the scrape completed (with or without parts), 1 when no model
//! type could be determined or the run stopped on another error, 2 on a browser
//! session failure (including an exceeded budget), 130 when interrupted.

use anyhow::Context;
use clap::Parser;
use onderdelen_scraper::{BrowserSession, ConnectionOptions, FailureCause, FileCapture, LaunchOptions, ProgressEvent,
                         ScrapeOutcome, Scraper, ScraperConfig, SearchRequest, Teardown, run_with_budget};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "onderdelen-scraper", version, about = "Scrape spare-part listings from onderdelenlijn.nl")]
struct Cli {
    /// License plate, with or without hyphens
    plate: String,

    /// Part name to search for, e.g. "Aandrijfas links-voor"
    part: String,

    /// Output file (default: onderdelen_<plate>_<part>_<timestamp>.json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Launch browser in headed mode (default: headless)
    #[arg(long)]
    headed: bool,

    /// JSON configuration file; missing keys keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chrome/Chromium executable
    #[arg(long)]
    chrome_path: Option<PathBuf>,

    /// Connect to a running browser at this DevTools WebSocket URL instead of launching one
    #[arg(long)]
    ws_endpoint: Option<String>,

    /// Browser profile directory
    #[arg(long)]
    user_data_dir: Option<PathBuf>,

    /// Directory for diagnostic screenshots and page sources
    #[arg(long)]
    diagnostics_dir: Option<PathBuf>,

    /// Wall-clock budget for the whole scrape, in seconds
    #[arg(long)]
    budget_secs: Option<u64>,

    /// Maximum result pages per category
    #[arg(long)]
    max_pages: Option<usize>,
}

impl Cli {
    fn scraper_config(&self) -> anyhow::Result<ScraperConfig> {
        let mut config = match &self.config {
            Some(path) => ScraperConfig::from_json_file(path)?,
            None => ScraperConfig::default(),
        };

        if let Some(dir) = &self.diagnostics_dir {
            config.diagnostics_dir = dir.clone();
        }
        if let Some(secs) = self.budget_secs {
            config.timeouts.budget_secs = secs;
        }
        if let Some(max_pages) = self.max_pages {
            config.max_pages = max_pages;
        }

        config.validate()?;
        Ok(config)
    }

    fn open_session(&self) -> anyhow::Result<BrowserSession> {
        if let Some(ws_url) = &self.ws_endpoint {
            return Ok(BrowserSession::connect(ConnectionOptions::new(ws_url.clone()))?);
        }

        let mut options = LaunchOptions::new().headless(!self.headed);
        if let Some(path) = &self.chrome_path {
            options = options.chrome_path(path.clone());
        }
        if let Some(dir) = &self.user_data_dir {
            options = options.user_data_dir(dir.clone());
        }

        Ok(BrowserSession::launch(options)?)
    }
}

fn log_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::ModelResolved { model, source } => log::info!("Model type {} ({:?})", model, source),
        ProgressEvent::Classified(kind) => log::debug!("Landing page: {:?}", kind),
        ProgressEvent::CategoriesFound(candidates) => log::info!("{} matching categories", candidates.len()),
        ProgressEvent::PageScraped { category, page, parts } => {
            log::debug!("{} page {}: {} part(s)", category, page, parts)
        }
        ProgressEvent::Finished { .. } => {}
    }
}

fn summarize(outcome: &ScrapeOutcome) {
    let result = &outcome.result;
    log::info!(
        "Found {} part(s) in {} categor{}",
        result.total_parts(),
        result.categories.len(),
        if result.categories.len() == 1 { "y" } else { "ies" }
    );

    for (label, records) in &result.categories {
        let priced: Vec<f64> = records.iter().filter_map(|r| r.price.amount()).collect();
        if priced.is_empty() {
            log::info!("  {}: {} part(s)", label, records.len());
        } else {
            let low = priced.iter().copied().fold(f64::INFINITY, f64::min);
            let high = priced.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            log::info!("  {}: {} part(s), € {:.2} - € {:.2}", label, records.len(), low, high);
        }
    }

    for failure in &outcome.category_failures {
        log::warn!("  {} failed: {}", failure.category, failure.error);
    }
}

fn exit_code(outcome: &ScrapeOutcome) -> ExitCode {
    match outcome.failure() {
        None | Some(FailureCause::NoCategory) => ExitCode::SUCCESS,
        Some(FailureCause::Session(_)) => ExitCode::from(2),
        Some(FailureCause::NoModel | FailureCause::Other(_)) => ExitCode::from(1),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.scraper_config()?;
    let request = SearchRequest::new(&cli.plate, &cli.part)?;

    let session = Arc::new(cli.open_session().context("Failed to open browser session")?);
    log::info!("Browser mode: {}", if cli.headed { "headed" } else { "headless" });

    let budget = config.timeouts.budget();
    let diagnostics = FileCapture::new(&config.diagnostics_dir);
    let job_config = config.clone();

    let job = move |driver: &BrowserSession, request: &SearchRequest| match Scraper::new(driver, &job_config, &diagnostics)
    {
        Ok(scraper) => scraper.on_progress(log_progress).scrape(request),
        Err(e) => ScrapeOutcome::failed(request, e.into()),
    };

    let outcome = tokio::select! {
        outcome = run_with_budget(Arc::clone(&session), budget, request.clone(), job) => outcome,
        _ = tokio::signal::ctrl_c() => {
            log::warn!("Interrupted, closing browser");
            session.teardown();
            return Ok(ExitCode::from(130));
        }
    };

    let path = cli.output.clone().unwrap_or_else(|| PathBuf::from(outcome.result.file_name()));
    let json = serde_json::to_string_pretty(&outcome.result)?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Results written to {}", path.display());

    summarize(&outcome);
    if let Some(cause) = outcome.failure() {
        log::error!("Scrape failed: {:?}", cause);
    }

    Ok(exit_code(&outcome))
}
