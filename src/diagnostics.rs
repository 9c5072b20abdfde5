//! Diagnostic capture on failure
//!
//! When a category page cannot be resolved the browser state is written to disk: a
//! screenshot, the page source and a small JSON report. Saved page sources can be fed
//! back through [`FixtureBrowser`](crate::browser::FixtureBrowser) to replay the failure.

use crate::browser::PageDriver;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Records the browser state for a failure. Never fails the caller.
pub trait DiagnosticCapture: Send + Sync {
    fn capture(&self, driver: &dyn PageDriver, reason: &str, context: Option<&str>);
}

/// Contents of `debug_context_*.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub reason: String,
    pub captured_at: DateTime<Utc>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub viewport: Option<(u32, u32)>,
    /// Free-form detail, e.g. the part name being resolved
    pub context: Option<String>,
    pub screenshot: Option<PathBuf>,
    pub page_source: Option<PathBuf>,
}

/// Writes capture artifacts into a directory
#[derive(Debug, Clone)]
pub struct FileCapture {
    dir: PathBuf,
}

impl FileCapture {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write every artifact that can be obtained; pieces the driver cannot provide are
    /// left out of the report instead of failing it
    pub fn write_report(&self, driver: &dyn PageDriver, reason: &str, context: Option<&str>) -> Result<DiagnosticReport> {
        std::fs::create_dir_all(&self.dir)?;

        let captured_at = Utc::now();
        let stem = format!("{}_{}", slug(reason), captured_at.format("%Y%m%d_%H%M%S_%3f"));

        let screenshot = match driver.screenshot() {
            Ok(png) if !png.is_empty() => {
                let path = self.dir.join(format!("debug_screenshot_{}.png", stem));
                std::fs::write(&path, png)?;
                log::info!("Screenshot saved: {}", path.display());
                Some(path)
            }
            Ok(_) => None,
            Err(e) => {
                log::warn!("Screenshot failed: {}", e);
                None
            }
        };

        let page_source = match driver.page_markup() {
            Ok(markup) => {
                let path = self.dir.join(format!("debug_page_source_{}.html", stem));
                std::fs::write(&path, markup)?;
                log::info!("Page source saved: {}", path.display());
                Some(path)
            }
            Err(e) => {
                log::warn!("Page source unavailable: {}", e);
                None
            }
        };

        let report = DiagnosticReport {
            reason: reason.to_string(),
            captured_at,
            url: driver.current_url().ok(),
            title: driver.page_title().ok(),
            viewport: driver.viewport_size().ok(),
            context: context.map(str::to_string),
            screenshot,
            page_source,
        };

        let path = self.dir.join(format!("debug_context_{}.json", stem));
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        log::info!("Diagnostic context saved: {}", path.display());

        Ok(report)
    }
}

impl DiagnosticCapture for FileCapture {
    fn capture(&self, driver: &dyn PageDriver, reason: &str, context: Option<&str>) {
        log::warn!("Capturing diagnostics: {}", reason);
        if let Err(e) = self.write_report(driver, reason, context) {
            log::error!("Diagnostic capture failed: {}", e);
        }
    }
}

/// Discards captures
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCapture;

impl DiagnosticCapture for NoCapture {
    fn capture(&self, _driver: &dyn PageDriver, reason: &str, _context: Option<&str>) {
        log::debug!("Diagnostics disabled, not capturing: {}", reason);
    }
}

/// Keeps the reason of every capture in memory
#[derive(Debug, Default)]
pub struct RecordingCapture {
    reasons: Mutex<Vec<String>>,
}

impl RecordingCapture {
    pub fn reasons(&self) -> Vec<String> {
        self.reasons.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl DiagnosticCapture for RecordingCapture {
    fn capture(&self, _driver: &dyn PageDriver, reason: &str, _context: Option<&str>) {
        if let Ok(mut reasons) = self.reasons.lock() {
            reasons.push(reason.to_string());
        }
    }
}

fn slug(reason: &str) -> String {
    let slug: String = reason
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    slug.trim_matches('_').to_string()
}
