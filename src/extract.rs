//! Results page extraction
//!
//! [`PageExtractor::extract`] turns the markup of one rendered results page into
//! [`PartRecord`]s. It does no I/O and no waiting, so it runs just as well on markup
//! captured earlier as on the live page.
//!
//! Item layout on the site:
//!
//! ```text
//! ul#result-list
//!   li.shoppingcart[onclick="window.location.href='/onderdeel/...'"]
//!     div.thumbnail img[src]
//!     div.description
//!       span.bold                      title
//!       span.item > span, span         label, value
//!     div.pricing
//!       span.price                     "€ 123,45" | "Prijs op aanvraag"
//!       span.block                     supplier
//!       "Garantie 3 mnd"
//! ```

use crate::config::SiteProfile;
use crate::error::{Result, ScrapeError};
use crate::model::{NOT_AVAILABLE, PartRecord, Price};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("div.description span.bold"));
static PRICE: LazyLock<Selector> = LazyLock::new(|| selector("span.price"));
static PRICING: LazyLock<Selector> = LazyLock::new(|| selector("div.pricing"));
static SUPPLIER: LazyLock<Selector> = LazyLock::new(|| selector("div.pricing span.block"));
static SPEC_ITEM: LazyLock<Selector> = LazyLock::new(|| selector("div.description span.item"));
static SPAN: LazyLock<Selector> = LazyLock::new(|| selector("span"));
static IMAGE: LazyLock<Selector> = LazyLock::new(|| selector("div.thumbnail img"));

static EURO_AMOUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"€\s*(\d+(?:[.,]\d+)*)").expect("valid regex"));
static WARRANTY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Garantie\s+(\d+)\s*mnd").expect("valid regex"));
static ONCLICK_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"window\.location\.href\s*=\s*'([^']+)'").expect("valid regex"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid built-in selector")
}

/// Per-page values stamped on every record
#[derive(Debug, Clone)]
pub struct ExtractContext<'a> {
    pub category: &'a str,
    pub scraped_at: DateTime<Utc>,
}

/// Parser for results pages of one site
#[derive(Debug, Clone)]
pub struct PageExtractor {
    items: Selector,
    base: Url,
    on_request_phrase: String,
}

impl PageExtractor {
    pub fn new(site: &SiteProfile) -> Result<Self> {
        let css = format!("{} {}", site.results_list, site.result_item);
        let items = Selector::parse(&css).map_err(|_| ScrapeError::InvalidSelector(css.clone()))?;

        Ok(Self { items, base: site.base()?, on_request_phrase: site.price_on_request_phrase.to_lowercase() })
    }

    /// All well-formed items on the page, in document order.
    ///
    /// Items without a title are skipped; their siblings are still extracted.
    pub fn extract(&self, markup: &str, ctx: &ExtractContext<'_>) -> Vec<PartRecord> {
        let document = Html::parse_document(markup);
        let mut records = Vec::new();

        for (index, item) in document.select(&self.items).enumerate() {
            match self.extract_item(item, ctx) {
                Ok(record) => records.push(record),
                Err(e) => log::debug!("Skipping item {}: {}", index + 1, e),
            }
        }

        log::debug!("Extracted {} part(s) for {}", records.len(), ctx.category);
        records
    }

    fn extract_item(&self, item: ElementRef<'_>, ctx: &ExtractContext<'_>) -> Result<PartRecord> {
        let title = first_text(item, &TITLE)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ScrapeError::ExtractionAnomaly("item has no title".to_string()))?;

        let price = match first_text(item, &PRICE) {
            Some(text) => self.parse_price(&text),
            None => Price::NotAvailable,
        };

        let supplier = first_text(item, &SUPPLIER)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        let warranty_months = item
            .select(&PRICING)
            .next()
            .and_then(|pricing| {
                let text = pricing.text().collect::<String>();
                WARRANTY.captures(&text).and_then(|c| c[1].parse().ok())
            });

        let specifications = specifications(item);
        let condition = condition(&title, &specifications);

        let image_url = item
            .select(&IMAGE)
            .next()
            .and_then(|img| img.value().attr("src"))
            .and_then(|src| self.absolutize(src))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        let source_url = item
            .value()
            .attr("onclick")
            .and_then(|onclick| ONCLICK_TARGET.captures(onclick))
            .and_then(|c| self.absolutize(&c[1]))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        Ok(PartRecord {
            title,
            price,
            supplier,
            condition,
            warranty_months,
            specifications,
            image_url,
            source_url,
            category: ctx.category.to_string(),
            scraped_at: ctx.scraped_at,
        })
    }

    pub fn parse_price(&self, text: &str) -> Price {
        parse_price(text, &self.on_request_phrase)
    }

    fn absolutize(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        self.base.join(reference).ok().map(String::from)
    }
}

/// Price from the text of a price node.
///
/// `on_request_phrase` is matched case-insensitively and wins over any amount. The
/// first euro amount is read with either separator convention: `1.234,56`, `123,45`,
/// `1.234` (thousands) and `12.50` (decimal).
pub fn parse_price(text: &str, on_request_phrase: &str) -> Price {
    if !on_request_phrase.is_empty() && text.to_lowercase().contains(&on_request_phrase.to_lowercase()) {
        return Price::OnRequest;
    }

    let Some(captures) = EURO_AMOUNT.captures(text) else {
        return Price::NotAvailable;
    };

    let raw = &captures[1];
    let normalized = if raw.contains(',') {
        raw.replace('.', "").replace(',', ".")
    } else {
        match raw.rsplit_once('.') {
            Some((_, fraction)) if fraction.len() == 3 => raw.replace('.', ""),
            Some((whole, fraction)) => format!("{}.{}", whole.replace('.', ""), fraction),
            None => raw.to_string(),
        }
    };

    normalized.parse().map(Price::Amount).unwrap_or(Price::NotAvailable)
}

fn first_text(item: ElementRef<'_>, selector: &Selector) -> Option<String> {
    item.select(selector).next().map(text_of)
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Label/value pairs; a repeated label keeps the last value
fn specifications(item: ElementRef<'_>) -> IndexMap<String, String> {
    let mut specs = IndexMap::new();

    for entry in item.select(&SPEC_ITEM) {
        let mut spans = entry.select(&SPAN);
        let (Some(label), Some(value)) = (spans.next(), spans.next()) else {
            continue;
        };

        let label = text_of(label).trim_end_matches(':').trim().to_string();
        if label.is_empty() {
            continue;
        }
        specs.insert(label, text_of(value));
    }

    specs
}

/// Title words decide first; "Ongebruikte" is not "Gebruikt"
fn condition(title: &str, specs: &IndexMap<String, String>) -> Option<String> {
    let lower = title.to_lowercase();
    let starts_word = |prefix: &str| lower.split(|c: char| !c.is_alphanumeric()).any(|word| word.starts_with(prefix));

    if starts_word("gebruikt") {
        return Some("Gebruikt".to_string());
    }
    if starts_word("nieuw") {
        return Some("Nieuw".to_string());
    }

    ["Conditie", "Staat"]
        .iter()
        .find_map(|key| specs.get(*key))
        .filter(|v| !v.is_empty())
        .cloned()
}
