//! Data model: search input, resolved identifiers and scraped records

use crate::error::{Result, ScrapeError};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Placeholder for a field the listing does not provide
pub const NOT_AVAILABLE: &str = "N/A";

/// Placeholder for a price the supplier only gives on request
pub const PRICE_ON_REQUEST: &str = "Prijs op aanvraag";

/// Canonical plate form: uppercase, no whitespace, no hyphens
pub fn normalize_plate(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_uppercase)
        .collect()
}

/// What to search for. Normalized once on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    license_plate: String,
    part_name: String,
}

impl SearchRequest {
    pub fn new(license_plate: &str, part_name: &str) -> Result<Self> {
        let license_plate = normalize_plate(license_plate);
        let part_name = part_name.split_whitespace().collect::<Vec<_>>().join(" ");

        if license_plate.is_empty() {
            return Err(ScrapeError::InvalidRequest("license plate is empty".to_string()));
        }
        if part_name.is_empty() {
            return Err(ScrapeError::InvalidRequest("part name is empty".to_string()));
        }

        Ok(Self { license_plate, part_name })
    }

    pub fn license_plate(&self) -> &str {
        &self.license_plate
    }

    pub fn part_name(&self) -> &str {
        &self.part_name
    }
}

/// The site's internal identifier for a vehicle make/model/variant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelType(String);

impl ModelType {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the model type was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    /// Read from the page after submitting the plate lookup form
    Dynamic,
    /// Plate found in the static table
    FallbackTable,
    /// Plate not in the table; the table's default was used
    FallbackDefault,
}

/// A category menu entry matching the searched part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCandidate {
    pub label: String,
    /// Absolute URL of the category's listing
    pub url: String,
}

/// Listed price of a part
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Price {
    /// Amount in euros; `0.0` is a listed zero price, not a parse failure
    Amount(f64),
    /// The listing says the price is given on request
    OnRequest,
    /// No price node, or no amount in it
    NotAvailable,
}

impl Price {
    pub fn amount(&self) -> Option<f64> {
        match self {
            Price::Amount(value) => Some(*value),
            _ => None,
        }
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Price::Amount(value) => serializer.serialize_f64(*value),
            Price::OnRequest => serializer.serialize_str(PRICE_ON_REQUEST),
            Price::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(value) => Price::Amount(value),
            Raw::Text(text) if text.eq_ignore_ascii_case(PRICE_ON_REQUEST) => Price::OnRequest,
            Raw::Text(_) => Price::NotAvailable,
        })
    }
}

/// One purchasable part listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartRecord {
    pub title: String,
    pub price: Price,
    pub supplier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warranty_months: Option<u32>,
    /// Label → value pairs in listing order
    pub specifications: IndexMap<String, String>,
    pub image_url: String,
    pub source_url: String,
    /// Key of the category this record is filed under
    pub category: String,
    pub scraped_at: DateTime<Utc>,
}

/// Metadata describing the search that produced a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchInfo {
    pub license_plate: String,
    pub part_name: String,
    pub model_type: Option<ModelType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_source: Option<ModelSource>,
    pub scraped_at: DateTime<Utc>,
}

/// Everything one scrape produced, grouped by category label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub search_info: SearchInfo,
    pub categories: IndexMap<String, Vec<PartRecord>>,
}

impl ScrapeResult {
    pub fn new(request: &SearchRequest, scraped_at: DateTime<Utc>) -> Self {
        Self {
            search_info: SearchInfo {
                license_plate: request.license_plate().to_string(),
                part_name: request.part_name().to_string(),
                model_type: None,
                model_source: None,
                scraped_at,
            },
            categories: IndexMap::new(),
        }
    }

    /// File `records` under `label`. Records are appended, never replaced, and each one
    /// is re-tagged with the key it ends up under.
    pub fn file_records(&mut self, label: &str, records: Vec<PartRecord>) {
        let bucket = self.categories.entry(label.to_string()).or_default();
        bucket.extend(records.into_iter().map(|mut record| {
            record.category = label.to_string();
            record
        }));
    }

    pub fn total_parts(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    /// Default output name: `onderdelen_<plate>_<part>_<timestamp>.json`
    pub fn file_name(&self) -> String {
        let part: String = self
            .search_info
            .part_name
            .chars()
            .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();

        format!(
            "onderdelen_{}_{}_{}.json",
            self.search_info.license_plate,
            part,
            self.search_info.scraped_at.format("%Y%m%d_%H%M%S")
        )
    }
}
