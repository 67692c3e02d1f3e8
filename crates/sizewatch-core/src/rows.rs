//! Shared value types for per-size aggregation and the persisted price table.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized numeric size key, e.g. `"27.5"` for `"27.5cm"`.
///
/// Stable across runs and sources so the same physical size always maps to
/// the same store key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalSize(String);

impl CanonicalSize {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An eligible search-result entry. Only lives for one keyword's run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingCandidate {
    pub id: String,
    pub price: u64,
}

/// Size label exactly as found on a detail page, e.g. `"27.5cm"` or `"US 9"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSize {
    pub label: String,
}

/// Cheapest listing found for one size in the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedEntry {
    pub size: CanonicalSize,
    pub price: u64,
    /// Stored URL (affiliate parameter already applied).
    pub url: String,
}

/// One run's per-size result for a single keyword.
pub type SizeMap = BTreeMap<CanonicalSize, AggregatedEntry>;

/// Upsert key of the price table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    pub product_id: String,
    pub size: CanonicalSize,
    pub source: String,
}

/// A row of the persisted price table: `ID, NAME, SIZE, SOURCE, PRICE, URL, UPDATED_AT`.
///
/// `price == 0` with an empty `url` marks a size that was seen in an earlier
/// run but not reconfirmed by the latest one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRow {
    pub product_id: String,
    pub product_name: String,
    pub size: CanonicalSize,
    pub source: String,
    pub price: u64,
    pub url: String,
    pub updated_at: DateTime<Utc>,
}

impl PriceRow {
    #[must_use]
    pub fn key(&self) -> RowKey {
        RowKey {
            product_id: self.product_id.clone(),
            size: self.size.clone(),
            source: self.source.clone(),
        }
    }

    /// Returns `true` for an invalidated row (`price = 0`, `url = ""`).
    #[must_use]
    pub fn is_zeroed(&self) -> bool {
        self.price == 0 && self.url.is_empty()
    }
}
