//! Domain records exchanged with the catalog service
//!
//! Field names follow the catalog service's JSON contract.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of rows requested per catalog page
pub const DEFAULT_PAGE_SIZE: u32 = 15;

/// Largest page size the catalog service accepts
pub const MAX_PAGE_SIZE: u32 = 100;

/// Number of records transmitted per bulk-create request
pub const DEFAULT_CHUNK_SIZE: usize = 2000;

/// A validated transaction ready to be sent to the catalog service
///
/// `latitude` is never exactly 0 and `subtotal` is always finite once a record
/// leaves the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub latitude: f64,
    pub longitude: f64,
    pub subtotal: f64,
    /// RFC 3339 timestamp (UTC)
    pub timestamp: String,
}

/// Per-jurisdiction rate components of a composite rate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub state_rate: f64,
    pub county_rate: f64,
    pub city_rate: f64,
    pub special_rates: f64,
}

/// A catalog row after the service computed its tax
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedRecord {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub subtotal: f64,
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Sum of applicable jurisdiction rates (e.g. 0.08875)
    pub composite_tax_rate: f64,
    pub tax_amount: f64,
    pub total_amount: f64,
    #[serde(default)]
    pub state_rate: f64,
    #[serde(default)]
    pub county_rate: f64,
    #[serde(default)]
    pub city_rate: f64,
    #[serde(default)]
    pub special_rates: f64,
    /// Computed jurisdiction label, e.g. "Kings, New York State"
    #[serde(default)]
    pub jurisdictions: Option<String>,
    #[serde(default)]
    pub breakdown: Option<TaxBreakdown>,
    /// False when the location fell outside every covered jurisdiction
    #[serde(rename = "isInNewYork", default = "default_in_service_area")]
    pub in_service_area: bool,
}

fn default_in_service_area() -> bool {
    true
}

impl ComputedRecord {
    /// Whether the service flagged this row's rate as defective
    pub fn rate_defective(&self) -> bool {
        !self.in_service_area
    }
}

/// Predicates applied by the catalog service when listing records
///
/// All numeric bounds are inclusive lower bounds. `min_rate_fraction` is a
/// fraction (0.08875), never a percentage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub county_prefix: Option<String>,
    pub min_subtotal: Option<f64>,
    pub min_tax: Option<f64>,
    pub min_rate_fraction: Option<f64>,
    pub include_error_rows: bool,
}

/// Pagination request (1-indexed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPage {
    pub number: u32,
    pub size: u32,
}

impl QueryPage {
    /// Create a page request; page numbers below 1 are raised to 1
    pub fn new(number: u32, size: u32) -> Self {
        Self {
            number: number.max(1),
            size: size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Offset of the first row of this page
    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.size)
    }
}

impl Default for QueryPage {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

/// Total page count for `total_count` rows; at least 1 even when empty
pub fn total_pages(total_count: u64, page_size: u32) -> u32 {
    let size = u64::from(page_size.max(1));
    let pages = total_count.div_ceil(size).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// One page of catalog rows plus the aggregates of the whole filtered set
///
/// Every field comes from the same fetch; a result is only ever replaced as a
/// whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub page: u32,
    pub records: Vec<ComputedRecord>,
    pub total_count: u64,
    pub total_pages: u32,
    pub aggregate_tax: f64,
    pub aggregate_revenue: f64,
}

/// Global, unfiltered catalog summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogStats {
    #[serde(rename = "orders_count")]
    pub count: u64,
    pub total_tax: f64,
    pub total_revenue: f64,
}

/// Snapshot of a running bulk upload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub uploaded_count: usize,
    pub total_count: usize,
    /// `None` until at least one record has been acknowledged
    pub eta_seconds: Option<f64>,
}

impl UploadProgress {
    /// Build a snapshot, projecting the running-average throughput over the
    /// records not yet acknowledged
    pub fn measure(uploaded_count: usize, total_count: usize, elapsed: Duration) -> Self {
        let eta_seconds = if uploaded_count == 0 {
            None
        } else {
            let remaining = total_count.saturating_sub(uploaded_count) as f64;
            let millis_per_record = elapsed.as_secs_f64() * 1000.0 / uploaded_count as f64;
            Some(remaining * millis_per_record / 1000.0)
        };

        Self {
            uploaded_count,
            total_count,
            eta_seconds,
        }
    }

    /// Fraction complete, 0.0 to 100.0
    pub fn percentage(&self) -> f64 {
        if self.total_count == 0 {
            100.0
        } else {
            self.uploaded_count as f64 / self.total_count as f64 * 100.0
        }
    }
}
