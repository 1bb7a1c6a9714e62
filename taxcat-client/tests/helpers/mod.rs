//! Test helpers for taxcat-client integration tests
//!
//! Provides:
//! - MockCatalog: in-memory CatalogService with scripted latency and failures
//! - Record builders

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taxcat_client::catalog::{CatalogError, CatalogService};
use taxcat_common::model::total_pages;
use taxcat_common::{
    CatalogStats, ComputedRecord, NormalizedRecord, QueryFilter, QueryPage, QueryResult,
};

/// Build `n` distinct records; subtotal encodes the position
pub fn records(n: usize) -> Vec<NormalizedRecord> {
    (0..n)
        .map(|i| NormalizedRecord {
            latitude: 40.0 + (i % 100) as f64 * 0.01,
            longitude: -74.0,
            subtotal: i as f64,
            timestamp: "2025-01-01T00:00:00.000Z".to_string(),
        })
        .collect()
}

pub fn computed(id: i64, record: &NormalizedRecord) -> ComputedRecord {
    ComputedRecord {
        id,
        latitude: record.latitude,
        longitude: record.longitude,
        subtotal: record.subtotal,
        timestamp: Some(record.timestamp.clone()),
        composite_tax_rate: 0.08875,
        tax_amount: record.subtotal * 0.08875,
        total_amount: record.subtotal * 1.08875,
        state_rate: 0.04,
        county_rate: 0.04875,
        city_rate: 0.0,
        special_rates: 0.0,
        jurisdictions: Some("New York, New York State".to_string()),
        breakdown: None,
        in_service_area: true,
    }
}

#[derive(Default)]
struct MockState {
    bulk_calls: Vec<Vec<NormalizedRecord>>,
    bulk_latency: Duration,
    fail_bulk_on_call: Option<usize>,
    in_flight: usize,
    max_in_flight: usize,

    queries: Vec<(QueryFilter, QueryPage)>,
    query_delays: VecDeque<Duration>,
    fail_queries: bool,
    total_rows: u64,

    created: Vec<NormalizedRecord>,
    reject_creates: bool,

    stats_calls: usize,
}

/// In-memory catalog that records every call
#[derive(Clone, Default)]
pub struct MockCatalog {
    state: Arc<Mutex<MockState>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        let catalog = Self::default();
        catalog.state.lock().unwrap().total_rows = 100;
        catalog
    }

    pub fn as_service(&self) -> Arc<dyn CatalogService> {
        Arc::new(self.clone())
    }

    /// Latency of every bulk call
    pub fn set_bulk_latency(&self, latency: Duration) {
        self.state.lock().unwrap().bulk_latency = latency;
    }

    /// Fail the bulk call with this 0-based index
    pub fn fail_bulk_on_call(&self, call: usize) {
        self.state.lock().unwrap().fail_bulk_on_call = Some(call);
    }

    /// Queue a latency for the next query call (FIFO); unqueued calls are instant
    pub fn push_query_delay(&self, delay: Duration) {
        self.state.lock().unwrap().query_delays.push_back(delay);
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.state.lock().unwrap().fail_queries = fail;
    }

    /// Row count reported for every filter
    pub fn set_total_rows(&self, total: u64) {
        self.state.lock().unwrap().total_rows = total;
    }

    pub fn set_reject_creates(&self, reject: bool) {
        self.state.lock().unwrap().reject_creates = reject;
    }

    pub fn bulk_calls(&self) -> Vec<Vec<NormalizedRecord>> {
        self.state.lock().unwrap().bulk_calls.clone()
    }

    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.bulk_calls().iter().map(Vec::len).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }

    pub fn queries(&self) -> Vec<(QueryFilter, QueryPage)> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn created(&self) -> Vec<NormalizedRecord> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn stats_calls(&self) -> usize {
        self.state.lock().unwrap().stats_calls
    }
}

#[async_trait]
impl CatalogService for MockCatalog {
    async fn create_record(&self, record: &NormalizedRecord) -> Result<ComputedRecord, CatalogError> {
        let mut state = self.state.lock().unwrap();
        if state.reject_creates {
            return Err(CatalogError::Validation("Latitude out of range".to_string()));
        }
        state.created.push(record.clone());
        Ok(computed(state.created.len() as i64, record))
    }

    async fn bulk_create(&self, chunk: &[NormalizedRecord]) -> Result<usize, CatalogError> {
        let (latency, call, fail_on) = {
            let mut state = self.state.lock().unwrap();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state.bulk_calls.push(chunk.to_vec());
            (state.bulk_latency, state.bulk_calls.len() - 1, state.fail_bulk_on_call)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        self.state.lock().unwrap().in_flight -= 1;
        if fail_on == Some(call) {
            return Err(CatalogError::Status {
                status: 504,
                body: "Gateway timeout".to_string(),
            });
        }
        Ok(chunk.len())
    }

    async fn query(&self, filter: &QueryFilter, page: QueryPage) -> Result<QueryResult, CatalogError> {
        let (delay, fail, total) = {
            let mut state = self.state.lock().unwrap();
            state.queries.push((filter.clone(), page));
            (
                state.query_delays.pop_front().unwrap_or_default(),
                state.fail_queries,
                state.total_rows,
            )
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(CatalogError::Network("connection refused".to_string()));
        }

        let start = page.offset();
        let end = (start + u64::from(page.size)).min(total);
        let rows: Vec<ComputedRecord> = (start..end)
            .map(|i| {
                let record = NormalizedRecord {
                    latitude: 40.7,
                    longitude: -74.0,
                    subtotal: i as f64,
                    timestamp: "2025-01-01T00:00:00.000Z".to_string(),
                };
                computed(i as i64 + 1, &record)
            })
            .collect();

        Ok(QueryResult {
            page: page.number,
            records: rows,
            total_count: total,
            total_pages: total_pages(total, page.size),
            aggregate_tax: total as f64 * 0.5,
            aggregate_revenue: total as f64 * 10.0,
        })
    }

    async fn stats(&self) -> Result<CatalogStats, CatalogError> {
        let mut state = self.state.lock().unwrap();
        state.stats_calls += 1;
        Ok(CatalogStats {
            count: state.total_rows,
            total_tax: state.total_rows as f64 * 0.5,
            total_revenue: state.total_rows as f64 * 10.0,
        })
    }
}
