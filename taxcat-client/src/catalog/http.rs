//! HTTP/JSON client for the catalog service

use super::{CatalogError, CatalogService};
use async_trait::async_trait;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use taxcat_common::config::ServiceConfig;
use taxcat_common::{CatalogStats, ComputedRecord, NormalizedRecord, QueryFilter, QueryPage, QueryResult};

const USER_AGENT: &str = concat!("taxcat/", env!("CARGO_PKG_VERSION"));

/// Query string for `GET /orders`; absent bounds are omitted
#[derive(Debug, Serialize)]
struct OrdersQuery<'a> {
    page: u32,
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    county: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_subtotal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_tax: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_rate: Option<f64>,
    to_show_errors: bool,
}

/// `GET /orders` response body
#[derive(Debug, Deserialize)]
struct OrdersPage {
    orders: Vec<ComputedRecord>,
    total: u64,
    page: u32,
    total_pages: u32,
    total_tax: f64,
    total_revenue: f64,
}

/// FastAPI-style error body
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Catalog service client over HTTP
pub struct HttpCatalogClient {
    http_client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpCatalogClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CatalogError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
        })
    }

    /// Build a client from the `[service]` configuration section
    pub fn from_config(config: &ServiceConfig) -> Result<Self, CatalogError> {
        let mut client = Self::new(config.base_url.clone(), config.timeout())?;
        client.auth_token = config.auth_token.clone();
        Ok(client)
    }

    /// Forward a bearer token on every request
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.http_client.request(method, url);
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, CatalogError> {
        let response = builder
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(CatalogError::Status {
            status: status.as_u16(),
            body: error_message(&body),
        })
    }
}

/// Pull `detail` out of a JSON error body, falling back to the raw text
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(s),
        }) => s,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => body.to_string(),
    }
}

#[async_trait]
impl CatalogService for HttpCatalogClient {
    async fn create_record(&self, record: &NormalizedRecord) -> Result<ComputedRecord, CatalogError> {
        let builder = self.request(reqwest::Method::POST, "/orders").json(record);

        let response = match self.send(builder).await {
            Ok(response) => response,
            Err(CatalogError::Status { status, body }) if (400..500).contains(&status) => {
                return Err(CatalogError::Validation(body));
            }
            Err(e) => return Err(e),
        };

        let created: ComputedRecord = response
            .json()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))?;

        tracing::info!(
            id = created.id,
            rate = created.composite_tax_rate,
            "Record created"
        );
        Ok(created)
    }

    async fn bulk_create(&self, chunk: &[NormalizedRecord]) -> Result<usize, CatalogError> {
        let builder = self
            .request(reqwest::Method::POST, "/orders/import")
            .json(chunk);

        let response = self.send(builder).await?;

        // Only the count matters; the rows themselves are fetched via query
        let created: Vec<IgnoredAny> = response
            .json()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))?;

        Ok(created.len())
    }

    async fn query(&self, filter: &QueryFilter, page: QueryPage) -> Result<QueryResult, CatalogError> {
        let params = OrdersQuery {
            page: page.number,
            limit: page.size,
            county: filter.county_prefix.as_deref(),
            min_subtotal: filter.min_subtotal,
            min_tax: filter.min_tax,
            min_rate: filter.min_rate_fraction,
            to_show_errors: filter.include_error_rows,
        };

        tracing::debug!(?params, "Querying catalog");

        let builder = self.request(reqwest::Method::GET, "/orders").query(&params);
        let response = self.send(builder).await?;

        let body: OrdersPage = response
            .json()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))?;

        Ok(QueryResult {
            page: body.page,
            records: body.orders,
            total_count: body.total,
            total_pages: body.total_pages.max(1),
            aggregate_tax: body.total_tax,
            aggregate_revenue: body.total_revenue,
        })
    }

    async fn stats(&self) -> Result<CatalogStats, CatalogError> {
        let response = self.send(self.request(reqwest::Method::GET, "/api/stats")).await?;
        response
            .json()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))
    }
}
