//! Session context shared by the client components
//!
//! Carries the outcome of the external authentication gate and the last
//! known global catalog stats. Components receive it explicitly at
//! construction time instead of reading process-wide state.

use crate::catalog::{CatalogError, CatalogService};
use std::sync::Arc;
use taxcat_common::{CatalogStats, Error, Result};
use tokio::sync::RwLock;

/// Outcome of the authentication gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated {
        /// Bearer token, when the gate issued one
        token: Option<String>,
    },
}

/// Session/context object passed into every client component
#[derive(Debug)]
pub struct SessionContext {
    auth: AuthState,
    stats: RwLock<Option<CatalogStats>>,
}

impl SessionContext {
    pub fn new(auth: AuthState) -> Arc<Self> {
        Arc::new(Self {
            auth,
            stats: RwLock::new(None),
        })
    }

    /// Session that already passed the authentication gate
    pub fn authenticated(token: Option<String>) -> Arc<Self> {
        Self::new(AuthState::Authenticated { token })
    }

    pub fn anonymous() -> Arc<Self> {
        Self::new(AuthState::Anonymous)
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.auth, AuthState::Authenticated { .. })
    }

    /// Fail with `NotAuthenticated` unless the gate was passed
    pub fn require_authenticated(&self) -> Result<()> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(Error::NotAuthenticated)
        }
    }

    /// Last stats fetched via `refresh_stats`, if any
    pub async fn stats(&self) -> Option<CatalogStats> {
        self.stats.read().await.clone()
    }

    /// Fetch global stats and cache them on the session
    ///
    /// A failed fetch keeps the previously cached value.
    pub async fn refresh_stats(
        &self,
        catalog: &dyn CatalogService,
    ) -> std::result::Result<CatalogStats, CatalogError> {
        let stats = catalog.stats().await?;
        *self.stats.write().await = Some(stats.clone());
        tracing::debug!(count = stats.count, "Global stats refreshed");
        Ok(stats)
    }
}
