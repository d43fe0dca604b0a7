//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::listing::{ListingService, ListingSettings, ListingStore, PgListingStore};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Listing service for every resource endpoint.
    listings: Arc<ListingService>,

    /// Accepted bearer tokens; empty disables auth.
    api_tokens: Vec<String>,
}

impl AppState {
    /// Create new application state with a PostgreSQL-backed store.
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = db::create_pool(config)
            .await
            .context("failed to create database pool")?;
        info!(
            max_connections = config.database_max_connections,
            "connected to PostgreSQL"
        );

        let store = Arc::new(PgListingStore::new(pool, config.query_timeout));
        let settings = ListingSettings {
            timezone: config.utc_offset,
            export_max_rows: config.export_max_rows,
        };

        if config.api_tokens.is_empty() {
            info!("API_TOKENS not set; protected resources are open");
        }

        Ok(Self::with_store(store, settings, config.api_tokens.clone()))
    }

    /// Create state over any store.
    pub fn with_store(
        store: Arc<dyn ListingStore>,
        settings: ListingSettings,
        api_tokens: Vec<String>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                listings: ListingService::new(store, settings),
                api_tokens,
            }),
        }
    }

    pub fn listings(&self) -> &Arc<ListingService> {
        &self.inner.listings
    }

    pub fn api_tokens(&self) -> &[String] {
        &self.inner.api_tokens
    }

    /// Whether bearer authentication is enforced.
    pub fn auth_enabled(&self) -> bool {
        !self.inner.api_tokens.is_empty()
    }

    /// Check if the listing store is reachable.
    pub async fn storage_healthy(&self) -> bool {
        self.inner.listings.ping().await
    }
}
