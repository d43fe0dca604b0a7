//! Page sources for bulk exports.
//!
//! A [`PageSource`] performs one listing call for a query-parameter snapshot
//! and returns the decoded envelope. The orchestrator only ever talks to this
//! trait, so the same export logic runs against a remote server
//! ([`HttpPageSource`]) or an in-process [`ListingService`]
//! ([`ServicePageSource`]).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use crate::error::{ListingError, SourceError};
use crate::listing::{ListResponse, ListingService, QueryParams, Resource};

/// One listing call.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(
        &self,
        resource: Resource,
        params: &QueryParams,
    ) -> Result<ListResponse, SourceError>;
}

/// Listing endpoints reached over HTTP.
#[derive(Clone)]
pub struct HttpPageSource {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpPageSource {
    /// Create a source for the server at `base_url`.
    ///
    /// `token` is sent as a bearer token on every request.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, SourceError> {
        let mut base_url = Url::parse(base_url)?;
        // Url::join replaces the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Endpoint URL for a resource.
    pub fn endpoint(&self, resource: Resource) -> Result<Url, SourceError> {
        Ok(self.base_url.join(&format!("api/{resource}"))?)
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(
        &self,
        resource: Resource,
        params: &QueryParams,
    ) -> Result<ListResponse, SourceError> {
        let url = self.endpoint(resource)?;
        let query: Vec<(&str, &str)> = params.iter().collect();

        let mut request = self.client.get(url).query(&query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(resource = %resource, status = status.as_u16(), "listing page fetched");

        if status == StatusCode::UNAUTHORIZED {
            return Err(SourceError::Unauthorized);
        }
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body: serde_json::Value = response.json().await?;
        ListResponse::from_envelope(body).ok_or(SourceError::Decode)
    }
}

/// Listing service called in-process.
#[derive(Clone)]
pub struct ServicePageSource {
    service: Arc<ListingService>,
}

impl ServicePageSource {
    pub fn new(service: Arc<ListingService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl PageSource for ServicePageSource {
    async fn fetch_page(
        &self,
        resource: Resource,
        params: &QueryParams,
    ) -> Result<ListResponse, SourceError> {
        let request = self.service.validate(resource, params);
        self.service
            .list(resource, &request)
            .await
            .map_err(|failure| match failure.error {
                ListingError::Unauthorized => SourceError::Unauthorized,
                other => SourceError::Status(other.status().as_u16()),
            })
    }
}
