//! Listing service.
//!
//! Composes validation, filter compilation, sort resolution and pagination
//! into one store call per request. Every failure is converted into an empty
//! envelope paired with an error; no storage error escapes unconverted.

use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc};
use tracing::{debug, error};

use super::filter;
use super::pager;
use super::params::{self, QueryParams};
use super::resource::{Resource, ResourceSpec};
use super::sort::{self, ResolvedSort};
use super::store::{ListingStore, StoreQuery};
use super::types::{ListMeta, ListRequest, ListResponse};
use crate::error::ListingError;

/// Default row cap for `export=true` requests.
pub const DEFAULT_EXPORT_MAX_ROWS: u32 = 10_000;

/// Tunables for the listing pipeline.
#[derive(Debug, Clone, Copy)]
pub struct ListingSettings {
    /// Fixed timezone date filters are interpreted in.
    pub timezone: FixedOffset,

    /// Most rows a single `export=true` response may carry.
    pub export_max_rows: u32,
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            timezone: FixedOffset::west_opt(3 * 3600).unwrap_or_else(|| Utc.fix()),
            export_max_rows: DEFAULT_EXPORT_MAX_ROWS,
        }
    }
}

/// A failed listing: the error plus the envelope to return in its place.
#[derive(Debug)]
pub struct ListingFailure {
    pub error: ListingError,
    pub response: ListResponse,
}

/// Service for executing listing queries.
pub struct ListingService {
    store: Arc<dyn ListingStore>,
    settings: ListingSettings,
}

impl ListingService {
    /// Create a new ListingService.
    pub fn new(store: Arc<dyn ListingStore>, settings: ListingSettings) -> Arc<Self> {
        Arc::new(Self { store, settings })
    }

    /// Validate raw query parameters for a resource.
    pub fn validate(&self, resource: Resource, params: &QueryParams) -> ListRequest {
        params::validate(resource.spec(), params, self.settings.timezone)
    }

    /// Execute a validated request.
    pub async fn list(
        &self,
        resource: Resource,
        request: &ListRequest,
    ) -> Result<ListResponse, ListingFailure> {
        let spec = resource.spec();
        let sort = resolve_sort(spec, request);
        let predicate = filter::compile(spec, &request.filters, self.settings.timezone);
        let (page, limit) = self.window(request);

        let query = StoreQuery {
            resource: spec,
            predicate: &predicate,
            sort: &sort,
            offset: pager::offset(page, limit),
            limit: u64::from(limit),
        };

        match self.store.fetch(query).await {
            Ok(result) => {
                debug!(
                    resource = spec.name,
                    page,
                    limit,
                    total = result.total,
                    rows = result.rows.len(),
                    "listing executed"
                );
                Ok(ListResponse {
                    items: result.rows,
                    meta: meta(spec, &sort, result.total, page, limit),
                })
            }
            Err(e) => {
                error!(resource = spec.name, page, limit, error = %e, "listing query failed");
                Err(self.reject(resource, request, ListingError::Store(e)))
            }
        }
    }

    /// Pair an error with the empty envelope for this resource/request.
    pub fn reject(
        &self,
        resource: Resource,
        request: &ListRequest,
        error: ListingError,
    ) -> ListingFailure {
        let spec = resource.spec();
        let sort = resolve_sort(spec, request);
        let (page, limit) = self.window(request);

        ListingFailure {
            error,
            response: ListResponse {
                items: Vec::new(),
                meta: meta(spec, &sort, 0, page, limit),
            },
        }
    }

    /// Whether the store is reachable.
    pub async fn ping(&self) -> bool {
        self.store.ping().await
    }

    /// Page and limit actually used; export asks for everything up to the cap.
    fn window(&self, request: &ListRequest) -> (u32, u32) {
        if request.export {
            (1, self.settings.export_max_rows.max(1))
        } else {
            (request.page, request.limit)
        }
    }
}

fn resolve_sort(spec: &'static ResourceSpec, request: &ListRequest) -> ResolvedSort {
    sort::resolve(
        request.sort_field.as_deref(),
        request.sort_direction,
        spec.sort_fields,
        spec.default_sort,
    )
}

fn meta(spec: &ResourceSpec, sort: &ResolvedSort, total: u64, page: u32, limit: u32) -> ListMeta {
    ListMeta {
        sort_by: Some(sort.field.to_string()),
        sort_direction: Some(sort.direction),
        valid_sort_fields: spec.valid_sort_fields(),
        ..ListMeta::new(total, page, limit)
    }
}
