//! Listing API routes.
//!
//! `GET /api/{resource}` for every listable resource. Success and failure
//! both return the `{ <key>: [...], meta: {...} }` envelope; failures differ
//! only in status code.

use std::collections::HashMap;

use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use tracing::debug;

use crate::error::ListingError;
use crate::listing::types::{DEFAULT_LIMIT, DEFAULT_PAGE};
use crate::listing::{ListResponse, QueryParams, Resource};
use crate::middleware::BearerAuth;
use crate::state::AppState;

/// Create the listing router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/{resource}", get(list_resource))
}

async fn list_resource(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    auth: Option<Extension<BearerAuth>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Ok(resource) = resource.parse::<Resource>() else {
        debug!(resource = %resource, "unknown listing resource");
        let error = ListingError::UnknownResource(resource);
        let envelope = ListResponse::empty(DEFAULT_PAGE, DEFAULT_LIMIT).into_envelope("data");
        return (error.status(), Json(envelope)).into_response();
    };

    let service = state.listings();
    let params = QueryParams::from(params);
    let request = service.validate(resource, &params);
    let key = resource.spec().envelope_key;

    let auth = match auth {
        Some(Extension(auth)) => auth,
        None if state.auth_enabled() => BearerAuth::Missing,
        None => BearerAuth::Disabled,
    };
    if resource.spec().protected && !auth.permits() {
        debug!(resource = %resource, ?auth, "listing rejected: unauthorized");
        let failure = service.reject(resource, &request, ListingError::Unauthorized);
        return (
            failure.error.status(),
            [(header::WWW_AUTHENTICATE, "Bearer")],
            Json(failure.response.into_envelope(key)),
        )
            .into_response();
    }

    match service.list(resource, &request).await {
        Ok(response) => (StatusCode::OK, Json(response.into_envelope(key))).into_response(),
        Err(failure) => (
            failure.error.status(),
            Json(failure.response.into_envelope(key)),
        )
            .into_response(),
    }
}
