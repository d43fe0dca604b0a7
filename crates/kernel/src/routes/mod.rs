//! HTTP route handlers.

pub mod health;
pub mod listing;

use axum::Router;

use crate::state::AppState;

/// Every route with bearer authentication applied.
///
/// CORS and tracing layers are added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(listing::router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::authenticate_bearer_token,
        ))
        .with_state(state)
}
