//! Bearer token authentication middleware.
//!
//! Checks `Authorization: Bearer <token>` against the configured API tokens
//! and records the outcome in request extensions. It never rejects a request
//! itself: handlers decide, so a rejected listing still gets its envelope.

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use subtle::{Choice, ConstantTimeEq};
use tracing::debug;

use crate::state::AppState;

/// Outcome of bearer authentication for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BearerAuth {
    /// No tokens are configured.
    Disabled,

    /// No bearer token was sent.
    Missing,

    /// A bearer token was sent but matched none of the configured tokens.
    Invalid,

    /// A configured token was presented.
    Authenticated,
}

impl BearerAuth {
    /// Whether a protected resource may be served.
    pub fn permits(&self) -> bool {
        matches!(self, BearerAuth::Disabled | BearerAuth::Authenticated)
    }
}

/// Middleware to authenticate bearer API tokens.
pub async fn authenticate_bearer_token(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth = if !state.auth_enabled() {
        BearerAuth::Disabled
    } else {
        let token = request
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);

        match token {
            None => BearerAuth::Missing,
            Some(token) if token_matches(state.api_tokens(), token) => BearerAuth::Authenticated,
            Some(_) => {
                debug!("invalid bearer token");
                BearerAuth::Invalid
            }
        }
    };

    request.extensions_mut().insert(auth);
    next.run(request).await
}

/// Compare against every configured token without short-circuiting.
fn token_matches(tokens: &[String], presented: &str) -> bool {
    let matched = tokens.iter().fold(Choice::from(0), |acc, token| {
        acc | token.as_bytes().ct_eq(presented.as_bytes())
    });
    matched.into()
}
