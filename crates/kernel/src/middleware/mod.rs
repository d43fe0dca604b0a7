//! HTTP middleware components.

pub mod bearer_auth;

pub use bearer_auth::{BearerAuth, authenticate_bearer_token};
