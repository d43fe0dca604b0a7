//! Beta analytics kernel.
//!
//! Listing API server, listing query pipeline and bulk export. The server
//! entry point is the `beta` binary; `beta-export` drives exports from the
//! command line.

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod listing;
pub mod middleware;
pub mod records;
pub mod routes;
pub mod state;
pub mod view;

pub use config::Config;
pub use error::{ExportError, ListingError, SourceError, StoreError, ViewError};
pub use state::AppState;
