//! Listing query pipeline.
//!
//! This module provides:
//! - params: raw query parameters validated into a ListRequest
//! - filter: filter clauses compiled into a backend-agnostic Predicate
//! - sort / pager: allow-listed sort resolution and pagination math
//! - ListingService: one store call per request, errors converted to envelopes
//! - ListingQueryBuilder / PgListingStore: SeaQuery SQL over PostgreSQL

pub mod filter;
pub mod pager;
pub mod params;
mod query_builder;
pub mod resource;
mod service;
pub mod sort;
mod store;
pub mod types;

pub use filter::{Comparison, FilterValue, Predicate};
pub use params::QueryParams;
pub use query_builder::ListingQueryBuilder;
pub use resource::{FieldKind, Resource, ResourceSpec};
pub use service::{DEFAULT_EXPORT_MAX_ROWS, ListingFailure, ListingService, ListingSettings};
pub use sort::ResolvedSort;
pub use store::{ListingStore, PgListingStore, StorePage, StoreQuery};
pub use types::{
    AdvancedFilterClause, AdvancedFilterExpression, Envelope, FilterClause, FilterCondition,
    FilterOperator, ListMeta, ListRequest, ListResponse, SortDirection,
};
