//! Storage boundary for listing queries.
//!
//! The service hands a store one [`StoreQuery`] and gets back the page rows
//! plus the total under the same predicate. [`PgListingStore`] is the
//! PostgreSQL implementation.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use super::filter::Predicate;
use super::query_builder::ListingQueryBuilder;
use super::resource::ResourceSpec;
use super::sort::ResolvedSort;
use crate::error::StoreResult;

/// One filtered, sorted page window.
#[derive(Debug, Clone, Copy)]
pub struct StoreQuery<'a> {
    pub resource: &'a ResourceSpec,
    pub predicate: &'a Predicate,
    pub sort: &'a ResolvedSort,
    pub offset: u64,
    pub limit: u64,
}

/// Rows for a window plus the unpaginated total.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorePage {
    pub rows: Vec<serde_json::Value>,
    pub total: u64,
}

/// Query layer consumed by the listing service.
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Fetch one window and the count of all matching rows.
    async fn fetch(&self, query: StoreQuery<'_>) -> StoreResult<StorePage>;

    /// Whether the backing store is reachable.
    async fn ping(&self) -> bool;
}

/// PostgreSQL-backed store.
pub struct PgListingStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgListingStore {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }
}

#[async_trait]
impl ListingStore for PgListingStore {
    async fn fetch(&self, query: StoreQuery<'_>) -> StoreResult<StorePage> {
        let builder = ListingQueryBuilder::new(query.resource, query.predicate, query.sort);

        // Count and rows run in one read-only snapshot.
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let timeout_ms = self.statement_timeout.as_millis();
        sqlx::query(&format!("SET LOCAL statement_timeout = {timeout_ms}"))
            .execute(&mut *tx)
            .await?;

        let count_sql = builder.build_count();
        let total: i64 = sqlx::query_scalar(&count_sql).fetch_one(&mut *tx).await?;
        let total = u64::try_from(total).unwrap_or(0);

        let rows: Vec<serde_json::Value> = if query.offset < total {
            let main_sql = builder.build(query.offset, query.limit);
            sqlx::query_scalar(&main_sql)
                .fetch_all(&mut *tx)
                .await?
        } else {
            Vec::new()
        };

        tx.commit().await?;

        Ok(StorePage { rows, total })
    }

    async fn ping(&self) -> bool {
        crate::db::check_health(&self.pool).await
    }
}
