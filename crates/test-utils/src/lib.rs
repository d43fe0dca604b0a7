//! Test helpers for the Beta kernel.
//!
//! [`MemoryStore`] evaluates compiled predicates over JSON rows the way the
//! PostgreSQL store does, so listing and export behavior can be tested
//! without a database. [`RecordingSource`] wraps a page source and logs
//! every request it forwards.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};

use beta_kernel::AppState;
use beta_kernel::error::{SourceError, StoreError, StoreResult};
use beta_kernel::export::PageSource;
use beta_kernel::listing::{
    Comparison, FilterValue, ListResponse, ListingService, ListingSettings, ListingStore,
    Predicate, QueryParams, Resource, SortDirection, StorePage, StoreQuery,
};

/// One window the store was asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub table: &'static str,
    pub sort_column: &'static str,
    pub direction: SortDirection,
    pub offset: u64,
    pub limit: u64,
}

/// In-memory [`ListingStore`] keyed by table name.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<&'static str, Vec<Value>>>,
    failure: Mutex<Option<String>>,
    calls: Mutex<Vec<FetchCall>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: seed the table backing `resource`.
    pub fn with_rows(self, resource: Resource, rows: Vec<Value>) -> Self {
        self.insert(resource, rows);
        self
    }

    /// Append rows to the table backing `resource`.
    pub fn insert(&self, resource: Resource, rows: Vec<Value>) {
        self.tables
            .write()
            .entry(resource.spec().table)
            .or_default()
            .extend(rows);
    }

    /// Make every following fetch fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    /// Windows requested so far, oldest first.
    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().clone()
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl ListingStore for MemoryStore {
    async fn fetch(&self, query: StoreQuery<'_>) -> StoreResult<StorePage> {
        self.calls.lock().push(FetchCall {
            table: query.resource.table,
            sort_column: query.sort.column,
            direction: query.sort.direction,
            offset: query.offset,
            limit: query.limit,
        });

        if let Some(message) = self.failure.lock().clone() {
            return Err(StoreError::Unavailable(message));
        }

        let tables = self.tables.read();
        let mut rows: Vec<Value> = tables
            .get(query.resource.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches(query.predicate, row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let id_column = query.resource.id_column;
        let sort_column = query.sort.column;
        rows.sort_by(|a, b| {
            let ordering = compare_cells(a.get(sort_column), b.get(sort_column))
                .then_with(|| compare_cells(a.get(id_column), b.get(id_column)));
            match query.sort.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let total = rows.len() as u64;
        let rows = rows
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(query.limit).unwrap_or(usize::MAX))
            .collect();

        Ok(StorePage { rows, total })
    }

    async fn ping(&self) -> bool {
        self.failure.lock().is_none()
    }
}

/// Whether `row` satisfies `predicate`. Missing and null cells never match,
/// as with SQL NULL.
pub fn matches(predicate: &Predicate, row: &Value) -> bool {
    match predicate {
        Predicate::Always => true,
        Predicate::Compare { column, op, value } => row
            .get(*column)
            .filter(|cell| !cell.is_null())
            .is_some_and(|cell| compare(cell, *op, value)),
        Predicate::Between { column, from, to } => row
            .get(*column)
            .and_then(instant)
            .is_some_and(|at| *from <= at && at <= *to),
        Predicate::All(parts) => parts.iter().all(|part| matches(part, row)),
        Predicate::Any(parts) => parts.iter().any(|part| matches(part, row)),
    }
}

fn compare(cell: &Value, op: Comparison, value: &FilterValue) -> bool {
    match op {
        Comparison::Contains | Comparison::NotContains | Comparison::StartsWith | Comparison::EndsWith => {
            let haystack = text(cell).to_lowercase();
            let needle = needle(value);
            match op {
                Comparison::Contains => haystack.contains(&needle),
                Comparison::NotContains => !haystack.contains(&needle),
                Comparison::StartsWith => haystack.starts_with(&needle),
                _ => haystack.ends_with(&needle),
            }
        }
        _ => {
            let Some(ordering) = order_against(cell, value) else {
                return false;
            };
            match op {
                Comparison::Eq => ordering == Ordering::Equal,
                Comparison::Ne => ordering != Ordering::Equal,
                Comparison::Gt => ordering == Ordering::Greater,
                Comparison::Lt => ordering == Ordering::Less,
                Comparison::Gte => ordering != Ordering::Less,
                _ => ordering != Ordering::Greater,
            }
        }
    }
}

/// Order of `cell` relative to a filter value, typed by the filter value.
fn order_against(cell: &Value, value: &FilterValue) -> Option<Ordering> {
    match value {
        FilterValue::Text(expected) => Some(text(cell).as_str().cmp(expected.as_str())),
        FilterValue::Integer(expected) => {
            let actual = match cell {
                Value::Number(n) => n.as_i64()?,
                Value::String(s) => s.trim().parse().ok()?,
                _ => return None,
            };
            Some(actual.cmp(expected))
        }
        FilterValue::Boolean(expected) => {
            let actual = match cell {
                Value::Bool(b) => *b,
                Value::String(s) => s.parse().ok()?,
                _ => return None,
            };
            Some(actual.cmp(expected))
        }
        FilterValue::Instant(expected) => Some(instant(cell)?.cmp(expected)),
    }
}

fn needle(value: &FilterValue) -> String {
    match value {
        FilterValue::Text(s) => s.to_lowercase(),
        FilterValue::Integer(i) => i.to_string(),
        FilterValue::Boolean(b) => b.to_string(),
        FilterValue::Instant(t) => t.to_rfc3339(),
    }
}

fn text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn instant(cell: &Value) -> Option<DateTime<Utc>> {
    cell.as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Ascending cell order; nulls sort after every value.
fn compare_cells(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => match (instant(a), instant(b)) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => text(a).cmp(&text(b)),
            },
        },
    }
}

/// Page source that forwards to another and records each request.
pub struct RecordingSource {
    inner: Arc<dyn PageSource>,
    requests: Mutex<Vec<QueryParams>>,
    failures_left: AtomicUsize,
    fail_direct: bool,
}

impl RecordingSource {
    pub fn new(inner: Arc<dyn PageSource>) -> Self {
        Self {
            inner,
            requests: Mutex::new(Vec::new()),
            failures_left: AtomicUsize::new(0),
            fail_direct: false,
        }
    }

    /// Fail the next `count` paginated requests with a 503.
    pub fn failing_pages(self, count: usize) -> Self {
        self.failures_left.store(count, AtomicOrdering::SeqCst);
        self
    }

    /// Fail every `export=true` request with a 504.
    pub fn failing_direct(mut self) -> Self {
        self.fail_direct = true;
        self
    }

    /// Every request seen, oldest first.
    pub fn requests(&self) -> Vec<QueryParams> {
        self.requests.lock().clone()
    }

    /// Page numbers of the paginated requests, in order.
    pub fn pages_requested(&self) -> Vec<u32> {
        self.requests
            .lock()
            .iter()
            .filter(|params| params.get("export").is_none())
            .filter_map(|params| params.get("page").and_then(|p| p.parse().ok()))
            .collect()
    }
}

#[async_trait]
impl PageSource for RecordingSource {
    async fn fetch_page(
        &self,
        resource: Resource,
        params: &QueryParams,
    ) -> Result<ListResponse, SourceError> {
        self.requests.lock().push(params.clone());

        let direct = params.get("export").is_some();
        if direct && self.fail_direct {
            return Err(SourceError::Status(504));
        }
        if !direct
            && self
                .failures_left
                .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(SourceError::Status(503));
        }

        self.inner.fetch_page(resource, params).await
    }
}

/// Listing settings pinned to São Paulo time with the default export cap.
pub fn test_settings() -> ListingSettings {
    ListingSettings::default()
}

/// Listing service over `store`.
pub fn test_service(store: Arc<MemoryStore>, settings: ListingSettings) -> Arc<ListingService> {
    ListingService::new(store, settings)
}

/// Application state over `store` with the given bearer tokens.
pub fn test_state(store: Arc<MemoryStore>, api_tokens: &[&str]) -> AppState {
    AppState::with_store(
        store,
        test_settings(),
        api_tokens.iter().map(|t| t.to_string()).collect(),
    )
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// `YYYY-MM-DDTHH:MM:SSZ` for `base + offset`.
pub fn timestamp(offset: Duration) -> String {
    (base_time() + offset).format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// `count` events one hour apart starting 2024-03-01 12:00 UTC, alternating
/// between two professions and carrying nested UTM data on odd rows.
pub fn event_rows(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            let mut row = json!({
                "event_id": format!("evt-{i:05}"),
                "event_name": if i % 3 == 0 { "PageView" } else { "Lead" },
                "event_time": timestamp(Duration::hours(i as i64)),
                "event_source": "web",
                "event_type": "track",
                "session_id": format!("sess-{}", i / 4),
                "user_id": format!("user-{}", i % 7),
                "profession_id": 1 + (i % 2) as i64,
                "product_id": 10,
                "funnel_id": 3,
                "country": "BR",
                "state": "SP",
                "city": "São Paulo",
            });
            if i % 2 == 1 {
                row["utm_data"] = json!({ "utm_source": "google", "utm_medium": "cpc" });
            } else {
                row["utm_source"] = json!("newsletter");
            }
            row
        })
        .collect()
}

/// `count` leads created one day apart, the first one on 2024-03-01.
pub fn lead_rows(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            json!({
                "lead_id": format!("lead-{i:05}"),
                "name": format!("Lead {i}"),
                "email": format!("lead{i}@example.com"),
                "phone": null,
                "created_at": timestamp(Duration::days(i as i64)),
                "captured_at": timestamp(Duration::days(i as i64)),
                "survey_answered_at": null,
                "purchased_at": null,
                "profession_id": 1 + (i % 3) as i64,
                "funnel_id": 4,
                "utm_source": "facebook",
                "utm_campaign": null,
                "is_client": i % 5 == 0,
            })
        })
        .collect()
}

/// `count` professions created one day apart, ids starting at 1.
pub fn profession_rows(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            json!({
                "profession_id": i as i64 + 1,
                "profession_name": format!("Profession {:02}", i + 1),
                "meta_pixel": format!("px-{}", i + 1),
                "meta_token": null,
                "created_at": timestamp(Duration::days(i as i64)),
            })
        })
        .collect()
}

/// `count` professions sharing one `created_at`, for tiebreak tests.
pub fn tied_profession_rows(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            json!({
                "profession_id": i as i64 + 1,
                "profession_name": format!("Profession {:03}", i + 1),
                "meta_pixel": null,
                "created_at": timestamp(Duration::zero()),
            })
        })
        .collect()
}
