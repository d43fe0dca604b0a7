//! Listing pipeline types.
//!
//! Provides type definitions shared by every stage of a listing request:
//! - ListRequest: validated page, limit, sort request and filter clauses
//! - FilterClause: equality, date-range and advanced filter inputs
//! - ListResponse / ListMeta: the response envelope returned to clients

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use super::filter::FilterValue;
use super::pager;

/// Page used when the client sends none or garbage.
pub const DEFAULT_PAGE: u32 = 1;

/// Page size used when the client sends none or garbage.
pub const DEFAULT_LIMIT: u32 = 10;

/// Keys a listing envelope may carry its records under.
pub const ENVELOPE_KEYS: [&str; 4] = ["data", "items", "events", "users"];

/// Sort direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    /// Parse `asc`/`desc`, ignoring case. Anything else is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Boolean condition joining the clauses of an advanced filter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FilterCondition {
    #[default]
    And,
    Or,
}

impl FilterCondition {
    /// Parse `and`/`or`, ignoring case. Missing or unknown values mean AND.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|r| r.trim().to_ascii_lowercase()).as_deref() {
            Some("or") => Self::Or,
            _ => Self::And,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

/// Comparison operators available to advanced filters.
///
/// Which operators a field accepts depends on its kind; see
/// [`FieldKind::allows`](super::resource::FieldKind::allows).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Exact match.
    Equals,
    /// Not equal.
    NotEquals,
    /// Case-insensitive substring match.
    Contains,
    /// Negated case-insensitive substring match.
    NotContains,
    /// Case-insensitive prefix match.
    StartsWith,
    /// Case-insensitive suffix match.
    EndsWith,
    /// Greater than.
    GreaterThan,
    /// Less than.
    LessThan,
    /// Greater than or equal.
    GreaterOrEqual,
    /// Less than or equal.
    LessOrEqual,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::GreaterOrEqual => "greater_or_equal",
            Self::LessOrEqual => "less_or_equal",
        }
    }
}

/// One field/operator/value triple of an advanced filter.
///
/// The legacy `filters` parameter sends `{id, value}` objects, so `id` is
/// accepted for `field` and the operator is optional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdvancedFilterClause {
    #[serde(alias = "id")]
    pub field: String,

    #[serde(default)]
    pub operator: Option<FilterOperator>,

    #[serde(default)]
    pub value: serde_json::Value,
}

impl AdvancedFilterClause {
    /// The clause value as trimmed text, or `None` when it is blank.
    pub fn value_text(&self) -> Option<String> {
        let text = match &self.value {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    }
}

/// A flat list of clauses joined by a single condition.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvancedFilterExpression {
    pub clauses: Vec<AdvancedFilterClause>,
    pub condition: FilterCondition,
}

/// A date boundary as supplied by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateInput {
    /// Calendar day with no time; expanded to day boundaries.
    Day(NaiveDate),
    /// Wall-clock time without offset; interpreted in the listing timezone.
    Local(NaiveDateTime),
    /// Instant with an explicit UTC offset; used as is.
    Instant(DateTime<FixedOffset>),
}

impl DateInput {
    /// Parse `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM[:SS]` or RFC 3339.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
            return Some(Self::Instant(instant));
        }
        if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Some(Self::Day(day));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(Self::Local)
    }
}

/// One named date category (e.g. capture date) bounded by from/to.
#[derive(Debug, Clone, PartialEq)]
pub struct DateRangeFilter {
    /// Query-parameter prefix; empty for the plain `from`/`to` pair.
    pub category: &'static str,

    /// Backing column.
    pub column: &'static str,

    pub from: Option<DateInput>,
    pub to: Option<DateInput>,

    /// Time of day applied to a day-only `from`.
    pub time_from: Option<NaiveTime>,

    /// Time of day applied to a day-only `to`.
    pub time_to: Option<NaiveTime>,
}

/// A single filter input after validation.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterClause {
    /// Exact match on an allow-listed column.
    Equality {
        column: &'static str,
        value: FilterValue,
    },
    /// Closed date interval on one category.
    DateRange(DateRangeFilter),
    /// User-built clause list.
    Advanced(AdvancedFilterExpression),
}

/// A validated listing request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListRequest {
    /// 1-indexed page.
    pub page: u32,

    /// Items per page.
    pub limit: u32,

    /// Requested sort field, not yet checked against the allow-list.
    pub sort_field: Option<String>,

    /// Requested direction; `None` when missing or invalid.
    pub sort_direction: Option<SortDirection>,

    /// Filter clauses, AND'ed together.
    pub filters: Vec<FilterClause>,

    /// Whether the client asked for the full filtered set in one response.
    pub export: bool,
}

impl Default for ListRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            sort_field: None,
            sort_direction: None,
            filters: Vec::new(),
            export: false,
        }
    }
}

/// Metadata describing one listing response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListMeta {
    /// Count of rows matching the filters (before paging).
    pub total: u64,

    /// Current page number (1-indexed).
    pub page: u32,

    /// Items per page.
    pub limit: u32,

    /// Last page number; at least 1.
    pub last_page: u32,

    /// Effective sort field after allow-list resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,

    /// Effective sort direction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_direction: Option<SortDirection>,

    /// Fields the client may sort by.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub valid_sort_fields: Vec<String>,
}

impl ListMeta {
    /// Create metadata with paging calculations.
    pub fn new(total: u64, page: u32, limit: u32) -> Self {
        Self {
            total,
            page,
            limit,
            last_page: pager::last_page(total, limit),
            sort_by: None,
            sort_direction: None,
            valid_sort_fields: Vec::new(),
        }
    }

    /// Whether there's a page after this one.
    pub fn has_next(&self) -> bool {
        self.page < self.last_page
    }
}

/// Result of executing a listing query.
#[derive(Debug, Clone, PartialEq)]
pub struct ListResponse {
    /// Records in resolved sort order.
    pub items: Vec<serde_json::Value>,
    pub meta: ListMeta,
}

impl ListResponse {
    /// Create an empty result.
    pub fn empty(page: u32, limit: u32) -> Self {
        Self {
            items: Vec::new(),
            meta: ListMeta::new(0, page, limit),
        }
    }

    /// Wrap the response under a resource-specific key.
    pub fn into_envelope(self, key: &'static str) -> Envelope {
        Envelope {
            key,
            response: self,
        }
    }

    /// Read an envelope produced by any listing endpoint.
    ///
    /// Records may sit under any of [`ENVELOPE_KEYS`]; `meta` is required.
    pub fn from_envelope(mut body: serde_json::Value) -> Option<Self> {
        let object = body.as_object_mut()?;
        let meta: ListMeta = serde_json::from_value(object.remove("meta")?).ok()?;
        let items = ENVELOPE_KEYS
            .iter()
            .find_map(|key| match object.remove(*key) {
                Some(serde_json::Value::Array(items)) => Some(items),
                _ => None,
            })?;
        Some(Self { items, meta })
    }
}

/// Serialized form of a [`ListResponse`]: `{ <key>: [...], meta: {...} }`.
#[derive(Debug, Clone)]
pub struct Envelope {
    key: &'static str,
    response: ListResponse,
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(self.key, &self.response.items)?;
        map.serialize_entry("meta", &self.response.meta)?;
        map.end()
    }
}
