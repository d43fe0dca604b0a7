//! Query-parameter validation.
//!
//! Turns the raw query string of a listing request into a [`ListRequest`].
//! Validation never fails: malformed numbers, unknown sort values and broken
//! filter JSON are normalized to defaults or dropped.

use std::collections::{BTreeMap, HashMap};

use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::filter::FilterValue;
use super::resource::ResourceSpec;
use super::types::{
    AdvancedFilterClause, AdvancedFilterExpression, DEFAULT_LIMIT, DEFAULT_PAGE, DateInput,
    DateRangeFilter, FilterClause, FilterCondition, ListRequest, SortDirection,
};

/// Parameters that control paging rather than filtering.
const PAGING_KEYS: [&str; 3] = ["page", "limit", "export"];

/// Raw query parameters, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blank value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The filter and sort parameters without paging or export flags.
    pub fn filter_snapshot(&self) -> Self {
        let mut snapshot = self.clone();
        for key in PAGING_KEYS {
            snapshot.0.remove(key);
        }
        snapshot
    }
}

impl From<HashMap<String, String>> for QueryParams {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map.into_iter().collect())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Validate raw parameters for one resource.
///
/// Unknown keys are ignored. `tz` is used to type timestamp equality params.
pub fn validate(spec: &ResourceSpec, params: &QueryParams, tz: FixedOffset) -> ListRequest {
    let page = positive(params.get("page"), DEFAULT_PAGE);
    let limit = positive(params.get("limit"), DEFAULT_LIMIT);

    let sort_field = params.get("sortBy").map(str::to_string);
    let sort_direction = params.get("sortDirection").and_then(SortDirection::parse);

    let mut filters = Vec::new();
    equality_filters(spec, params, tz, &mut filters);
    date_filters(spec, params, &mut filters);
    if let Some(expr) = advanced_filter(params) {
        filters.push(FilterClause::Advanced(expr));
    }

    let export = matches!(params.get("export"), Some("true") | Some("1"));

    ListRequest {
        page,
        limit,
        sort_field,
        sort_direction,
        filters,
        export,
    }
}

/// Parse a positive integer, falling back on anything else.
fn positive(raw: Option<&str>, default: u32) -> u32 {
    raw.and_then(|v| v.parse::<i64>().ok())
        .filter(|v| *v >= 1)
        .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
        .unwrap_or(default)
}

fn equality_filters(
    spec: &ResourceSpec,
    params: &QueryParams,
    tz: FixedOffset,
    out: &mut Vec<FilterClause>,
) {
    for name in spec.equality_params {
        let (Some(raw), Some(field)) = (params.get(name), spec.field(name)) else {
            continue;
        };
        match FilterValue::parse(field.kind, raw, tz) {
            Some(value) => out.push(FilterClause::Equality {
                column: field.column,
                value,
            }),
            None => debug!(resource = spec.name, param = *name, raw, "ignoring unparseable filter"),
        }
    }
}

fn date_filters(spec: &ResourceSpec, params: &QueryParams, out: &mut Vec<FilterClause>) {
    for category in spec.date_categories {
        let date = |suffix: &str| {
            let key = category.param(suffix);
            let raw = params.get(&key)?;
            let parsed = DateInput::parse(raw);
            if parsed.is_none() {
                debug!(resource = spec.name, param = %key, raw, "ignoring unparseable date");
            }
            parsed
        };
        let from = date("from");
        let to = date("to");
        if from.is_none() && to.is_none() {
            continue;
        }

        out.push(FilterClause::DateRange(DateRangeFilter {
            category: category.prefix,
            column: category.column,
            from,
            to,
            time_from: params
                .get(&category.param("time_from"))
                .and_then(time_start),
            time_to: params.get(&category.param("time_to")).and_then(time_end),
        }));
    }
}

/// `advanced_filters` wins over legacy `filters` when both are usable.
fn advanced_filter(params: &QueryParams) -> Option<AdvancedFilterExpression> {
    let clauses = params
        .get("advanced_filters")
        .and_then(filter_clauses)
        .or_else(|| params.get("filters").and_then(filter_clauses))?;

    Some(AdvancedFilterExpression {
        clauses,
        condition: FilterCondition::parse(params.get("filter_condition")),
    })
}

/// Decode a JSON clause array, keeping only clauses with a value.
///
/// Malformed JSON fails open: it is logged and treated as no filter. An
/// entry that does not decode (an unknown operator, say) is dropped alone.
fn filter_clauses(raw: &str) -> Option<Vec<AdvancedFilterClause>> {
    let entries: Vec<serde_json::Value> = match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(error = %e, "ignoring malformed filter JSON");
            return None;
        }
    };
    let clauses: Vec<AdvancedFilterClause> = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<AdvancedFilterClause>(entry) {
            Ok(clause) => Some(clause),
            Err(e) => {
                debug!(error = %e, "dropping undecodable filter clause");
                None
            }
        })
        .filter(|c| c.value_text().is_some())
        .collect();
    (!clauses.is_empty()).then_some(clauses)
}

/// `HH:MM` or `HH:MM:SS`, at the start of that minute/second.
fn time_start(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

/// `HH:MM` or `HH:MM:SS`, at the last millisecond of that minute/second.
fn time_end(raw: &str) -> Option<NaiveTime> {
    use chrono::Timelike;

    if let Ok(t) = NaiveTime::parse_from_str(raw, "%H:%M:%S") {
        return NaiveTime::from_hms_milli_opt(t.hour(), t.minute(), t.second(), 999);
    }
    let t = NaiveTime::parse_from_str(raw, "%H:%M").ok()?;
    NaiveTime::from_hms_milli_opt(t.hour(), t.minute(), 59, 999)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::resource::Resource;
    use crate::listing::types::FilterOperator;

    fn tz() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        pairs.iter().copied().collect()
    }

    fn events(pairs: &[(&str, &str)]) -> ListRequest {
        validate(Resource::Events.spec(), &params(pairs), tz())
    }

    #[test]
    fn defaults_when_missing() {
        let req = events(&[]);
        assert_eq!(req.page, 1);
        assert_eq!(req.limit, 10);
        assert!(req.sort_field.is_none());
        assert!(req.sort_direction.is_none());
        assert!(req.filters.is_empty());
        assert!(!req.export);
    }

    #[test]
    fn bad_page_and_limit_fall_back() {
        for bad in ["0", "-3", "abc", "2.5", ""] {
            let req = events(&[("page", bad), ("limit", bad)]);
            assert_eq!(req.page, 1, "page={bad}");
            assert_eq!(req.limit, 10, "limit={bad}");
        }
        let req = events(&[("page", "4"), ("limit", "50")]);
        assert_eq!((req.page, req.limit), (4, 50));
    }

    #[test]
    fn invalid_direction_is_dropped() {
        let req = events(&[("sortBy", "event_name"), ("sortDirection", "up")]);
        assert_eq!(req.sort_field.as_deref(), Some("event_name"));
        assert!(req.sort_direction.is_none());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let req = events(&[("utm_hack", "1"), ("stage", "live")]);
        assert!(req.filters.is_empty());
    }

    #[test]
    fn equality_params_are_typed() {
        let req = events(&[("profession_id", "12"), ("funnel_id", "abc"), ("product_id", "")]);
        assert_eq!(
            req.filters,
            vec![FilterClause::Equality {
                column: "profession_id",
                value: FilterValue::Integer(12),
            }]
        );
    }

    #[test]
    fn malformed_json_means_no_filter() {
        let req = events(&[("advanced_filters", "[{not json")]);
        assert!(req.filters.is_empty());
    }

    #[test]
    fn all_blank_values_mean_no_filter() {
        let req = events(&[(
            "advanced_filters",
            r#"[{"field":"utm_source","operator":"equals","value":""},{"field":"event_name","operator":"contains","value":""}]"#,
        )]);
        assert!(req.filters.is_empty());
    }

    #[test]
    fn unknown_operator_drops_only_its_clause() {
        let req = events(&[(
            "advanced_filters",
            r#"[{"field":"event_name","operator":"equals","value":"Purchase"},{"field":"utm_source","operator":"is_empty","value":"x"}]"#,
        )]);
        let FilterClause::Advanced(expr) = &req.filters[0] else {
            panic!("expected advanced filter");
        };
        assert_eq!(expr.clauses.len(), 1);
        assert_eq!(expr.clauses[0].field, "event_name");
        assert_eq!(expr.clauses[0].operator, Some(FilterOperator::Equals));
    }

    #[test]
    fn advanced_filters_win_over_legacy() {
        let req = events(&[
            ("advanced_filters", r#"[{"field":"event_name","operator":"equals","value":"lead"}]"#),
            ("filters", r#"[{"id":"utm_source","value":"google"}]"#),
            ("filter_condition", "or"),
        ]);
        let FilterClause::Advanced(expr) = &req.filters[0] else {
            panic!("expected advanced filter");
        };
        assert_eq!(expr.clauses.len(), 1);
        assert_eq!(expr.clauses[0].field, "event_name");
        assert_eq!(expr.condition, FilterCondition::Or);
    }

    #[test]
    fn legacy_used_when_advanced_unusable() {
        let req = events(&[
            ("advanced_filters", "[]"),
            ("filters", r#"[{"id":"utm_source","value":"google"}]"#),
        ]);
        let FilterClause::Advanced(expr) = &req.filters[0] else {
            panic!("expected advanced filter");
        };
        assert_eq!(expr.clauses[0].field, "utm_source");
        assert_eq!(expr.condition, FilterCondition::And);
    }

    #[test]
    fn date_categories_are_independent() {
        let req = validate(
            Resource::Leads.spec(),
            &params(&[
                ("captacao_from", "2024-03-01"),
                ("captacao_to", "2024-03-31"),
                ("vendas_from", "2024-04-01"),
                ("pesquisa_from", "garbage"),
            ]),
            tz(),
        );
        let columns: Vec<&str> = req
            .filters
            .iter()
            .filter_map(|f| match f {
                FilterClause::DateRange(r) => Some(r.column),
                _ => None,
            })
            .collect();
        assert_eq!(columns, vec!["captured_at", "purchased_at"]);
    }

    #[test]
    fn time_bounds_are_parsed() {
        let req = events(&[
            ("from", "2024-03-01"),
            ("time_from", "08:30"),
            ("time_to", "18:00"),
        ]);
        let FilterClause::DateRange(range) = &req.filters[0] else {
            panic!("expected date range");
        };
        assert_eq!(range.time_from, NaiveTime::from_hms_opt(8, 30, 0));
        assert_eq!(range.time_to, NaiveTime::from_hms_milli_opt(18, 0, 59, 999));
    }

    #[test]
    fn export_flag() {
        assert!(events(&[("export", "true")]).export);
        assert!(!events(&[("export", "yes")]).export);
    }

    #[test]
    fn snapshot_drops_paging() {
        let p = params(&[("page", "3"), ("limit", "50"), ("export", "true"), ("from", "2024-01-01")]);
        let snapshot = p.filter_snapshot();
        assert_eq!(snapshot.get("from"), Some("2024-01-01"));
        assert!(snapshot.get("page").is_none());
        assert!(snapshot.get("export").is_none());
    }
}
