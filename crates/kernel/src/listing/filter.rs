//! Filter compilation.
//!
//! Turns validated [`FilterClause`]s into a backend-agnostic [`Predicate`]
//! tree. Date inputs without an explicit offset are expanded to day
//! boundaries in the listing timezone before conversion to UTC instants.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use tracing::debug;

use super::resource::{FieldKind, FieldSpec, ResourceSpec};
use super::types::{
    AdvancedFilterClause, AdvancedFilterExpression, DateInput, DateRangeFilter, FilterClause,
    FilterCondition, FilterOperator,
};

/// Typed comparison value.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Instant(DateTime<Utc>),
}

impl FilterValue {
    /// Parse a raw parameter for a field of the given kind.
    ///
    /// Blank or unparseable input yields `None`; such filters are omitted
    /// rather than matched against NULL or zero.
    pub fn parse(kind: FieldKind, raw: &str, tz: FixedOffset) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match kind {
            FieldKind::Text => Some(Self::Text(raw.to_string())),
            FieldKind::Integer => raw.parse().ok().map(Self::Integer),
            FieldKind::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" => Some(Self::Boolean(true)),
                "false" | "0" => Some(Self::Boolean(false)),
                _ => None,
            },
            FieldKind::Timestamp => DateInput::parse(raw)
                .and_then(|d| start_of(&d, tz))
                .map(Self::Instant),
        }
    }
}

/// Comparison applied by a [`Predicate::Compare`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    /// Case-insensitive substring.
    Contains,
    NotContains,
    /// Case-insensitive prefix.
    StartsWith,
    /// Case-insensitive suffix.
    EndsWith,
}

impl From<FilterOperator> for Comparison {
    fn from(op: FilterOperator) -> Self {
        match op {
            FilterOperator::Equals => Comparison::Eq,
            FilterOperator::NotEquals => Comparison::Ne,
            FilterOperator::Contains => Comparison::Contains,
            FilterOperator::NotContains => Comparison::NotContains,
            FilterOperator::StartsWith => Comparison::StartsWith,
            FilterOperator::EndsWith => Comparison::EndsWith,
            FilterOperator::GreaterThan => Comparison::Gt,
            FilterOperator::LessThan => Comparison::Lt,
            FilterOperator::GreaterOrEqual => Comparison::Gte,
            FilterOperator::LessOrEqual => Comparison::Lte,
        }
    }
}

/// Backend-agnostic filter tree.
///
/// Column names in the tree always come from a [`ResourceSpec`], never from
/// client input.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row.
    Always,
    Compare {
        column: &'static str,
        op: Comparison,
        value: FilterValue,
    },
    /// Closed interval `from <= column <= to`.
    Between {
        column: &'static str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

impl Predicate {
    /// AND the parts together, collapsing trivial cases.
    pub fn all(parts: Vec<Predicate>) -> Predicate {
        let mut parts: Vec<Predicate> = parts.into_iter().filter(|p| !p.is_always()).collect();
        match parts.len() {
            0 => Predicate::Always,
            1 => parts.pop().unwrap_or(Predicate::Always),
            _ => Predicate::All(parts),
        }
    }

    /// OR the parts together. An empty list means no filter, not "nothing".
    pub fn any(mut parts: Vec<Predicate>) -> Predicate {
        if parts.is_empty() || parts.iter().any(Predicate::is_always) {
            return Predicate::Always;
        }
        if parts.len() == 1 {
            return parts.pop().unwrap_or(Predicate::Always);
        }
        Predicate::Any(parts)
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Predicate::Always)
    }
}

/// Compile every clause of a request, AND'ed across categories.
pub fn compile(spec: &ResourceSpec, filters: &[FilterClause], tz: FixedOffset) -> Predicate {
    Predicate::all(
        filters
            .iter()
            .filter_map(|clause| compile_clause(spec, clause, tz))
            .collect(),
    )
}

fn compile_clause(spec: &ResourceSpec, clause: &FilterClause, tz: FixedOffset) -> Option<Predicate> {
    match clause {
        FilterClause::Equality { column, value } => Some(Predicate::Compare {
            column: *column,
            op: Comparison::Eq,
            value: value.clone(),
        }),
        FilterClause::DateRange(range) => {
            let (from, to) = date_interval(range, tz)?;
            Some(Predicate::Between {
                column: range.column,
                from,
                to,
            })
        }
        FilterClause::Advanced(expr) => Some(compile_advanced(spec, expr, tz)),
    }
}

/// Compile an advanced expression, joining valid clauses uniformly.
pub fn compile_advanced(
    spec: &ResourceSpec,
    expr: &AdvancedFilterExpression,
    tz: FixedOffset,
) -> Predicate {
    let parts: Vec<Predicate> = expr
        .clauses
        .iter()
        .filter_map(|clause| compile_advanced_clause(spec, clause, tz))
        .collect();

    if parts.is_empty() {
        return Predicate::Always;
    }
    match expr.condition {
        FilterCondition::And => Predicate::all(parts),
        FilterCondition::Or => Predicate::any(parts),
    }
}

fn compile_advanced_clause(
    spec: &ResourceSpec,
    clause: &AdvancedFilterClause,
    tz: FixedOffset,
) -> Option<Predicate> {
    let Some(field) = spec.field(&clause.field) else {
        debug!(resource = spec.name, field = %clause.field, "dropping filter on unknown field");
        return None;
    };
    let op = clause
        .operator
        .unwrap_or_else(|| field.kind.default_operator());
    if !field.kind.allows(op) {
        debug!(
            resource = spec.name,
            field = field.name,
            operator = op.as_str(),
            "dropping filter with unsupported operator"
        );
        return None;
    }
    let raw = clause.value_text()?;

    if field.kind == FieldKind::Timestamp {
        return compile_timestamp_clause(field, op, &raw, tz);
    }

    let value = FilterValue::parse(field.kind, &raw, tz)?;
    Some(Predicate::Compare {
        column: field.column,
        op: op.into(),
        value,
    })
}

/// Day-aligned comparison: `equals` covers the whole day, `>` starts after
/// it, `<` ends before it.
fn compile_timestamp_clause(
    field: &FieldSpec,
    op: FilterOperator,
    raw: &str,
    tz: FixedOffset,
) -> Option<Predicate> {
    let input = DateInput::parse(raw)?;
    let start = start_of(&input, tz)?;
    let end = end_of(&input, tz)?;

    let compare = |op: Comparison, instant: DateTime<Utc>| Predicate::Compare {
        column: field.column,
        op,
        value: FilterValue::Instant(instant),
    };

    match op {
        FilterOperator::Equals => Some(Predicate::Between {
            column: field.column,
            from: start,
            to: end,
        }),
        FilterOperator::GreaterThan => Some(compare(Comparison::Gt, end)),
        FilterOperator::LessThan => Some(compare(Comparison::Lt, start)),
        FilterOperator::GreaterOrEqual => Some(compare(Comparison::Gte, start)),
        FilterOperator::LessOrEqual => Some(compare(Comparison::Lte, end)),
        _ => None,
    }
}

/// Closed UTC interval for a date-range category.
///
/// A lone `from` (or lone `to`) covers that single day. Time-of-day bounds
/// only apply to day-only inputs. Inverted bounds are swapped.
pub fn date_interval(
    range: &DateRangeFilter,
    tz: FixedOffset,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let (mut from, mut to) = match (&range.from, &range.to) {
        (Some(from), Some(to)) => ((from, range.time_from), (to, range.time_to)),
        (Some(from), None) => ((from, range.time_from), (from, range.time_to)),
        (None, Some(to)) => ((to, range.time_from), (to, range.time_to)),
        (None, None) => return None,
    };
    if start_of(from.0, tz)? > start_of(to.0, tz)? {
        std::mem::swap(&mut from, &mut to);
    }

    let start = match from {
        (DateInput::Day(day), Some(time)) => local_instant(day.and_time(time), tz)?,
        (input, _) => start_of(input, tz)?,
    };
    let end = match to {
        (DateInput::Day(day), Some(time)) => local_instant(day.and_time(time), tz)?,
        (input, _) => end_of(input, tz)?,
    };

    // Same day with time_from after time_to.
    if start > end {
        Some((end, start))
    } else {
        Some((start, end))
    }
}

/// First instant covered by a date input.
pub fn start_of(input: &DateInput, tz: FixedOffset) -> Option<DateTime<Utc>> {
    match input {
        DateInput::Day(day) => local_instant(day.and_hms_opt(0, 0, 0)?, tz),
        DateInput::Local(naive) => local_instant(*naive, tz),
        DateInput::Instant(instant) => Some(instant.with_timezone(&Utc)),
    }
}

/// Last instant covered by a date input (millisecond precision).
pub fn end_of(input: &DateInput, tz: FixedOffset) -> Option<DateTime<Utc>> {
    match input {
        DateInput::Day(day) => local_instant(end_of_day(*day)?, tz),
        DateInput::Local(naive) => local_instant(*naive, tz),
        DateInput::Instant(instant) => Some(instant.with_timezone(&Utc)),
    }
}

fn end_of_day(day: NaiveDate) -> Option<NaiveDateTime> {
    day.and_hms_milli_opt(23, 59, 59, 999)
}

fn local_instant(naive: NaiveDateTime, tz: FixedOffset) -> Option<DateTime<Utc>> {
    naive
        .and_local_timezone(tz)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::resource::Resource;
    use chrono::{NaiveTime, TimeZone};
    use serde_json::json;

    fn sao_paulo() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    fn day(raw: &str) -> Option<DateInput> {
        DateInput::parse(raw)
    }

    fn range(from: &str, to: Option<&str>) -> DateRangeFilter {
        DateRangeFilter {
            category: "",
            column: "event_time",
            from: day(from),
            to: to.and_then(day),
            time_from: None,
            time_to: None,
        }
    }

    fn clause(field: &str, operator: Option<FilterOperator>, value: serde_json::Value) -> AdvancedFilterClause {
        AdvancedFilterClause {
            field: field.to_string(),
            operator,
            value,
        }
    }

    #[test]
    fn single_day_covers_full_local_day() {
        let (from, to) = date_interval(&range("2024-03-01", Some("2024-03-01")), sao_paulo()).unwrap();

        assert_eq!(from, Utc.with_ymd_and_hms(2024, 3, 1, 3, 0, 0).unwrap());
        assert_eq!(
            to,
            Utc.with_ymd_and_hms(2024, 3, 2, 2, 59, 59).unwrap() + chrono::Duration::milliseconds(999)
        );
    }

    #[test]
    fn lone_from_defaults_to_end_of_same_day() {
        let only_from = date_interval(&range("2024-03-01", None), sao_paulo()).unwrap();
        let both = date_interval(&range("2024-03-01", Some("2024-03-01")), sao_paulo()).unwrap();
        assert_eq!(only_from, both);
    }

    #[test]
    fn inverted_range_is_swapped() {
        let (from, to) = date_interval(&range("2024-03-05", Some("2024-03-01")), sao_paulo()).unwrap();
        assert!(from < to);
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 3, 1, 3, 0, 0).unwrap());
        assert_eq!(
            to,
            Utc.with_ymd_and_hms(2024, 3, 6, 2, 59, 59).unwrap() + chrono::Duration::milliseconds(999)
        );
    }

    #[test]
    fn inverted_range_keeps_both_boundary_days() {
        let (from, to) = date_interval(&range("2024-03-05", Some("2024-03-01")), sao_paulo()).unwrap();
        let ordered = date_interval(&range("2024-03-01", Some("2024-03-05")), sao_paulo()).unwrap();
        assert_eq!((from, to), ordered);
    }

    #[test]
    fn time_of_day_bounds_apply_to_days() {
        let mut r = range("2024-03-01", Some("2024-03-02"));
        r.time_from = NaiveTime::from_hms_opt(8, 30, 0);
        r.time_to = NaiveTime::from_hms_milli_opt(18, 0, 59, 999);
        let (from, to) = date_interval(&r, sao_paulo()).unwrap();

        assert_eq!(from, Utc.with_ymd_and_hms(2024, 3, 1, 11, 30, 0).unwrap());
        assert_eq!(
            to,
            Utc.with_ymd_and_hms(2024, 3, 2, 21, 0, 59).unwrap() + chrono::Duration::milliseconds(999)
        );
    }

    #[test]
    fn explicit_offset_is_kept() {
        let (from, to) = date_interval(
            &range("2024-03-01T10:00:00Z", Some("2024-03-01T12:00:00Z")),
            sao_paulo(),
        )
        .unwrap();
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn empty_range_compiles_to_nothing() {
        let r = DateRangeFilter {
            category: "",
            column: "event_time",
            from: None,
            to: None,
            time_from: None,
            time_to: None,
        };
        assert!(date_interval(&r, sao_paulo()).is_none());
    }

    #[test]
    fn advanced_or_joins_uniformly() {
        let spec = Resource::Events.spec();
        let expr = AdvancedFilterExpression {
            clauses: vec![
                clause("utm_source", Some(FilterOperator::Equals), json!("google")),
                clause("utm_source", Some(FilterOperator::Equals), json!("meta")),
            ],
            condition: FilterCondition::Or,
        };
        match compile_advanced(spec, &expr, sao_paulo()) {
            Predicate::Any(parts) => assert_eq!(parts.len(), 2),
            other => panic!("expected OR, got {other:?}"),
        }
    }

    #[test]
    fn advanced_blank_values_match_everything() {
        let spec = Resource::Events.spec();
        let expr = AdvancedFilterExpression {
            clauses: vec![
                clause("utm_source", None, json!("")),
                clause("event_name", None, json!(null)),
            ],
            condition: FilterCondition::Or,
        };
        assert_eq!(compile_advanced(spec, &expr, sao_paulo()), Predicate::Always);
    }

    #[test]
    fn advanced_drops_unknown_fields_and_operators() {
        let spec = Resource::Events.spec();
        let expr = AdvancedFilterExpression {
            clauses: vec![
                clause("password; DROP TABLE events", None, json!("x")),
                clause("profession_id", Some(FilterOperator::Contains), json!("3")),
                clause("profession_id", Some(FilterOperator::GreaterThan), json!("abc")),
                clause("event_name", None, json!("purchase")),
            ],
            condition: FilterCondition::And,
        };
        assert_eq!(
            compile_advanced(spec, &expr, sao_paulo()),
            Predicate::Compare {
                column: "event_name",
                op: Comparison::Contains,
                value: FilterValue::Text("purchase".to_string()),
            }
        );
    }

    #[test]
    fn advanced_numeric_value_is_typed() {
        let spec = Resource::Events.spec();
        let expr = AdvancedFilterExpression {
            clauses: vec![clause("funnel_id", Some(FilterOperator::GreaterOrEqual), json!(7))],
            condition: FilterCondition::And,
        };
        assert_eq!(
            compile_advanced(spec, &expr, sao_paulo()),
            Predicate::Compare {
                column: "funnel_id",
                op: Comparison::Gte,
                value: FilterValue::Integer(7),
            }
        );
    }

    #[test]
    fn advanced_timestamp_equals_is_whole_day() {
        let spec = Resource::Events.spec();
        let expr = AdvancedFilterExpression {
            clauses: vec![clause("event_time", Some(FilterOperator::Equals), json!("2024-03-01"))],
            condition: FilterCondition::And,
        };
        let expected = date_interval(&range("2024-03-01", None), sao_paulo()).unwrap();
        assert_eq!(
            compile_advanced(spec, &expr, sao_paulo()),
            Predicate::Between {
                column: "event_time",
                from: expected.0,
                to: expected.1,
            }
        );
    }

    #[test]
    fn categories_are_anded() {
        let spec = Resource::Leads.spec();
        let filters = vec![
            FilterClause::Equality {
                column: "profession_id",
                value: FilterValue::Integer(3),
            },
            FilterClause::DateRange(DateRangeFilter {
                category: "captacao",
                column: "captured_at",
                from: day("2024-03-01"),
                to: day("2024-03-31"),
                time_from: None,
                time_to: None,
            }),
            FilterClause::DateRange(DateRangeFilter {
                category: "vendas",
                column: "purchased_at",
                from: day("2024-04-01"),
                to: None,
                time_from: None,
                time_to: None,
            }),
        ];
        match compile(spec, &filters, sao_paulo()) {
            Predicate::All(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected AND, got {other:?}"),
        }
    }

    #[test]
    fn no_filters_match_everything() {
        assert_eq!(
            compile(Resource::Surveys.spec(), &[], sao_paulo()),
            Predicate::Always
        );
    }

    #[test]
    fn any_with_always_is_always() {
        let cmp = Predicate::Compare {
            column: "name",
            op: Comparison::Eq,
            value: FilterValue::Text("a".to_string()),
        };
        assert_eq!(Predicate::any(vec![cmp.clone(), Predicate::Always]), Predicate::Always);
        assert_eq!(Predicate::all(vec![cmp.clone(), Predicate::Always]), cmp);
    }

    #[test]
    fn value_parsing_by_kind() {
        let tz = sao_paulo();
        assert_eq!(FilterValue::parse(FieldKind::Integer, " 42 ", tz), Some(FilterValue::Integer(42)));
        assert_eq!(FilterValue::parse(FieldKind::Integer, "4x", tz), None);
        assert_eq!(FilterValue::parse(FieldKind::Boolean, "TRUE", tz), Some(FilterValue::Boolean(true)));
        assert_eq!(FilterValue::parse(FieldKind::Text, "   ", tz), None);
        assert!(matches!(
            FilterValue::parse(FieldKind::Timestamp, "2024-03-01", tz),
            Some(FilterValue::Instant(_))
        ));
    }
}
