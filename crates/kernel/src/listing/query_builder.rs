//! Listing query builder using SeaQuery.
//!
//! Generates PostgreSQL for a compiled [`Predicate`], a [`ResolvedSort`] and
//! a page window. Column names come from the resource allow-lists; values
//! are rendered as escaped literals by SeaQuery.

use sea_query::{
    Alias, Asterisk, Cond, Condition, Expr, Func, Order, PostgresQueryBuilder, Query,
    SelectStatement, SimpleExpr,
};

use super::filter::{Comparison, FilterValue, Predicate};
use super::resource::ResourceSpec;
use super::sort::ResolvedSort;
use super::types::SortDirection;

/// Query builder for one listing request.
pub struct ListingQueryBuilder<'a> {
    spec: &'a ResourceSpec,
    predicate: &'a Predicate,
    sort: &'a ResolvedSort,
}

impl<'a> ListingQueryBuilder<'a> {
    pub fn new(spec: &'a ResourceSpec, predicate: &'a Predicate, sort: &'a ResolvedSort) -> Self {
        Self {
            spec,
            predicate,
            sort,
        }
    }

    /// Build the main SELECT query for a page window.
    ///
    /// Each row comes back as one JSON object, ordered by the same statement.
    pub fn build(&self, offset: u64, limit: u64) -> String {
        let mut query = Query::select();

        query
            .expr(Expr::cust(format!(r#"row_to_json("{}".*)"#, self.spec.table)))
            .from(Alias::new(self.spec.table));
        self.add_filter(&mut query);
        self.add_sorts(&mut query);

        query.limit(limit);
        query.offset(offset);

        query.to_string(PostgresQueryBuilder)
    }

    /// Build a COUNT query over the same predicate.
    pub fn build_count(&self) -> String {
        let mut query = Query::select();

        query
            .expr(Expr::col(Asterisk).count())
            .from(Alias::new(self.spec.table));
        self.add_filter(&mut query);

        query.to_string(PostgresQueryBuilder)
    }

    /// WHERE clause, omitted entirely for an unfiltered request.
    fn add_filter(&self, query: &mut SelectStatement) {
        if !self.predicate.is_always() {
            query.cond_where(self.condition(self.predicate));
        }
    }

    /// ORDER BY the resolved column, then the id column so equal sort keys
    /// page deterministically.
    fn add_sorts(&self, query: &mut SelectStatement) {
        let order = match self.sort.direction {
            SortDirection::Asc => Order::Asc,
            SortDirection::Desc => Order::Desc,
        };
        query.order_by((Alias::new(self.spec.table), Alias::new(self.sort.column)), order.clone());
        if self.sort.column != self.spec.id_column {
            query.order_by(
                (Alias::new(self.spec.table), Alias::new(self.spec.id_column)),
                order,
            );
        }
    }

    fn condition(&self, predicate: &Predicate) -> Condition {
        match predicate {
            Predicate::Always => Cond::all(),
            Predicate::Compare { column, op, value } => {
                Cond::all().add(self.compare_expr(column, *op, value))
            }
            Predicate::Between { column, from, to } => {
                Cond::all().add(self.column(column).between(*from, *to))
            }
            Predicate::All(parts) => parts
                .iter()
                .fold(Cond::all(), |cond, part| cond.add(self.condition(part))),
            Predicate::Any(parts) => parts
                .iter()
                .fold(Cond::any(), |cond, part| cond.add(self.condition(part))),
        }
    }

    fn column(&self, column: &str) -> Expr {
        Expr::col((Alias::new(self.spec.table), Alias::new(column)))
    }

    fn compare_expr(&self, column: &str, op: Comparison, value: &FilterValue) -> SimpleExpr {
        let col = self.column(column);

        match op {
            Comparison::Eq => col.eq(sea_value(value)),
            Comparison::Ne => col.ne(sea_value(value)),
            Comparison::Gt => col.gt(sea_value(value)),
            Comparison::Lt => col.lt(sea_value(value)),
            Comparison::Gte => col.gte(sea_value(value)),
            Comparison::Lte => col.lte(sea_value(value)),
            Comparison::Contains => lowered(col).like(pattern(value, "%", "%")),
            Comparison::NotContains => lowered(col).not_like(pattern(value, "%", "%")),
            Comparison::StartsWith => lowered(col).like(pattern(value, "", "%")),
            Comparison::EndsWith => lowered(col).like(pattern(value, "%", "")),
        }
    }
}

fn sea_value(value: &FilterValue) -> sea_query::Value {
    match value {
        FilterValue::Text(s) => s.clone().into(),
        FilterValue::Integer(i) => (*i).into(),
        FilterValue::Boolean(b) => (*b).into(),
        FilterValue::Instant(t) => (*t).into(),
    }
}

/// `LOWER(col)` for case-insensitive LIKE.
fn lowered(col: Expr) -> Expr {
    Expr::expr(Func::lower(col))
}

/// Lowercased LIKE pattern with user wildcards escaped.
fn pattern(value: &FilterValue, prefix: &str, suffix: &str) -> String {
    let text = match value {
        FilterValue::Text(s) => s.to_lowercase(),
        FilterValue::Integer(i) => i.to_string(),
        FilterValue::Boolean(b) => b.to_string(),
        FilterValue::Instant(t) => t.to_rfc3339(),
    };
    format!("{prefix}{}{suffix}", escape_like_wildcards(&text))
}

/// Escape LIKE wildcards in user input.
fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::resource::Resource;
    use chrono::{TimeZone, Utc};

    fn sort(field: &'static str, direction: SortDirection) -> ResolvedSort {
        ResolvedSort {
            field,
            column: field,
            direction,
        }
    }

    fn text(column: &'static str, op: Comparison, value: &str) -> Predicate {
        Predicate::Compare {
            column,
            op,
            value: FilterValue::Text(value.to_string()),
        }
    }

    #[test]
    fn unfiltered_query_has_no_where() {
        let spec = Resource::Professions.spec();
        let s = sort("created_at", SortDirection::Desc);
        let builder = ListingQueryBuilder::new(spec, &Predicate::Always, &s);
        let sql = builder.build(20, 10);

        assert!(!sql.contains("WHERE"), "no filters should have no WHERE: {sql}");
        assert!(sql.contains("LIMIT 10"), "should limit: {sql}");
        assert!(sql.contains("OFFSET 20"), "should offset: {sql}");

        let count = builder.build_count();
        assert!(!count.contains("WHERE"), "no filters should have no WHERE: {count}");
    }

    #[test]
    fn rows_are_selected_as_json_in_the_ordered_statement() {
        let spec = Resource::Professions.spec();
        let s = sort("created_at", SortDirection::Desc);
        let predicate = text("profession_name", Comparison::Eq, "Nurse");
        let sql = ListingQueryBuilder::new(spec, &predicate, &s).build(0, 10);

        assert!(
            sql.starts_with(r#"SELECT row_to_json("professions".*) FROM "professions""#),
            "{sql}"
        );
        assert!(!sql.contains("FROM ("), "no subquery: {sql}");
        assert!(sql.contains(r#"ORDER BY "professions"."created_at" DESC"#), "{sql}");
    }

    #[test]
    fn order_by_has_id_tiebreaker() {
        let spec = Resource::Professions.spec();
        let s = sort("profession_name", SortDirection::Asc);
        let sql = ListingQueryBuilder::new(spec, &Predicate::Always, &s).build(0, 10);

        let name = sql.find(r#""profession_name" ASC"#).expect("sort column");
        let id = sql.find(r#""profession_id" ASC"#).expect("tiebreaker");
        assert!(name < id, "tiebreaker must follow sort column: {sql}");
    }

    #[test]
    fn sorting_by_id_has_no_duplicate_tiebreaker() {
        let spec = Resource::Professions.spec();
        let s = sort("profession_id", SortDirection::Desc);
        let sql = ListingQueryBuilder::new(spec, &Predicate::Always, &s).build(0, 10);
        assert_eq!(sql.matches("\"profession_id\" DESC").count(), 1, "{sql}");
    }

    #[test]
    fn contains_is_case_insensitive_and_escaped() {
        let spec = Resource::Events.spec();
        let s = sort("event_time", SortDirection::Desc);
        let predicate = text("utm_campaign", Comparison::Contains, "Black_Friday 50%");
        let sql = ListingQueryBuilder::new(spec, &predicate, &s).build(0, 10);

        assert!(sql.contains("LOWER("), "should lowercase column: {sql}");
        assert!(
            sql.contains(r"black\\_friday 50\\%") || sql.contains(r"black\_friday 50\%"),
            "should escape wildcards: {sql}"
        );
    }

    #[test]
    fn or_expression_renders_or() {
        let spec = Resource::Events.spec();
        let s = sort("event_time", SortDirection::Desc);
        let predicate = Predicate::any(vec![
            text("utm_source", Comparison::Eq, "google"),
            text("utm_source", Comparison::Eq, "meta"),
        ]);
        let sql = ListingQueryBuilder::new(spec, &predicate, &s).build_count();

        assert!(sql.contains("COUNT(*)"), "count query: {sql}");
        assert!(sql.contains(" OR "), "should OR clauses: {sql}");
        assert!(sql.contains("'google'") && sql.contains("'meta'"), "{sql}");
    }

    #[test]
    fn between_renders_both_bounds() {
        let spec = Resource::Leads.spec();
        let s = sort("created_at", SortDirection::Desc);
        let predicate = Predicate::Between {
            column: "captured_at",
            from: Utc.with_ymd_and_hms(2024, 3, 1, 3, 0, 0).unwrap(),
            to: Utc.with_ymd_and_hms(2024, 3, 2, 2, 59, 59).unwrap(),
        };
        let sql = ListingQueryBuilder::new(spec, &predicate, &s).build(0, 10);

        assert!(sql.contains("BETWEEN"), "{sql}");
        assert!(sql.contains("2024-03-01 03:00:00"), "{sql}");
        assert!(sql.contains("2024-03-02 02:59:59"), "{sql}");
    }

    #[test]
    fn count_and_page_share_filters() {
        let spec = Resource::Events.spec();
        let s = sort("event_time", SortDirection::Desc);
        let predicate = Predicate::all(vec![
            Predicate::Compare {
                column: "funnel_id",
                op: Comparison::Eq,
                value: FilterValue::Integer(4),
            },
            text("event_name", Comparison::StartsWith, "page"),
        ]);
        let builder = ListingQueryBuilder::new(spec, &predicate, &s);
        let page = builder.build(0, 10);
        let count = builder.build_count();

        for sql in [&page, &count] {
            assert!(sql.contains(r#""funnel_id" = 4"#), "{sql}");
            assert!(sql.contains("'page%'"), "{sql}");
            assert!(sql.contains(" AND "), "{sql}");
        }
    }

    #[test]
    fn escape_like_wildcards_function() {
        assert_eq!(escape_like_wildcards("hello"), "hello");
        assert_eq!(escape_like_wildcards("100%"), "100\\%");
        assert_eq!(escape_like_wildcards("a_b"), "a\\_b");
        assert_eq!(escape_like_wildcards("a\\b"), "a\\\\b");
    }
}
