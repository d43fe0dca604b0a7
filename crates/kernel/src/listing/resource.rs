//! Listable resources and their allow-lists.
//!
//! Every client-supplied field name (sort column, advanced filter field,
//! equality parameter) is looked up here before it can reach the query
//! layer. Nothing outside these tables is ever used as a column reference.

use std::fmt;
use std::str::FromStr;

use super::types::FilterOperator;

/// A listable entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Events,
    Leads,
    Users,
    Professions,
    Surveys,
}

impl Resource {
    pub const ALL: [Resource; 5] = [
        Resource::Events,
        Resource::Leads,
        Resource::Users,
        Resource::Professions,
        Resource::Surveys,
    ];

    /// URL segment for this resource.
    pub fn as_str(&self) -> &'static str {
        self.spec().name
    }

    /// Static definition for this resource.
    pub fn spec(&self) -> &'static ResourceSpec {
        match self {
            Resource::Events => &EVENTS,
            Resource::Leads => &LEADS,
            Resource::Users => &USERS,
            Resource::Professions => &PROFESSIONS,
            Resource::Surveys => &SURVEYS,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = UnknownResource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resource::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownResource(s.to_string()))
    }
}

/// Returned when a URL names no known resource.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource: {0}")]
pub struct UnknownResource(pub String);

/// Value kind of a filterable field; decides value parsing and operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
    Timestamp,
}

impl FieldKind {
    /// Whether an advanced filter may apply `op` to a field of this kind.
    pub fn allows(&self, op: FilterOperator) -> bool {
        use FilterOperator::*;
        match self {
            FieldKind::Text => matches!(
                op,
                Equals | NotEquals | Contains | NotContains | StartsWith | EndsWith
            ),
            FieldKind::Integer => matches!(
                op,
                Equals | NotEquals | GreaterThan | LessThan | GreaterOrEqual | LessOrEqual
            ),
            FieldKind::Timestamp => matches!(
                op,
                Equals | GreaterThan | LessThan | GreaterOrEqual | LessOrEqual
            ),
            FieldKind::Boolean => matches!(op, Equals | NotEquals),
        }
    }

    /// Operator used when a clause does not name one.
    pub fn default_operator(&self) -> FilterOperator {
        match self {
            FieldKind::Text => FilterOperator::Contains,
            _ => FilterOperator::Equals,
        }
    }
}

/// Allow-listed sort field: client name mapped to a backend column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortField {
    pub name: &'static str,
    pub column: &'static str,
}

/// Filterable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
}

/// Date category: `{prefix}_from`, `{prefix}_to`, `{prefix}_time_from`,
/// `{prefix}_time_to`, or the bare names when the prefix is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateCategory {
    pub prefix: &'static str,
    pub column: &'static str,
}

impl DateCategory {
    /// Query parameter name for `suffix` within this category.
    pub fn param(&self, suffix: &str) -> String {
        if self.prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}_{suffix}", self.prefix)
        }
    }
}

/// One CSV column in an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportColumn {
    pub header: &'static str,
    pub field: &'static str,
}

/// Static definition of a resource.
#[derive(Debug)]
pub struct ResourceSpec {
    /// URL segment.
    pub name: &'static str,

    /// Backing table.
    pub table: &'static str,

    /// Primary key; used as the ordering tiebreaker.
    pub id_column: &'static str,

    /// Key the records are returned under.
    pub envelope_key: &'static str,

    /// Whether the endpoint requires a bearer token.
    pub protected: bool,

    /// Sort allow-list.
    pub sort_fields: &'static [SortField],

    /// Sort field used when the requested one is not allow-listed.
    pub default_sort: &'static str,

    /// Fields usable in advanced filters and equality parameters.
    pub fields: &'static [FieldSpec],

    /// Query parameters compiled to exact matches (names from `fields`).
    pub equality_params: &'static [&'static str],

    /// Independent date-range categories.
    pub date_categories: &'static [DateCategory],

    /// Columns written by a CSV export, in order.
    pub export_columns: &'static [ExportColumn],
}

impl ResourceSpec {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn sort_field(&self, name: &str) -> Option<&'static SortField> {
        self.sort_fields.iter().find(|f| f.name == name)
    }

    /// Client-facing names of the sort allow-list.
    pub fn valid_sort_fields(&self) -> Vec<String> {
        self.sort_fields.iter().map(|f| f.name.to_string()).collect()
    }
}

const fn sort(name: &'static str) -> SortField {
    SortField { name, column: name }
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        column: name,
        kind,
    }
}

const fn col(header: &'static str, field: &'static str) -> ExportColumn {
    ExportColumn { header, field }
}

use FieldKind::{Boolean, Integer, Text, Timestamp};

static EVENTS: ResourceSpec = ResourceSpec {
    name: "events",
    table: "events",
    id_column: "event_id",
    envelope_key: "events",
    protected: false,
    sort_fields: &[
        sort("event_id"),
        sort("event_name"),
        sort("event_time"),
        sort("event_source"),
        sort("event_type"),
        sort("user_id"),
        sort("profession_id"),
        sort("product_id"),
        sort("funnel_id"),
    ],
    default_sort: "event_time",
    fields: &[
        field("event_id", Text),
        field("event_name", Text),
        field("event_time", Timestamp),
        field("event_source", Text),
        field("event_type", Text),
        field("session_id", Text),
        field("user_id", Text),
        field("profession_id", Integer),
        field("product_id", Integer),
        field("funnel_id", Integer),
        field("utm_source", Text),
        field("utm_medium", Text),
        field("utm_campaign", Text),
        field("utm_content", Text),
        field("utm_term", Text),
        field("country", Text),
        field("state", Text),
        field("city", Text),
    ],
    equality_params: &["profession_id", "funnel_id", "product_id"],
    date_categories: &[DateCategory {
        prefix: "",
        column: "event_time",
    }],
    export_columns: &[
        col("ID", "event_id"),
        col("Event", "event_name"),
        col("Time", "event_time"),
        col("Source", "event_source"),
        col("Type", "event_type"),
        col("Session", "session_id"),
        col("User", "user_id"),
        col("Profession", "profession_id"),
        col("Product", "product_id"),
        col("Funnel", "funnel_id"),
        col("UTM Source", "utm_source"),
        col("UTM Medium", "utm_medium"),
        col("UTM Campaign", "utm_campaign"),
        col("UTM Content", "utm_content"),
        col("UTM Term", "utm_term"),
        col("Country", "country"),
        col("State", "state"),
        col("City", "city"),
    ],
};

static LEADS: ResourceSpec = ResourceSpec {
    name: "leads",
    table: "leads",
    id_column: "lead_id",
    envelope_key: "data",
    protected: true,
    sort_fields: &[
        sort("lead_id"),
        sort("name"),
        sort("email"),
        sort("phone"),
        sort("created_at"),
        sort("captured_at"),
        sort("survey_answered_at"),
        sort("purchased_at"),
        sort("profession_id"),
        sort("funnel_id"),
    ],
    default_sort: "created_at",
    fields: &[
        field("lead_id", Text),
        field("name", Text),
        field("email", Text),
        field("phone", Text),
        field("created_at", Timestamp),
        field("captured_at", Timestamp),
        field("survey_answered_at", Timestamp),
        field("purchased_at", Timestamp),
        field("profession_id", Integer),
        field("funnel_id", Integer),
        field("utm_source", Text),
        field("utm_campaign", Text),
        field("is_client", Boolean),
    ],
    equality_params: &["profession_id", "funnel_id"],
    date_categories: &[
        DateCategory {
            prefix: "",
            column: "created_at",
        },
        DateCategory {
            prefix: "captacao",
            column: "captured_at",
        },
        DateCategory {
            prefix: "pesquisa",
            column: "survey_answered_at",
        },
        DateCategory {
            prefix: "vendas",
            column: "purchased_at",
        },
    ],
    export_columns: &[
        col("ID", "lead_id"),
        col("Name", "name"),
        col("Email", "email"),
        col("Phone", "phone"),
        col("Profession", "profession_id"),
        col("Funnel", "funnel_id"),
        col("UTM Source", "utm_source"),
        col("UTM Campaign", "utm_campaign"),
        col("Client", "is_client"),
        col("Created", "created_at"),
        col("Captured", "captured_at"),
        col("Survey Answered", "survey_answered_at"),
        col("Purchased", "purchased_at"),
    ],
};

static USERS: ResourceSpec = ResourceSpec {
    name: "users",
    table: "anonymous_users",
    id_column: "user_id",
    envelope_key: "users",
    protected: true,
    sort_fields: &[
        sort("user_id"),
        sort("created_at"),
        sort("first_seen"),
        sort("last_seen"),
        sort("country"),
        sort("device"),
    ],
    default_sort: "created_at",
    fields: &[
        field("user_id", Text),
        field("fingerprint", Text),
        field("created_at", Timestamp),
        field("first_seen", Timestamp),
        field("last_seen", Timestamp),
        field("ip_address", Text),
        field("country", Text),
        field("device", Text),
        field("browser", Text),
        field("is_identified", Boolean),
    ],
    equality_params: &[],
    date_categories: &[DateCategory {
        prefix: "",
        column: "created_at",
    }],
    export_columns: &[
        col("ID", "user_id"),
        col("Fingerprint", "fingerprint"),
        col("IP", "ip_address"),
        col("Country", "country"),
        col("Device", "device"),
        col("Browser", "browser"),
        col("Identified", "is_identified"),
        col("First Seen", "first_seen"),
        col("Last Seen", "last_seen"),
        col("Created", "created_at"),
    ],
};

static PROFESSIONS: ResourceSpec = ResourceSpec {
    name: "professions",
    table: "professions",
    id_column: "profession_id",
    envelope_key: "data",
    protected: false,
    sort_fields: &[
        sort("profession_id"),
        sort("created_at"),
        sort("profession_name"),
        sort("meta_pixel"),
        sort("meta_token"),
    ],
    default_sort: "created_at",
    fields: &[
        field("profession_id", Integer),
        field("profession_name", Text),
        field("meta_pixel", Text),
        field("created_at", Timestamp),
    ],
    equality_params: &[],
    date_categories: &[],
    export_columns: &[
        col("ID", "profession_id"),
        col("Name", "profession_name"),
        col("Meta Pixel", "meta_pixel"),
        col("Created", "created_at"),
    ],
};

static SURVEYS: ResourceSpec = ResourceSpec {
    name: "surveys",
    table: "surveys",
    id_column: "survey_id",
    envelope_key: "items",
    protected: false,
    sort_fields: &[
        sort("survey_id"),
        sort("survey_name"),
        sort("created_at"),
        sort("funnel_id"),
        sort("profession_id"),
    ],
    default_sort: "created_at",
    fields: &[
        field("survey_id", Integer),
        field("survey_name", Text),
        field("created_at", Timestamp),
        field("funnel_id", Integer),
        field("profession_id", Integer),
    ],
    equality_params: &["funnel_id", "profession_id"],
    date_categories: &[DateCategory {
        prefix: "",
        column: "created_at",
    }],
    export_columns: &[
        col("ID", "survey_id"),
        col("Name", "survey_name"),
        col("Funnel", "funnel_id"),
        col("Profession", "profession_id"),
        col("Created", "created_at"),
    ],
};
