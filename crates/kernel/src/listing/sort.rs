//! Sort resolution against a resource's allow-list.

use tracing::debug;

use super::resource::SortField;
use super::types::SortDirection;

/// A sort that is safe to hand to the query layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSort {
    /// Client-facing field name, echoed back in `meta.sort_by`.
    pub field: &'static str,

    /// Backend column.
    pub column: &'static str,

    pub direction: SortDirection,
}

/// Map a requested sort onto the allow-list.
///
/// Unknown fields silently fall back to `default_field`; a missing or
/// invalid direction falls back to descending.
pub fn resolve(
    requested_field: Option<&str>,
    requested_direction: Option<SortDirection>,
    allow_list: &'static [SortField],
    default_field: &'static str,
) -> ResolvedSort {
    let direction = requested_direction.unwrap_or_default();

    let chosen = requested_field
        .map(str::trim)
        .and_then(|name| allow_list.iter().find(|f| f.name == name));

    let field = match chosen {
        Some(field) => field,
        None => {
            if let Some(name) = requested_field {
                debug!(requested = name, default = default_field, "sort field not allowed, using default");
            }
            match allow_list.iter().find(|f| f.name == default_field) {
                Some(field) => field,
                None => {
                    return ResolvedSort {
                        field: default_field,
                        column: default_field,
                        direction,
                    };
                }
            }
        }
    };

    ResolvedSort {
        field: field.name,
        column: field.column,
        direction,
    }
}
