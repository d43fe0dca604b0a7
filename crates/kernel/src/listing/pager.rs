//! Pagination math.

/// Offset and page count for one listing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u64,
    pub last_page: u32,
}

/// Compute the window for `page` given the filtered `total`.
///
/// `page` is expected to be at least 1 (the validator clamps it). A page past
/// the end is not an error; it simply yields no rows.
pub fn paginate(total: u64, page: u32, limit: u32) -> Pagination {
    Pagination {
        offset: offset(page, limit),
        last_page: last_page(total, limit),
    }
}

/// Rows to skip before `page`.
pub fn offset(page: u32, limit: u32) -> u64 {
    u64::from(page.saturating_sub(1)) * u64::from(limit)
}

/// `max(1, ceil(total / limit))`.
pub fn last_page(total: u64, limit: u32) -> u32 {
    if limit == 0 {
        return 1;
    }
    let pages = total.div_ceil(u64::from(limit)).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}
