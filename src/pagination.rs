use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};

/// Upper bound on page size regardless of what the client asks for.
pub const MAX_LIMIT: i64 = 100;

/// PageQuery
///
/// Raw `page`/`limit` query parameters. Kept as strings so a malformed value falls back
/// to the default instead of rejecting the whole request.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageQuery {
    pub fn resolve(&self, default_limit: i64) -> Page {
        Page::from_raw(self.page.as_deref(), self.limit.as_deref(), default_limit)
    }
}

/// A resolved page window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    /// Zero, negative or unparseable values fall back to page 1 / the default limit.
    pub fn from_raw(page: Option<&str>, limit: Option<&str>, default_limit: i64) -> Self {
        let parse = |raw: Option<&str>| {
            raw.and_then(|v| v.trim().parse::<i64>().ok())
                .filter(|v| *v > 0)
        };
        Self {
            page: parse(page).unwrap_or(1),
            limit: parse(limit).unwrap_or(default_limit).min(MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn meta(&self, total_count: i64) -> PaginationMeta {
        let total_pages = if total_count == 0 {
            0
        } else {
            (total_count + self.limit - 1) / self.limit
        };
        PaginationMeta {
            page: self.page,
            limit: self.limit,
            total_count,
            total_pages,
            has_next_page: self.page < total_pages,
            has_prev_page: self.page > 1,
        }
    }
}

/// PaginationMeta
///
/// Attached to every paginated list response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PaginationMeta {
    pub page: i64,
    pub limit: i64,
    pub total_count: i64,
    pub total_pages: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}
