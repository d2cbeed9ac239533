//! Turns raw list/sum query parameters into bounded, validated values.
//!
//! Pagination inputs are forgiving (bad values fall back to defaults); filter
//! inputs are strict (a malformed user id is a client error).

use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{ListSubscriptionsQuery, PageRequest, PaginationMeta, SubscriptionFilter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub filter: SubscriptionFilter,
    pub page: PageRequest,
}

/// Resolve `page` and `limit`, ignoring anything out of range or unparsable.
pub fn resolve_page(page: Option<&str>, limit: Option<&str>) -> PageRequest {
    let page = parse_i64(page)
        .filter(|p| *p > 0)
        .unwrap_or(PageRequest::DEFAULT_PAGE);
    let limit = parse_i64(limit)
        .filter(|l| (1..=PageRequest::MAX_LIMIT).contains(l))
        .unwrap_or(PageRequest::DEFAULT_LIMIT);

    PageRequest::new(page, limit)
}

pub fn resolve_filter(
    user_id: Option<&str>,
    service_name: Option<&str>,
) -> Result<SubscriptionFilter, ServiceError> {
    let user_id = match non_empty(user_id) {
        Some(raw) => Some(parse_uuid(raw, "user_id")?),
        None => None,
    };

    Ok(SubscriptionFilter {
        user_id,
        service_name: non_empty(service_name).map(str::to_string),
    })
}

pub fn resolve(query: &ListSubscriptionsQuery) -> Result<ListParams, ServiceError> {
    Ok(ListParams {
        filter: resolve_filter(query.user_id.as_deref(), query.service_name.as_deref())?,
        page: resolve_page(query.page.as_deref(), query.limit.as_deref()),
    })
}

pub fn pagination_meta(page: &PageRequest, total: i64) -> PaginationMeta {
    let total = total.max(0);
    let total_pages = (total + page.limit - 1) / page.limit;

    PaginationMeta {
        page: page.page,
        limit: page.limit,
        total,
        total_pages,
        has_next: page.page < total_pages,
        has_prev: page.page > 1,
    }
}

/// Parse an identifier, reporting `invalid <field>` on failure.
pub fn parse_uuid(raw: &str, field: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ServiceError::validation(format!("invalid {}", field)))
}

/// Trimmed value, or `None` when missing or blank.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_i64(value: Option<&str>) -> Option<i64> {
    non_empty(value).and_then(|v| v.parse().ok())
}
