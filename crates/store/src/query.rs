//! Filters and pagination for administrative listings.

use depot_core::Platform;
use serde::{Deserialize, Serialize};

/// Restricts a listing to one channel and/or platform.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleFilter {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub platform: Option<Platform>,
}

impl BundleFilter {
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }
}

/// Offset pagination. A `limit` of zero means "everything after `offset`".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl PageRequest {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub current_page: usize,
    pub total_pages: usize,
}

impl Pagination {
    pub fn new(total: usize, request: PageRequest) -> Self {
        let PageRequest { limit, offset } = request;
        let (current_page, total_pages) = if limit == 0 {
            (1, usize::from(total > 0))
        } else {
            (offset / limit + 1, total.div_ceil(limit))
        };
        Self {
            total,
            limit,
            offset,
            has_next_page: limit > 0 && offset.saturating_add(limit) < total,
            has_previous_page: offset > 0,
            current_page,
            total_pages,
        }
    }
}

/// One page of results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    /// Slice an already filtered and ordered result set.
    pub fn slice(items: Vec<T>, request: PageRequest) -> Self {
        let pagination = Pagination::new(items.len(), request);
        let iter = items.into_iter().skip(request.offset);
        let data = if request.limit == 0 {
            iter.collect()
        } else {
            iter.take(request.limit).collect()
        };
        Self { data, pagination }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_math() {
        let p = Pagination::new(45, PageRequest::new(20, 20));
        assert_eq!(p.current_page, 2);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next_page);
        assert!(p.has_previous_page);

        let p = Pagination::new(45, PageRequest::new(20, 40));
        assert!(!p.has_next_page);
        assert_eq!(p.current_page, 3);

        let p = Pagination::new(0, PageRequest::new(20, 0));
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next_page && !p.has_previous_page);
    }

    #[test]
    fn zero_limit_returns_everything() {
        let page = Page::slice((0..5).collect(), PageRequest::new(0, 2));
        assert_eq!(page.data, vec![2, 3, 4]);
        assert_eq!(page.pagination.total, 5);
        assert_eq!(page.pagination.total_pages, 1);
        assert!(!page.pagination.has_next_page);
    }

    #[test]
    fn pagination_serializes_camel_case() {
        let json = serde_json::to_value(Pagination::new(3, PageRequest::new(2, 0))).unwrap();
        assert_eq!(json["hasNextPage"], true);
        assert_eq!(json["totalPages"], 2);
        assert_eq!(json["currentPage"], 1);
    }
}
