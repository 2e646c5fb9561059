//! Page-number pagination over an ordered result set.
//!
//! Pages are 1-based. The total count of the filtered set is computed once
//! per request and carried alongside the slice.

use serde::Serialize;

use crate::config::PaginationConfig;
use crate::error::{Error, Result};

/// A validated page request: `page >= 1`, `1 <= items_per_page <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub items_per_page: i64,
}

impl PageRequest {
    /// Apply defaults, reject non-positive values, and clamp the page size
    /// to the configured maximum.
    pub fn new(
        page: Option<i64>,
        items_per_page: Option<i64>,
        config: &PaginationConfig,
    ) -> Result<Self> {
        let page = page.unwrap_or(1);
        if page < 1 {
            return Err(Error::invalid_filter("page", page.to_string(), "must be >= 1"));
        }

        let items_per_page = items_per_page.unwrap_or(config.default_page_size);
        if items_per_page < 1 {
            return Err(Error::invalid_filter(
                "items_per_page",
                items_per_page.to_string(),
                "must be >= 1",
            ));
        }

        Ok(Self {
            page,
            items_per_page: items_per_page.min(config.max_page_size),
        })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.items_per_page)
    }

    pub fn limit(&self) -> i64 {
        self.items_per_page
    }
}

/// One page of results plus the size of the whole filtered set.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub items_per_page: i64,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn empty(request: PageRequest, total: i64) -> Self {
        Self {
            items: Vec::new(),
            page: request.page,
            items_per_page: request.items_per_page,
            total,
        }
    }

    pub fn total_pages(&self) -> i64 {
        total_pages(self.total, self.items_per_page)
    }
}

/// `ceil(total / page_size)`; zero when the set is empty.
pub fn total_pages(total: i64, page_size: i64) -> i64 {
    if total <= 0 || page_size <= 0 {
        0
    } else {
        (total + page_size - 1) / page_size
    }
}
