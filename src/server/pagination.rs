//! Pagination envelope for list endpoints.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 200;

/// Query parameters accepted by paginated endpoints: `?page=2&page_size=25`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl PageParams {
    pub fn page(&self) -> usize {
        self.page.unwrap_or(0)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn limit_offset(&self) -> (usize, usize) {
        let size = self.page_size();
        (size, self.page().saturating_mul(size))
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, params: &PageParams, total: usize) -> Self {
        Self {
            items,
            page: params.page(),
            page_size: params.page_size(),
            total,
        }
    }
}
