//! Paginated response types.

use serde::{Deserialize, Serialize};

use super::offset::PageMetadata;

/// Page information attached to a paginated response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Current page number (1-indexed).
    pub current_page: u64,
    pub per_page: u64,
    pub total_items: u64,
    pub total_pages: u64,
    pub has_previous_page: bool,
    pub has_next_page: bool,
}

impl From<PageMetadata> for PageInfo {
    fn from(meta: PageMetadata) -> Self {
        Self {
            current_page: meta.page,
            per_page: meta.per_page,
            total_items: meta.total_items,
            total_pages: meta.total_pages,
            has_previous_page: meta.has_previous,
            has_next_page: meta.has_next,
        }
    }
}

/// A page of items with its pagination information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, meta: PageMetadata) -> Self {
        Self {
            data,
            pagination: meta.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.pagination.has_next_page
    }

    pub fn map<U, F>(self, f: F) -> PaginatedResponse<U>
    where
        F: FnMut(T) -> U,
    {
        PaginatedResponse {
            data: self.data.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}
