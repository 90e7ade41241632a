//! Offset-based pagination.
//!
//! This module provides:
//! - Page/per_page parameter handling with clamping
//! - Page metadata computation from a total count
//! - Slicing of in-memory result sets

use serde::{Deserialize, Serialize};

use crate::error::{HiveError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Page Metadata
// ═══════════════════════════════════════════════════════════════════════════════

/// Metadata about a paginated result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// Current page number (1-indexed), clamped to the last page.
    pub page: u64,
    pub per_page: u64,
    pub total_items: u64,
    /// At least 1, even when there are no items.
    pub total_pages: u64,
    pub has_previous: bool,
    pub has_next: bool,
}

impl PageMetadata {
    pub fn new(page: u64, per_page: u64, total_items: u64) -> Self {
        let per_page = per_page.max(1);
        let total_pages = total_items.div_ceil(per_page).max(1);
        let page = page.clamp(super::MIN_PAGE_NUMBER, total_pages);

        Self {
            page,
            per_page,
            total_items,
            total_pages,
            has_previous: page > 1,
            has_next: page < total_pages,
        }
    }

    pub fn previous_page(&self) -> Option<u64> {
        self.has_previous.then(|| self.page - 1)
    }

    pub fn next_page(&self) -> Option<u64> {
        self.has_next.then(|| self.page + 1)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Offset Pagination
// ═══════════════════════════════════════════════════════════════════════════════

/// Requested page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetPagination {
    /// Page number (1-indexed).
    pub page: u64,
    /// Number of items per page.
    pub per_page: u64,
}

impl OffsetPagination {
    /// Create a pagination, clamping `page` to at least 1 and `per_page` to
    /// `1..=MAX_PAGE_SIZE`.
    pub fn new(page: u64, per_page: u64) -> Self {
        Self {
            page: page.max(super::MIN_PAGE_NUMBER),
            per_page: per_page.clamp(1, super::MAX_PAGE_SIZE),
        }
    }

    /// Build from optional query values without clamping, rejecting values
    /// outside the allowed range.
    pub fn from_query(page: Option<u64>, per_page: Option<u64>) -> Result<Self> {
        let pagination = Self {
            page: page.unwrap_or(super::MIN_PAGE_NUMBER),
            per_page: per_page.unwrap_or(super::DEFAULT_PAGE_SIZE),
        };
        pagination.validate()?;
        Ok(pagination)
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }

    pub fn limit(&self) -> u64 {
        self.per_page
    }

    pub fn metadata(&self, total_items: u64) -> PageMetadata {
        PageMetadata::new(self.page, self.per_page, total_items)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page < super::MIN_PAGE_NUMBER {
            return Err(HiveError::invalid_input("page", "page must be at least 1"));
        }
        if self.per_page < 1 {
            return Err(HiveError::invalid_input("per_page", "per_page must be at least 1"));
        }
        if self.per_page > super::MAX_PAGE_SIZE {
            return Err(HiveError::invalid_input(
                "per_page",
                format!("per_page cannot exceed {}", super::MAX_PAGE_SIZE),
            ));
        }
        Ok(())
    }

    /// Items of this page from `iter`.
    pub fn paginate_iter<T, I: Iterator<Item = T>>(&self, iter: I) -> Vec<T> {
        let offset = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        iter.skip(offset)
            .take(self.per_page as usize)
            .collect()
    }
}

impl Default for OffsetPagination {
    fn default() -> Self {
        Self {
            page: super::MIN_PAGE_NUMBER,
            per_page: super::DEFAULT_PAGE_SIZE,
        }
    }
}
