//! Pagination utilities for the control API's entity views.
//!
//! This module provides:
//! - Offset-based pagination over in-memory snapshots
//! - Sort direction parsing for `order=asc|desc`
//! - A paginated response wrapper carrying page metadata
//!
//! # Usage
//!
//! ```rust,ignore
//! use taskhive_core::pagination::{OffsetPagination, PaginatedResponse};
//!
//! let pagination = OffsetPagination::new(2, 20);
//! let total = tasks.len() as u64;
//! let page = PaginatedResponse::new(pagination.paginate_iter(tasks.into_iter()), pagination.metadata(total));
//! ```

mod offset;
mod response;
mod sort;

pub use offset::{OffsetPagination, PageMetadata};
pub use response::{PageInfo, PaginatedResponse};
pub use sort::SortDirection;

/// Default page size if not specified.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Maximum allowed page size.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Minimum page number (1-indexed).
pub const MIN_PAGE_NUMBER: u64 = 1;
