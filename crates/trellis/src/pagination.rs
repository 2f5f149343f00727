//! Page/size pagination over audit history.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Page number used when the caller gives none.
pub const DEFAULT_PAGE: u32 = 1;

/// Page size used when the caller gives none.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Largest accepted page size.
pub const MAX_PAGE_SIZE: u32 = 20;

/// A validated page request. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    size: u32,
}

impl PageRequest {
    /// Build a page request, rejecting out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPagination`] if `page` is 0 or `size` is
    /// outside `1..=20`.
    pub fn new(page: u32, size: u32) -> Result<Self> {
        if page < 1 {
            return Err(Error::InvalidPagination(format!(
                "page must be at least 1 (got {page})"
            )));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&size) {
            return Err(Error::InvalidPagination(format!(
                "size must be between 1 and {MAX_PAGE_SIZE} (got {size})"
            )));
        }
        Ok(Self { page, size })
    }

    /// Build from optional query values, applying defaults.
    ///
    /// # Errors
    ///
    /// See [`PageRequest::new`].
    pub fn from_optional(page: Option<u32>, size: Option<u32>) -> Result<Self> {
        Self::new(
            page.unwrap_or(DEFAULT_PAGE),
            size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
    }

    /// 1-based page number.
    #[must_use]
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Items per page.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Number of items to skip.
    #[must_use]
    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.size as usize
    }

    /// Cut one page out of an already ordered list.
    #[must_use]
    pub fn slice<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len();
        let page_items: Vec<T> = items
            .into_iter()
            .skip(self.offset())
            .take(self.size as usize)
            .collect();
        Page {
            items: page_items,
            page: self.page,
            size: self.size,
            total,
            total_pages: total_pages(total, self.size),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of results with the totals needed to navigate the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page; empty past the end.
    pub items: Vec<T>,

    /// Requested page.
    pub page: u32,

    /// Requested size.
    pub size: u32,

    /// Total number of items across all pages.
    pub total: usize,

    /// `ceil(total / size)`, 0 when there are no items.
    pub total_pages: usize,
}

impl<T> Page<T> {
    /// Transform the items while keeping the page metadata.
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total: self.total,
            total_pages: self.total_pages,
        }
    }
}

fn total_pages(total: usize, size: u32) -> usize {
    total.div_ceil(size as usize)
}
