//! Page results

use serde::Serialize;

/// One materialized page of a read, with its metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<R> {
    /// The page's rows, in resolved order
    pub items: Vec<R>,

    /// Total number of rows matching the filters, ignoring paging
    pub total_count: u64,

    /// Current page number (starts at 1)
    pub page_number: usize,

    /// Requested page size, `0` when unbounded
    pub page_size: usize,

    pub has_previous: bool,
    pub has_next: bool,
}

impl<R> Page<R> {
    /// Build the page from the normalized paging bounds that produced `items`
    pub fn new(items: Vec<R>, total_count: u64, skip: Option<usize>, take: Option<usize>) -> Self {
        let skip = skip.unwrap_or(0);
        let page_size = take.unwrap_or(0);
        let page_number = if page_size == 0 {
            1
        } else {
            skip / page_size + 1
        };
        let seen = (skip + items.len()) as u64;

        Self {
            has_previous: skip > 0,
            has_next: seen < total_count,
            items,
            total_count,
            page_number,
            page_size,
        }
    }

    /// Number of pages of `page_size` rows, `1` for an unbounded page
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return u64::from(self.total_count > 0);
        }
        self.total_count.div_ceil(self.page_size as u64)
    }

    pub fn map<U>(self, f: impl FnMut(R) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            page_number: self.page_number,
            page_size: self.page_size,
            has_previous: self.has_previous,
            has_next: self.has_next,
        }
    }
}
