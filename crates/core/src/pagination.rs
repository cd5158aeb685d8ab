//! Limit/page pagination shared by every listing

use serde::{Deserialize, Serialize};

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    /// Smallest first
    #[default]
    Ascending,
    /// Largest first
    Descending,
}

/// Limit/page pair; pages are 1-based and page `0` means the first page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    /// Page size; unlimited when `None`
    pub limit: Option<usize>,
    /// 1-based page; first page when `None`
    pub page: Option<usize>,
}

impl Pagination {
    /// Pagination with both values set
    pub fn new(limit: usize, page: usize) -> Self {
        Pagination {
            limit: Some(limit),
            page: Some(page),
        }
    }

    /// No pagination
    pub fn unlimited() -> Self {
        Pagination::default()
    }

    /// Index of the first item on the page
    pub fn offset(&self) -> usize {
        match self.limit {
            Some(limit) => self.page.unwrap_or(1).saturating_sub(1).saturating_mul(limit),
            None => 0,
        }
    }

    /// Select the page out of an already filtered and sorted list
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = self.offset();
        let take = self.limit.unwrap_or(usize::MAX);
        items.into_iter().skip(offset).take(take).collect()
    }
}

/// One page of a listing plus the size of the whole filtered set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Number of items matching before pagination
    pub count: usize,
    /// Items on this page
    pub items: Vec<T>,
}

impl<T> Page<T> {
    /// Paginate a filtered, sorted list
    pub fn paginate(items: Vec<T>, pagination: Pagination) -> Self {
        let count = items.len();
        Page {
            count,
            items: pagination.apply(items),
        }
    }
}
