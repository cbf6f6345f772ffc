//! # Pagination
//!
//! Offset pagination shared by the history queries.

use serde::{Deserialize, Serialize};

/// Requested window into an ordered result set.
///
/// A `limit` of zero means "use the configured default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
}

impl PageRequest {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// Resolve the default limit and cap it at `max`.
    pub fn clamp(self, default_limit: usize, max_limit: usize) -> Self {
        let limit = if self.limit == 0 {
            default_limit
        } else {
            self.limit
        };
        Self {
            limit: limit.min(max_limit),
            offset: self.offset,
        }
    }
}

/// One page of an ordered result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of matching records before pagination.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

impl<T> Page<T> {
    /// Slice an already-ordered, already-filtered result set.
    pub fn from_ordered(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len();
        let items = all
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();
        Self {
            items,
            total,
            limit: request.limit,
            offset: request.offset,
        }
    }

    /// Whether records exist beyond this page.
    pub fn has_more(&self) -> bool {
        self.offset + self.items.len() < self.total
    }
}
