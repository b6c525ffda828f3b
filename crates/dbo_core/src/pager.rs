//! Page-number pagination.
//!
//! # Invariants
//! - Pages are 1-based.
//! - A pager is enabled iff both `page` and `page_size` are non-zero; a
//!   disabled pager never constrains a query.

use serde::{Deserialize, Serialize};

/// Page / page-size pair convertible to an offset/limit window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pager {
    pub page: u32,
    pub page_size: u32,
}

impl Pager {
    /// Explicitly disabled pager.
    pub const NONE: Pager = Pager {
        page: 0,
        page_size: 0,
    };

    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    /// Returns whether paging applies.
    pub fn is_enabled(&self) -> bool {
        self.page != 0 && self.page_size != 0
    }

    /// Returns `(offset, limit)`.
    pub fn offset(&self) -> (u64, u64) {
        let size = u64::from(self.page_size);
        (u64::from(self.page.saturating_sub(1)) * size, size)
    }

    /// Returns the inclusive row range `[start, end]` covered by this page.
    pub fn range(&self) -> (u64, u64) {
        let size = u64::from(self.page_size);
        let start = u64::from(self.page.saturating_sub(1)) * size;
        let end = (u64::from(self.page) * size).saturating_sub(1);
        (start, end)
    }

    /// Returns the number of pages needed to hold `total` rows.
    pub fn total_pages(&self, total: u64) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        total.div_ceil(u64::from(self.page_size))
    }
}
