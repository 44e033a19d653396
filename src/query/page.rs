//! Offset/limit page descriptor

use crate::error::{Result, SearchError};
use serde::{Deserialize, Serialize};

/// A window `[offset, offset + limit)` over an ordered result set.
///
/// `limit` is always at least 1. Pages are plain values: advancing through a
/// result set produces new pages via [`Page::next`] instead of mutating one in
/// place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPage")]
pub struct Page {
    offset: u64,
    limit: u64,
}

#[derive(Deserialize)]
struct RawPage {
    #[serde(default)]
    offset: u64,
    limit: u64,
}

impl TryFrom<RawPage> for Page {
    type Error = SearchError;

    fn try_from(raw: RawPage) -> Result<Self> {
        Page::new(raw.offset, raw.limit)
    }
}

impl Page {
    /// Create a page, rejecting a zero limit
    pub fn new(offset: u64, limit: u64) -> Result<Self> {
        if limit == 0 {
            return Err(SearchError::InvalidPage(format!(
                "limit must be positive (offset {})",
                offset
            )));
        }
        Ok(Self { offset, limit })
    }

    /// First page of the given size
    pub fn first(limit: u64) -> Result<Self> {
        Self::new(0, limit)
    }

    /// Page for a 1-indexed page number; page 0 is treated as page 1
    pub fn from_number(pageno: u64, per_page: u64) -> Result<Self> {
        let index = pageno.max(1) - 1;
        Self::new(index.saturating_mul(per_page), per_page)
    }

    /// The page used for single-entity lookups
    pub fn single() -> Self {
        Self { offset: 0, limit: 1 }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Exclusive end of the window
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.limit)
    }

    /// 1-indexed number of this page when pages are aligned to `limit`
    pub fn number(&self) -> u64 {
        self.offset / self.limit + 1
    }

    /// The following page of the same size
    pub fn next(&self) -> Self {
        Self {
            offset: self.end(),
            limit: self.limit,
        }
    }

    /// Same offset with the limit forced into `[min, max]`
    pub fn clamp_limit(&self, min: u64, max: u64) -> Self {
        let min = min.max(1);
        let max = max.max(min);
        Self {
            offset: self.offset,
            limit: self.limit.clamp(min, max),
        }
    }

    /// Whether `total` matching rows leave anything beyond this page
    pub fn has_more(&self, total: u64) -> bool {
        self.end() < total
    }

    /// Number of rows this page can hold out of `total`
    pub fn expected_len(&self, total: u64) -> u64 {
        total.saturating_sub(self.offset).min(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: crate::DEFAULT_PAGE_LIMIT,
        }
    }
}
