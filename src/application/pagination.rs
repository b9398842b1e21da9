//! 1-indexed pagination

use serde::Serialize;

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        }
    }

    pub fn skip(&self) -> u64 { u64::from(self.page - 1) * u64::from(self.limit) }
}

impl Default for PageRequest {
    fn default() -> Self { Self::new(None, None) }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub request: PageRequest,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 { self.total.div_ceil(u64::from(self.request.limit)) }
    pub fn has_next(&self) -> bool { u64::from(self.request.page) < self.total_pages() }
    pub fn has_prev(&self) -> bool { self.request.page > 1 }

    pub fn meta(&self) -> PageMeta {
        PageMeta {
            current_page: self.request.page,
            limit: self.request.limit,
            total_pages: self.total_pages(),
            total: self.total,
            has_next: self.has_next(),
            has_prev: self.has_prev(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub current_page: u32,
    pub limit: u32,
    pub total_pages: u64,
    pub total: u64,
    pub has_next: bool,
    pub has_prev: bool,
}
