// src/utils/pagination.rs
use serde::{Deserialize, Serialize};

use crate::utils::constants::{DEFAULT_PAGE, DEFAULT_PER_PAGE, MAX_PER_PAGE};

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub current_page: usize,
    pub per_page: usize,
    pub total_pages: usize,
    pub total_jobs: usize,
    pub has_previous: bool,
    pub has_next: bool,
}

impl Pagination {
    pub fn new(page: usize, per_page: usize, total: usize) -> Self {
        let total_pages = total.div_ceil(per_page.max(1));

        Pagination {
            current_page: page,
            per_page,
            total_pages,
            total_jobs: total,
            has_previous: page > 1,
            has_next: page < total_pages,
        }
    }

    pub fn offset(&self) -> usize {
        (self.current_page.saturating_sub(1)) * self.per_page
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    pub filter: Option<String>,
}

impl PageQuery {
    pub fn page(&self) -> usize {
        self.page.unwrap_or(DEFAULT_PAGE).max(1)
    }

    pub fn per_page(&self) -> usize {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    /// Filter string, with blank treated as absent.
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref().filter(|f| !f.trim().is_empty())
    }
}

/// Slice one page out of an already sorted list.
pub fn slice_page<T>(items: Vec<T>, page: usize, per_page: usize) -> (Vec<T>, Pagination) {
    let pagination = Pagination::new(page, per_page, items.len());

    let paged = items
        .into_iter()
        .skip(pagination.offset())
        .take(per_page)
        .collect();

    (paged, pagination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        let p = Pagination::new(2, 50, 101);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_previous);
        assert!(p.has_next);
    }

    #[test]
    fn empty_list_has_no_pages() {
        let p = Pagination::new(1, 25, 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_previous);
        assert!(!p.has_next);
    }

    #[test]
    fn pages_concatenate_to_full_list() {
        let items: Vec<usize> = (0..47).collect();
        let mut seen = Vec::new();
        for page in 1..=5 {
            let (chunk, p) = slice_page(items.clone(), page, 10);
            assert_eq!(p.total_pages, 5);
            seen.extend(chunk);
        }
        assert_eq!(seen, items);
    }

    #[test]
    fn per_page_is_clamped() {
        let q = PageQuery {
            page: Some(0),
            per_page: Some(500),
            filter: Some("  ".into()),
        };
        assert_eq!(q.page(), 1);
        assert_eq!(q.per_page(), 100);
        assert!(q.filter().is_none());
    }
}
