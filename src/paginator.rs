//! Paginator - Page/offset bookkeeping for paginated finds.

/// Tracks the current page and page size, clamping the page to the last
/// valid one once the total is known. Requesting an out-of-range page
/// therefore yields the last page's results rather than an empty set.
#[derive(Debug, Clone)]
pub struct Paginator {
    page: u64,
    per_page: u64,
    total: Option<u64>,
}

impl Paginator {
    /// Pages are 1-based; a page or page size of zero is treated as one.
    pub fn new(page: u64, per_page: u64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
            total: None,
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Number of pages, once the total is known. At least one even when
    /// there are no results.
    pub fn pages(&self) -> Option<u64> {
        self.total.map(|t| (t.div_ceil(self.per_page)).max(1))
    }

    /// Records the total match count and clamps the current page to the
    /// last valid page.
    pub fn set_total(&mut self, total: u64) {
        self.total = Some(total);
        if let Some(pages) = self.pages() {
            self.page = self.page.min(pages);
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> u64 {
        self.per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_total_clamps_out_of_range_page() {
        let mut p = Paginator::new(5, 10);
        assert_eq!(p.offset(), 40);
        p.set_total(25);
        assert_eq!(p.page(), 3);
        assert_eq!(p.offset(), 20);
    }

    #[test]
    fn in_range_page_is_untouched() {
        let mut p = Paginator::new(2, 10);
        p.set_total(25);
        assert_eq!(p.page(), 2);
        assert_eq!(p.offset(), 10);
    }

    #[test]
    fn empty_result_clamps_to_first_page() {
        let mut p = Paginator::new(4, 10);
        p.set_total(0);
        assert_eq!(p.page(), 1);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn zero_inputs_are_coerced() {
        let p = Paginator::new(0, 0);
        assert_eq!(p.page(), 1);
        assert_eq!(p.limit(), 1);
    }
}
