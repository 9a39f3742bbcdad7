/// Pagination cursor for one category's page loop
///
/// The loop is self-terminating: a page shorter than the page size (including
/// an empty page) ends it, and so does a full page that lists nothing new.
/// Total counts reported by the API are advisory and never end the loop on
/// their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlCursor {
    /// Category being paginated
    pub category_id: String,

    /// 1-based page number of the next page to fetch
    pub page: u32,

    /// Whether the API has reported an advisory total for this category
    pub total_pages_known: bool,

    advisory_total: Option<u64>,
    finished: bool,
}

impl CrawlCursor {
    pub fn new(category_id: impl Into<String>) -> Self {
        Self {
            category_id: category_id.into(),
            page: 1,
            total_pages_known: false,
            advisory_total: None,
            finished: false,
        }
    }

    /// Records the outcome of the current page and moves to the next one
    ///
    /// Returns `true` if another page must be fetched. A page holding exactly
    /// `page_size` records requires one more fetch to confirm the end, unless
    /// none of its records were new. APIs that clamp out-of-range page numbers
    /// keep serving their last page.
    pub fn advance(
        &mut self,
        records_on_page: usize,
        new_records: usize,
        page_size: u32,
    ) -> bool {
        if self.finished {
            return false;
        }

        if records_on_page == 0 || records_on_page < page_size as usize || new_records == 0 {
            self.finished = true;
            return false;
        }

        self.page += 1;
        true
    }

    /// Stores an advisory item total reported alongside a page
    pub fn set_advisory_total(&mut self, total: u64) {
        self.advisory_total = Some(total);
        self.total_pages_known = true;
    }

    /// Page count implied by the advisory total, if one was reported
    pub fn advisory_pages(&self, page_size: u32) -> Option<u64> {
        let page_size = u64::from(page_size.max(1));
        self.advisory_total
            .map(|total| total.div_ceil(page_size).max(1))
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
