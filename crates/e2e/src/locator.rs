//! Paginated table search
//!
//! New or edited rows can land on any page (first when sorted by recency,
//! last when appended), so the locator scans forward from the current page
//! instead of jumping to a computed one. The scan is bounded by `max_pages`
//! advances to survive a pagination control that never disables or loops.
//!
//! ```text
//!   Scanning ──text contains target──▶ Found
//!      │  ▲
//!      │  └── enabled Next: activate, settle
//!      └── no enabled Next / bound reached ──▶ Exhausted
//! ```

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::snippet;
use crate::error::{E2eError, E2eResult};
use crate::page::{PageSurface, RowHandle};

/// Labels a "next page" control may carry
pub const NEXT_LABELS: [&str; 3] = ["Next", "»", "›"];

/// Label of the "last page" control
pub const LAST_LABELS: [&str; 1] = ["Last"];

/// Default bound on pagination advances
pub const DEFAULT_MAX_PAGES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Scanning,
    Found,
    Exhausted,
}

/// Transient state of one search
#[derive(Debug, Clone)]
pub struct TableSearchState {
    pub target_value: String,
    /// Zero-based index of the page being examined, relative to the start page
    pub current_page_index: usize,
    /// Pages examined so far
    pub visited_pages: usize,
    pub state: SearchState,
}

impl TableSearchState {
    fn new(target: &str) -> Self {
        Self {
            target_value: target.to_string(),
            current_page_index: 0,
            visited_pages: 0,
            state: SearchState::Scanning,
        }
    }

    /// Number of pagination controls activated
    pub fn advances(&self) -> usize {
        self.current_page_index
    }
}

/// Where the target was found
#[derive(Debug, Clone)]
pub struct LocatedRow {
    /// Page index relative to the start page
    pub page_index: usize,
    /// Pagination advances performed
    pub advances: usize,
    /// First matching table row in document order, if the match was in a row
    pub row: Option<RowHandle>,
}

#[derive(Debug, Clone)]
pub struct PaginatedTableLocator {
    max_pages: usize,
    page_settle: Duration,
}

impl Default for PaginatedTableLocator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAGES, Duration::from_millis(500))
    }
}

impl PaginatedTableLocator {
    pub fn new(max_pages: usize, page_settle: Duration) -> Self {
        Self {
            max_pages,
            page_settle,
        }
    }

    /// Scan forward from the current page until `target` is visible
    pub async fn locate<P: PageSurface + ?Sized>(
        &self,
        page: &mut P,
        target: &str,
    ) -> E2eResult<LocatedRow> {
        let mut search = TableSearchState::new(target);

        while search.state == SearchState::Scanning {
            search.visited_pages += 1;
            let text = page.body_text().await?;

            if text.contains(target) {
                search.state = SearchState::Found;
                break;
            }

            if search.advances() >= self.max_pages {
                warn!(
                    "Stopped looking for '{}' after {} page advances",
                    target,
                    search.advances()
                );
                search.state = SearchState::Exhausted;
                break;
            }

            match page.find_control(&NEXT_LABELS).await? {
                Some(next) if next.is_enabled() => {
                    debug!(
                        "'{}' not on page {}, activating '{}'",
                        target, search.current_page_index, next.label
                    );
                    page.activate(&next).await?;
                    page.wait_for_settle(self.page_settle).await?;
                    search.current_page_index += 1;
                }
                _ => {
                    search.state = SearchState::Exhausted;
                }
            }
        }

        if search.state == SearchState::Exhausted {
            // One last look at the final page so the failure shows what was rendered
            let last_page_text = page.body_text().await?;
            if !last_page_text.contains(target) {
                return Err(E2eError::PaginationExhausted {
                    target: target.to_string(),
                    pages_visited: search.visited_pages,
                    last_page_text: snippet(&last_page_text, 500),
                });
            }
        }

        let row = page.rows_containing(target).await?.into_iter().next();
        info!(
            "Found '{}' on page {} after {} advance(s)",
            target,
            search.current_page_index,
            search.advances()
        );
        Ok(LocatedRow {
            page_index: search.current_page_index,
            advances: search.advances(),
            row,
        })
    }

    /// Locate the row for `target` and click `selector` inside it
    pub async fn locate_and_click<P: PageSurface + ?Sized>(
        &self,
        page: &mut P,
        target: &str,
        selector: &str,
    ) -> E2eResult<LocatedRow> {
        let located = self.locate(page, target).await?;
        let row = located.row.as_ref().ok_or_else(|| {
            E2eError::AssertionFailed(format!(
                "'{}' is on the page but not inside a table row",
                target
            ))
        })?;
        page.click_in_row(row, selector).await?;
        Ok(located)
    }

    /// Move to the last page: `Last` when available, else `Next` until disabled
    ///
    /// Returns the number of controls activated.
    pub async fn go_to_last_page<P: PageSurface + ?Sized>(&self, page: &mut P) -> E2eResult<usize> {
        if let Some(last) = page.find_control(&LAST_LABELS).await? {
            if last.is_enabled() {
                page.activate(&last).await?;
                page.wait_for_settle(self.page_settle).await?;
                return Ok(1);
            }
        }

        let mut clicks = 0;
        while clicks < self.max_pages {
            match page.find_control(&NEXT_LABELS).await? {
                Some(next) if next.is_enabled() => {
                    page.activate(&next).await?;
                    page.wait_for_settle(self.page_settle).await?;
                    clicks += 1;
                }
                _ => break,
            }
        }
        Ok(clicks)
    }
}
