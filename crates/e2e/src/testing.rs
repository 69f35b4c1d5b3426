//! In-memory page used by unit tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::E2eResult;
use crate::page::{ControlState, PageSurface, PaginationControl, RowHandle};

/// A paged table with a Next control (and optionally Last)
#[derive(Debug, Default)]
pub(crate) struct PagedTable {
    pages: Vec<Vec<String>>,
    current: usize,
    activations: usize,
    circular: bool,
    aria_disabled_next: bool,
    last_link: bool,
    url: String,
    extra_text: String,
    controls: HashMap<String, Vec<ControlState>>,
    row_clicks: Vec<(usize, usize, String)>,
    clicks: Vec<String>,
    accepted_user: Option<String>,
    filled_user: Option<String>,
    rejected_url: Option<String>,
}

impl PagedTable {
    pub(crate) fn new(pages: Vec<Vec<&str>>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|rows| rows.into_iter().map(str::to_string).collect())
                .collect(),
            url: "http://localhost:3000/ui/plants".to_string(),
            ..Default::default()
        }
    }

    /// Next never disables and wraps to the first page
    pub(crate) fn circular(mut self) -> Self {
        self.circular = true;
        self
    }

    pub(crate) fn aria_disabled_next(mut self) -> Self {
        self.aria_disabled_next = true;
        self
    }

    pub(crate) fn with_last_link(mut self) -> Self {
        self.last_link = true;
        self
    }

    pub(crate) fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub(crate) fn with_text(mut self, text: &str) -> Self {
        self.extra_text = text.to_string();
        self
    }

    pub(crate) fn with_controls(mut self, selector: &str, states: Vec<ControlState>) -> Self {
        self.controls.insert(selector.to_string(), states);
        self
    }

    /// Submitting the login form as `username` leaves the login page
    pub(crate) fn accepting_login(mut self, username: &str) -> Self {
        self.accepted_user = Some(username.to_string());
        self
    }

    /// A refused login submit lands on `url` instead of staying put
    pub(crate) fn rejecting_login_to(mut self, url: &str) -> Self {
        self.rejected_url = Some(url.to_string());
        self
    }

    pub(crate) fn activations(&self) -> usize {
        self.activations
    }

    pub(crate) fn current_page(&self) -> usize {
        self.current
    }

    pub(crate) fn row_clicks(&self) -> Vec<(usize, usize, String)> {
        self.row_clicks.clone()
    }

    pub(crate) fn clicks(&self) -> Vec<String> {
        self.clicks.clone()
    }

    fn on_last_page(&self) -> bool {
        self.current + 1 >= self.pages.len()
    }

    fn rows(&self) -> &[String] {
        self.pages.get(self.current).map(Vec::as_slice).unwrap_or(&[])
    }

    fn page_controls(&self) -> Vec<PaginationControl> {
        let mut controls = vec![PaginationControl {
            label: "Next".to_string(),
            index: 0,
            class_disabled: false,
            parent_disabled: !self.circular && self.on_last_page(),
            aria_disabled: self.aria_disabled_next,
        }];
        if self.last_link {
            controls.push(PaginationControl {
                label: "Last".to_string(),
                index: 1,
                class_disabled: false,
                parent_disabled: self.on_last_page(),
                aria_disabled: false,
            });
        }
        controls
    }
}

#[async_trait]
impl PageSurface for PagedTable {
    async fn goto(&mut self, path: &str) -> E2eResult<()> {
        self.url = format!("http://localhost:3000{}", path);
        self.current = 0;
        Ok(())
    }

    async fn current_url(&mut self) -> E2eResult<String> {
        Ok(self.url.clone())
    }

    async fn body_text(&mut self) -> E2eResult<String> {
        Ok(format!("{}\n{}\nPrevious 1 2 Next", self.extra_text, self.rows().join("\n")))
    }

    async fn find_control(&mut self, labels: &[&str]) -> E2eResult<Option<PaginationControl>> {
        Ok(self
            .page_controls()
            .into_iter()
            .find(|c| labels.contains(&c.label.as_str())))
    }

    async fn activate(&mut self, control: &PaginationControl) -> E2eResult<()> {
        self.activations += 1;
        let last = self.pages.len().saturating_sub(1);
        self.current = match control.label.as_str() {
            "Last" => last,
            _ if self.circular => (self.current + 1) % self.pages.len().max(1),
            _ => (self.current + 1).min(last),
        };
        Ok(())
    }

    async fn wait_for_settle(&mut self, _settle: Duration) -> E2eResult<()> {
        Ok(())
    }

    async fn rows_containing(&mut self, text: &str) -> E2eResult<Vec<RowHandle>> {
        Ok(self
            .rows()
            .iter()
            .enumerate()
            .filter(|(_, row)| row.contains(text))
            .map(|(index, row)| RowHandle {
                index,
                text: row.clone(),
            })
            .collect())
    }

    async fn click_in_row(&mut self, row: &RowHandle, selector: &str) -> E2eResult<()> {
        self.row_clicks.push((self.current, row.index, selector.to_string()));
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> E2eResult<()> {
        if selector.contains("username") {
            self.filled_user = Some(value.to_string());
        }
        self.clicks.push(format!("fill {} {}", selector, value));
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> E2eResult<()> {
        self.clicks.push(format!("click {}", selector));
        if !selector.contains("submit") {
            return Ok(());
        }
        if self.accepted_user.is_some() && self.filled_user == self.accepted_user {
            self.url = "http://localhost:3000/ui/dashboard".to_string();
        } else if let Some(rejected) = &self.rejected_url {
            self.url = rejected.clone();
        }
        Ok(())
    }

    async fn control_states(&mut self, selector: &str) -> E2eResult<Vec<ControlState>> {
        Ok(self.controls.get(selector).cloned().unwrap_or_default())
    }
}
