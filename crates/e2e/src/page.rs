//! The DOM surface consumed by UI checks
//!
//! Implemented by [`crate::playwright::PlaywrightSession`] for real browsers
//! and by in-memory tables in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::E2eResult;

/// A link or button found by its visible label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationControl {
    /// Trimmed visible text
    pub label: String,
    /// Position among the page's links and buttons, used to activate it
    pub index: usize,
    /// `disabled` class on the control itself
    #[serde(default)]
    pub class_disabled: bool,
    /// `disabled` class on the enclosing `<li>`
    #[serde(default)]
    pub parent_disabled: bool,
    /// `aria-disabled="true"`
    #[serde(default)]
    pub aria_disabled: bool,
}

impl PaginationControl {
    pub fn is_enabled(&self) -> bool {
        !(self.class_disabled || self.parent_disabled || self.aria_disabled)
    }
}

/// A table row located by its text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowHandle {
    /// Position among the page's `table tbody tr` rows
    pub index: usize,
    pub text: String,
}

/// State of a form control matched by a selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlState {
    pub tag: String,
    #[serde(default)]
    pub text: String,
    /// `disabled` property or `aria-disabled="true"`
    pub disabled: bool,
}

#[async_trait]
pub trait PageSurface: Send {
    async fn goto(&mut self, path: &str) -> E2eResult<()>;

    async fn current_url(&mut self) -> E2eResult<String>;

    /// Visible text of `<body>`
    async fn body_text(&mut self) -> E2eResult<String>;

    /// First link or button whose trimmed text equals one of `labels`
    async fn find_control(&mut self, labels: &[&str]) -> E2eResult<Option<PaginationControl>>;

    async fn activate(&mut self, control: &PaginationControl) -> E2eResult<()>;

    /// Wait for the page to settle after navigation or a table re-render
    async fn wait_for_settle(&mut self, settle: Duration) -> E2eResult<()>;

    /// Table body rows whose text contains `text`, in document order
    async fn rows_containing(&mut self, text: &str) -> E2eResult<Vec<RowHandle>>;

    /// Click the first element matching `selector` inside `row`
    async fn click_in_row(&mut self, row: &RowHandle, selector: &str) -> E2eResult<()>;

    async fn fill(&mut self, selector: &str, value: &str) -> E2eResult<()>;

    async fn click(&mut self, selector: &str) -> E2eResult<()>;

    /// Every element matching `selector`
    async fn control_states(&mut self, selector: &str) -> E2eResult<Vec<ControlState>>;
}
