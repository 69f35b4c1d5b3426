//! Page helpers for the nursery UI

use std::time::Duration;
use tracing::{info, warn};

use crate::config::Credentials;
use crate::error::{E2eError, E2eResult};
use crate::page::PageSurface;

pub const LOGIN_PATH: &str = "/ui/login";

/// Marker the application puts in the URL of a refused login
const LOGIN_ERROR_MARKER: &str = "error";

/// The login form
#[derive(Debug, Clone)]
pub struct LoginPage {
    pub username_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    settle: Duration,
}

impl Default for LoginPage {
    fn default() -> Self {
        Self {
            username_selector: "input[name=\"username\"]".to_string(),
            password_selector: "input[name=\"password\"]".to_string(),
            submit_selector: "button[type=\"submit\"]".to_string(),
            settle: Duration::from_millis(500),
        }
    }
}

impl LoginPage {
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Submit the form once; true when the browser left the login page
    /// for anything other than an error page
    pub async fn login<P: PageSurface + ?Sized>(
        &self,
        page: &mut P,
        credentials: &Credentials,
    ) -> E2eResult<bool> {
        page.goto(LOGIN_PATH).await?;
        page.fill(&self.username_selector, &credentials.username).await?;
        page.fill(&self.password_selector, &credentials.password).await?;
        page.click(&self.submit_selector).await?;
        page.wait_for_settle(self.settle).await?;

        let url = page.current_url().await?;
        Ok(!url.contains(LOGIN_PATH) && !url.contains(LOGIN_ERROR_MARKER))
    }

    /// Try `candidates` in order, then `fallback` when given
    ///
    /// Returns the credentials that logged in.
    pub async fn login_first_working<P: PageSurface + ?Sized>(
        &self,
        page: &mut P,
        candidates: &[Credentials],
        fallback: Option<&Credentials>,
    ) -> E2eResult<Credentials> {
        for credentials in candidates {
            if self.login(page, credentials).await? {
                info!("UI login as '{}'", credentials.username);
                return Ok(credentials.clone());
            }
        }

        if let Some(fallback) = fallback {
            warn!(
                "UI login failed for {} candidate(s), falling back to '{}'",
                candidates.len(),
                fallback.username
            );
            if self.login(page, fallback).await? {
                return Ok(fallback.clone());
            }
        }

        Err(E2eError::AssertionFailed(format!(
            "UI login failed for every candidate ({})",
            candidates
                .iter()
                .map(|c| c.username.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}
