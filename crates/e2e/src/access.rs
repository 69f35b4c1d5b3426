//! Role-based access assertions
//!
//! When a non-privileged session reaches a privileged page or mutation, one
//! of the accepted denial outcomes must be observed; anything else fails as a
//! security-control violation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::api::{snippet, ApiResponse};
use crate::auth::Role;
use crate::error::{E2eError, E2eResult};
use crate::page::{ControlState, PageSurface};

static ERROR_PAGE_INDICATORS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b40[13]\b|forbidden|access denied|unauthorized|permission denied")
        .expect("valid indicator regex")
});

/// Words that count as an error explanation when the exact message differs
const GENERIC_ERROR_TERMS: [&str; 6] = [
    "validation",
    "required",
    "forbidden",
    "unauthorized",
    "not permitted",
    "invalid",
];

/// How the application refused a non-privileged session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessOutcome {
    /// URL no longer matches the privileged path
    RedirectedAway,
    /// Page shows a forbidden/unauthorized indicator
    ErrorPageShown,
    /// Privileged controls are rendered but inert
    FormDisabled,
}

/// What the browser showed after the navigation attempt
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageObservation {
    pub url: String,
    pub text: String,
    /// Privileged controls (inputs, save buttons) found on the page
    pub controls: Vec<ControlState>,
}

impl PageObservation {
    /// Capture URL, visible text and the controls matching `controls_selector`
    pub async fn capture<P: PageSurface + ?Sized>(
        page: &mut P,
        controls_selector: &str,
    ) -> E2eResult<Self> {
        Ok(Self {
            url: page.current_url().await?,
            text: page.body_text().await?,
            controls: page.control_states(controls_selector).await?,
        })
    }
}

/// Whether `text` carries a forbidden/unauthorized indicator
pub fn shows_error_indicator(text: &str) -> bool {
    ERROR_PAGE_INDICATORS.is_match(text)
}

/// Classify a non-privileged visit to `privileged_path`
///
/// Outcomes are checked in order: redirect, error page, disabled form.
/// When none holds the privileged page rendered fully, which is a violation.
pub fn classify_page_access(
    privileged_path: &str,
    observation: &PageObservation,
) -> E2eResult<AccessOutcome> {
    let outcome = if !observation.url.contains(privileged_path) {
        Some(AccessOutcome::RedirectedAway)
    } else if shows_error_indicator(&observation.text) {
        Some(AccessOutcome::ErrorPageShown)
    } else if !observation.controls.is_empty() && observation.controls.iter().all(|c| c.disabled) {
        Some(AccessOutcome::FormDisabled)
    } else {
        None
    };

    match outcome {
        Some(outcome) => {
            debug!("Access to {} denied: {:?}", privileged_path, outcome);
            Ok(outcome)
        }
        None => {
            let enabled: Vec<String> = observation
                .controls
                .iter()
                .filter(|c| !c.disabled)
                .map(|c| format!("{} '{}'", c.tag, c.text.trim()))
                .collect();
            Err(E2eError::SecurityControlViolation(format!(
                "non-privileged session reached {} at {}; no redirect, no error page, enabled controls: [{}]; page text: {}",
                privileged_path,
                observation.url,
                enabled.join(", "),
                snippet(&observation.text, 300)
            )))
        }
    }
}

/// Navigate to `privileged_path` and require a denial outcome
pub async fn assert_page_access_denied<P: PageSurface + ?Sized>(
    page: &mut P,
    privileged_path: &str,
    controls_selector: &str,
) -> E2eResult<AccessOutcome> {
    page.goto(privileged_path).await?;
    let observation = PageObservation::capture(page, controls_selector).await?;
    let outcome = classify_page_access(privileged_path, &observation)?;
    info!("{} correctly denied: {:?}", privileged_path, outcome);
    Ok(outcome)
}

/// Require that `role` was refused a privileged mutation
///
/// 401 and 403 pass. A success status is a security-control violation; any
/// other status fails with the response attached.
pub fn assert_mutation_denied(role: Role, action: &str, response: &ApiResponse) -> E2eResult<()> {
    if response.is_denied() {
        debug!("{} denied for {} with {}", action, role, response.status);
        return Ok(());
    }
    if response.is_success() {
        return Err(E2eError::SecurityControlViolation(format!(
            "{} session was allowed to {}: {} {}",
            role,
            action,
            response.status,
            response.snippet()
        )));
    }
    Err(E2eError::AssertionFailed(format!(
        "expected 401/403 for {} as {}, got {} {}",
        action,
        role,
        response.status,
        response.snippet()
    )))
}

/// Human-readable error text of an API error body
///
/// Joins `message`/`error`/`msg` with `details` (its `name` entry when present).
pub fn error_message(body: &Value) -> String {
    let message = ["message", "error", "msg"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .unwrap_or_default();

    let details = match body.get("details") {
        Some(details) => details
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| details.to_string()),
        None => String::new(),
    };

    format!("{} {}", message, details).trim().to_string()
}

/// Require an error response whose message mentions `expected`
pub fn assert_error_mentions(response: &ApiResponse, expected: &str) -> E2eResult<()> {
    if response.is_success() {
        return Err(E2eError::AssertionFailed(format!(
            "expected an error mentioning '{}', got {} {}",
            expected,
            response.status,
            response.snippet()
        )));
    }

    let message = error_message(&response.body).to_lowercase();
    let expected_lower = expected.to_lowercase();
    if message.contains(&expected_lower)
        || GENERIC_ERROR_TERMS.iter().any(|t| message.contains(t))
    {
        Ok(())
    } else {
        Err(E2eError::AssertionFailed(format!(
            "expected error response to mention '{}', got: {}",
            expected,
            if message.is_empty() { response.snippet() } else { message }
        )))
    }
}
