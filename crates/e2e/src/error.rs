//! Error types for E2E testing

use thiserror::Error;

use crate::fixtures::FixtureKind;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Authentication unavailable for role '{role}': last response {status} {body}")]
    AuthenticationUnavailable {
        role: String,
        status: u16,
        body: String,
    },

    #[error("Failed to create {kind} fixture: {status} {body} (payload: {payload})")]
    FixtureCreationFailed {
        kind: FixtureKind,
        payload: serde_json::Value,
        status: u16,
        body: String,
    },

    #[error("{kind} '{name}' not found")]
    FixtureNotFound { kind: FixtureKind, name: String },

    #[error("{kind} fixture requires a created parent fixture")]
    MissingParent { kind: FixtureKind },

    #[error("Malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    #[error("'{target}' not found after visiting {pages_visited} page(s); last page: {last_page_text}")]
    PaginationExhausted {
        target: String,
        pages_visited: usize,
        last_page_text: String,
    },

    #[error("Security control violation: {0}")]
    SecurityControlViolation(String),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
