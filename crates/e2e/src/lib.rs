//! Nursery E2E Test Support
//!
//! This crate provides the plumbing behind the nursery application's
//! end-to-end checks:
//! - Creates prerequisite entities over the REST API and always removes them
//! - Caches one bearer session per role with an explicit credential fallback
//! - Finds rows in paginated UI tables by scanning forward page by page
//! - Asserts that non-privileged sessions are refused privileged actions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 nursery-e2e runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    └── per scenario: ScenarioContext                        │
//! │          ├── AuthSessionCache   (role -> bearer token)      │
//! │          ├── FixtureLifecycleManager                        │
//! │          │     ├── create_fixture / update_fixture          │
//! │          │     └── delete_fixture (best effort, 404 = ok)   │
//! │          ├── fixtures: [(alias, Fixture)]  teardown: LIFO   │
//! │          └── page: PageSurface (PlaywrightSession)          │
//! │                ├── PaginatedTableLocator                    │
//! │                └── access assertions                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ApiClient (reqwest)  ──▶  /api/auth/login                  │
//! │                             /api/categories  /api/plants    │
//! │                             /api/sales                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod access;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod listing;
pub mod locator;
pub mod page;
pub mod pages;
pub mod playwright;
pub mod runner;
pub mod scenario;
pub mod scenarios;

#[cfg(test)]
mod testing;

pub use access::{assert_mutation_denied, assert_page_access_denied, AccessOutcome};
pub use api::{ApiClient, ApiResponse};
pub use auth::{AuthSessionCache, Role};
pub use config::{Credentials, E2eConfig, KnownDeviation};
pub use error::{E2eError, E2eResult};
pub use fixtures::{DeleteOutcome, Fixture, FixtureKind, FixtureLifecycleManager};
pub use listing::ListResponse;
pub use locator::PaginatedTableLocator;
pub use page::PageSurface;
pub use runner::{RunnerConfig, Selection, TestRunner};
pub use scenario::{Scenario, ScenarioContext};
