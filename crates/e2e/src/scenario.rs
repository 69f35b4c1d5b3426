//! Per-scenario state and the `Scenario` trait
//!
//! Each scenario gets a fresh [`ScenarioContext`]: its own session cache,
//! its own fixture registry and, for UI scenarios, its own browser page.
//! Nothing is shared between scenarios, so teardown of one can never touch
//! another's fixtures.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiResponse};
use crate::auth::{AuthSessionCache, Role};
use crate::config::{Credentials, E2eConfig};
use crate::error::{E2eError, E2eResult};
use crate::fixtures::{CategoryTree, DeleteOutcome, Fixture, FixtureKind, FixtureLifecycleManager};
use crate::page::PageSurface;
use crate::playwright::PlaywrightSession;

/// One end-to-end check
#[async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> &str;

    fn tags(&self) -> &[&'static str] {
        &[]
    }

    /// Pre-cleanup and preconditions; failures fail the scenario
    async fn setup(&self, _ctx: &mut ScenarioContext) -> E2eResult<()> {
        Ok(())
    }

    async fn run(&self, ctx: &mut ScenarioContext) -> E2eResult<()>;
}

/// State owned by one running scenario
pub struct ScenarioContext {
    name: String,
    config: E2eConfig,
    manager: FixtureLifecycleManager,
    sessions: AuthSessionCache,
    /// Registered fixtures in creation order
    fixtures: Vec<(String, Fixture)>,
    last_response: Option<ApiResponse>,
    teardown_warnings: Vec<String>,
    page: Option<Box<dyn PageSurface>>,
}

impl ScenarioContext {
    pub fn new(name: impl Into<String>, config: &E2eConfig) -> E2eResult<Self> {
        let api = ApiClient::from_config(config)?;
        Ok(Self::with_client(name, config, api))
    }

    pub fn with_client(name: impl Into<String>, config: &E2eConfig, api: ApiClient) -> Self {
        Self {
            name: name.into(),
            config: config.clone(),
            manager: FixtureLifecycleManager::new(api).with_settle_delay(config.settle_delay()),
            sessions: AuthSessionCache::new(config.admin.clone()),
            fixtures: Vec::new(),
            last_response: None,
            teardown_warnings: Vec::new(),
            page: None,
        }
    }

    /// Use `page` instead of launching a browser
    pub fn with_page(mut self, page: Box<dyn PageSurface>) -> Self {
        self.page = Some(page);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &E2eConfig {
        &self.config
    }

    pub fn api(&self) -> &ApiClient {
        self.manager.api()
    }

    pub fn manager(&self) -> &FixtureLifecycleManager {
        &self.manager
    }

    pub fn sessions(&self) -> &AuthSessionCache {
        &self.sessions
    }

    /// Credential candidates for `role`, in the order they are tried
    pub fn candidates(&self, role: Role) -> Vec<Credentials> {
        match role {
            Role::Admin => vec![self.config.admin.clone()],
            Role::User => self.config.user_candidates.clone(),
        }
    }

    pub async fn token(&mut self, role: Role) -> E2eResult<String> {
        let candidates = self.candidates(role);
        self.sessions.get_token(self.manager.api(), role, &candidates).await
    }

    /// Create a fixture as `role` and register it under `alias`
    ///
    /// `parent_alias` names an already registered fixture. On failure the
    /// attempt is still registered, without an id, so teardown stays a no-op
    /// for it.
    pub async fn create_fixture(
        &mut self,
        alias: &str,
        role: Role,
        kind: FixtureKind,
        payload: Value,
        parent_alias: Option<&str>,
    ) -> E2eResult<&Fixture> {
        let parent = match parent_alias {
            Some(parent_alias) => Some(self.require(parent_alias)?.clone()),
            None => None,
        };
        let token = self.token(role).await?;

        let created = self
            .manager
            .create_fixture(&token, kind, payload.clone(), parent.as_ref())
            .await;
        match created {
            Ok(fixture) => Ok(self.register(alias, fixture)),
            Err(e) => {
                let name = payload
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or(alias)
                    .to_string();
                self.register(alias, Fixture::pending(kind, name, payload));
                Err(e)
            }
        }
    }

    /// Update the fixture registered as `alias` as `role`
    ///
    /// The response is returned whatever its status; the registered fixture
    /// only changes when the backend accepts the update.
    pub async fn update_fixture(
        &mut self,
        alias: &str,
        role: Role,
        payload: Value,
    ) -> E2eResult<ApiResponse> {
        let token = self.token(role).await?;
        let manager = &self.manager;
        let fixture = self
            .fixtures
            .iter_mut()
            .rev()
            .find(|(a, _)| a == alias)
            .map(|(_, f)| f)
            .ok_or_else(|| E2eError::Config(format!("no fixture registered as '{}'", alias)))?;
        manager.update_fixture(&token, fixture, payload).await
    }

    /// Track a fixture for teardown; a reused alias refers to the newest one
    pub fn register(&mut self, alias: &str, fixture: Fixture) -> &Fixture {
        debug!(
            "[{}] registered {} '{}' as {}",
            self.name,
            fixture.kind(),
            fixture.display_name(),
            alias
        );
        self.fixtures.push((alias.to_string(), fixture));
        let (_, fixture) = &self.fixtures[self.fixtures.len() - 1];
        fixture
    }

    pub fn fixture(&self, alias: &str) -> Option<&Fixture> {
        self.fixtures
            .iter()
            .rev()
            .find(|(a, _)| a == alias)
            .map(|(_, f)| f)
    }

    pub fn fixture_mut(&mut self, alias: &str) -> Option<&mut Fixture> {
        self.fixtures
            .iter_mut()
            .rev()
            .find(|(a, _)| a == alias)
            .map(|(_, f)| f)
    }

    /// Registered fixture under `alias`, or an error naming it
    pub fn require(&self, alias: &str) -> E2eResult<&Fixture> {
        self.fixture(alias)
            .ok_or_else(|| E2eError::Config(format!("no fixture registered as '{}'", alias)))
    }

    /// Registered fixtures in creation order
    pub fn fixtures(&self) -> impl Iterator<Item = (&str, &Fixture)> {
        self.fixtures.iter().map(|(a, f)| (a.as_str(), f))
    }

    /// Category tree registered as `main_category`, `sub_category` and `plant`
    pub async fn create_category_tree(&mut self) -> E2eResult<CategoryTree> {
        let tree = self.manager.create_category_tree(&mut self.sessions).await?;
        self.register("main_category", tree.main_category.clone());
        self.register("sub_category", tree.sub_category.clone());
        self.register("plant", tree.plant.clone());
        Ok(tree)
    }

    /// Remove any leftover entity named `name` before the scenario recreates it
    pub async fn delete_existing_by_name(
        &mut self,
        kind: FixtureKind,
        name: &str,
    ) -> DeleteOutcome {
        self.manager.delete_existing_by_name(&mut self.sessions, kind, name).await
    }

    /// Keep `response` for later steps; returns a reference to it
    pub fn remember(&mut self, response: ApiResponse) -> &ApiResponse {
        self.last_response.insert(response)
    }

    pub fn last_response(&self) -> Option<&ApiResponse> {
        self.last_response.as_ref()
    }

    /// Browser page for UI steps, launched on first use
    pub async fn page(&mut self) -> E2eResult<&mut dyn PageSurface> {
        if self.page.is_none() {
            let session = PlaywrightSession::launch(
                &self.config.playwright,
                &self.config.base_url,
                self.config.ui_timeout(),
            )
            .await?;
            self.page = Some(Box::new(session));
        }
        match self.page.as_deref_mut() {
            Some(page) => Ok(page),
            None => Err(E2eError::Playwright("page unavailable".into())),
        }
    }

    /// Record a problem that must not fail the scenario
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("[{}] {}", self.name, message);
        self.teardown_warnings.push(message);
    }

    /// Delete every registered fixture, newest first
    ///
    /// Never fails; failed deletions are recorded as warnings.
    pub async fn teardown(&mut self) -> Vec<(String, DeleteOutcome)> {
        let mut outcomes = Vec::new();
        while let Some((alias, fixture)) = self.fixtures.pop() {
            let outcome = self.manager.delete_fixture(&mut self.sessions, &fixture).await;
            if let DeleteOutcome::Failed(reason) = &outcome {
                self.warn(format!(
                    "cleanup of {} '{}' failed: {}",
                    fixture.kind(),
                    fixture.display_name(),
                    reason
                ));
            }
            outcomes.push((alias, outcome));
        }
        // Dropping the session closes the browser
        self.page = None;
        info!("[{}] teardown finished ({} fixture(s))", self.name, outcomes.len());
        outcomes
    }

    pub fn teardown_warnings(&self) -> &[String] {
        &self.teardown_warnings
    }

    /// Consume recorded warnings
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.teardown_warnings)
    }
}
