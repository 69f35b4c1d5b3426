//! Suite configuration
//!
//! Defaults match the nursery application's seeded accounts. Values are read
//! from an optional YAML file, then overridden by `NURSERY_*` environment
//! variables, then by CLI flags in the binary.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::playwright::PlaywrightConfig;

/// A username/password pair tried against `/api/auth/login`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Backend behaviours the suite knows to be wrong and tolerates on request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnownDeviation {
    /// Deleting a sale does not put the sold quantity back into stock
    SaleDeleteRestoresStock,
}

/// Configuration shared by the library and the runner binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct E2eConfig {
    /// Base URL of the application under test
    pub base_url: String,

    /// Admin credentials, also the fallback for every other role
    pub admin: Credentials,

    /// Regular-user credentials, tried in order
    pub user_candidates: Vec<Credentials>,

    /// Per-request HTTP timeout
    pub request_timeout_ms: u64,

    /// Upper bound for UI waits
    pub ui_timeout_ms: u64,

    /// Pause after fixture writes before the next read (0 = none)
    pub settle_delay_ms: u64,

    /// Pause after activating a pagination control
    pub page_settle_ms: u64,

    /// Maximum pagination advances per table search
    pub max_pages: usize,

    /// Deviations reported as warnings instead of failures
    pub known_deviations: Vec<KnownDeviation>,

    /// Browser settings for UI-driven checks
    pub playwright: PlaywrightConfig,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            admin: Credentials::new("admin", "admin123"),
            user_candidates: vec![
                Credentials::new("user", "user123"),
                Credentials::new("testuser", "test123"),
            ],
            request_timeout_ms: 30_000,
            ui_timeout_ms: 10_000,
            settle_delay_ms: 0,
            page_settle_ms: 500,
            max_pages: 50,
            known_deviations: Vec::new(),
            playwright: PlaywrightConfig::default(),
        }
    }
}

impl E2eConfig {
    /// Load configuration from an optional YAML file and the environment
    pub fn load(path: Option<&Path>) -> E2eResult<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                debug!("Loading config from {}", path.display());
                Self::from_yaml(&std::fs::read_to_string(path)?)?
            }
            Some(path) => {
                return Err(E2eError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )))
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Apply `NURSERY_*` overrides from the given lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("NURSERY_BASE_URL") {
            self.base_url = url;
        }
        if let Some(username) = get("NURSERY_ADMIN_USERNAME") {
            self.admin.username = username;
        }
        if let Some(password) = get("NURSERY_ADMIN_PASSWORD") {
            self.admin.password = password;
        }
        if let Some(username) = get("NURSERY_USER_USERNAME") {
            let password = get("NURSERY_USER_PASSWORD").unwrap_or_default();
            let env_user = Credentials::new(username, password);
            self.user_candidates.retain(|c| c != &env_user);
            self.user_candidates.insert(0, env_user);
        }
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(E2eError::Config("base_url must not be empty".into()));
        }
        if self.user_candidates.is_empty() {
            return Err(E2eError::Config(
                "at least one user credential candidate is required".into(),
            ));
        }
        if self.max_pages == 0 {
            return Err(E2eError::Config("max_pages must be at least 1".into()));
        }
        Ok(())
    }

    pub fn tolerates(&self, deviation: KnownDeviation) -> bool {
        self.known_deviations.contains(&deviation)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn ui_timeout(&self) -> Duration {
        Duration::from_millis(self.ui_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_millis(self.page_settle_ms)
    }
}
