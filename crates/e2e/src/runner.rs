//! Scenario runner: setup, body, and an always-run teardown per scenario

use std::path::PathBuf;
use std::time::Instant;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::E2eConfig;
use crate::error::{E2eError, E2eResult};
use crate::scenario::{Scenario, ScenarioContext};
use crate::scenarios::UI_TAG;

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub tags: Vec<String>,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    /// Cleanup problems and tolerated deviations; never fail the scenario
    pub teardown_warnings: Vec<String>,
}

/// Result of running a set of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Scenarios left out by the tag/name filter
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Which scenarios to run
#[derive(Debug, Clone, Default)]
pub enum Selection {
    /// Everything except `ui`-tagged scenarios
    #[default]
    Default,
    Tagged(String),
    Named(String),
}

impl Selection {
    fn includes(&self, scenario: &dyn Scenario) -> bool {
        match self {
            Selection::Default => !scenario.tags().contains(&UI_TAG),
            Selection::Tagged(tag) => scenario.tags().iter().any(|t| *t == tag.as_str()),
            Selection::Named(name) => scenario.name() == name.as_str(),
        }
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub config: E2eConfig,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            config: E2eConfig::default(),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Main E2E test runner
pub struct TestRunner {
    config: E2eConfig,
    output_dir: PathBuf,
}

impl TestRunner {
    /// Create a new test runner with default configuration
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    /// Create a test runner with custom configuration
    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            config: config.config,
            output_dir: config.output_dir,
        }
    }

    /// Run the selected scenarios in order
    pub async fn run(
        &self,
        scenarios: &[Box<dyn Scenario>],
        selection: &Selection,
    ) -> E2eResult<TestSuiteResult> {
        let selected: Vec<&dyn Scenario> = scenarios
            .iter()
            .map(|s| s.as_ref())
            .filter(|s| selection.includes(*s))
            .collect();

        if let Selection::Named(name) = selection {
            if selected.is_empty() {
                return Err(E2eError::Config(format!("Scenario not found: {}", name)));
            }
        }

        let start = Instant::now();
        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;
        let skipped = scenarios.len() - selected.len();

        info!("Running {} scenario(s) against {}...", selected.len(), self.config.base_url);

        for scenario in &selected {
            let result = self.run_scenario(*scenario).await?;
            if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            for warning in &result.teardown_warnings {
                warn!("  ! {}", warning);
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!("Test Results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms);

        Ok(TestSuiteResult {
            total: selected.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            results,
        })
    }

    /// Run one scenario in a fresh context
    ///
    /// Only a context that cannot be built is an error; scenario failures
    /// are reported in the result.
    pub async fn run_scenario(&self, scenario: &dyn Scenario) -> E2eResult<TestResult> {
        let mut ctx = ScenarioContext::new(scenario.name(), &self.config)?;
        Ok(self.run_in(scenario, &mut ctx).await)
    }

    /// Run `scenario` in a caller-supplied context
    pub async fn run_in(&self, scenario: &dyn Scenario, ctx: &mut ScenarioContext) -> TestResult {
        let start = Instant::now();
        debug!("Running scenario: {}", scenario.name());

        let outcome = match scenario.setup(ctx).await {
            Ok(()) => scenario.run(ctx).await,
            Err(e) => Err(e),
        };

        ctx.teardown().await;

        let duration_ms = start.elapsed().as_millis() as u64;
        TestResult {
            name: scenario.name().to_string(),
            tags: scenario.tags().iter().map(|t| t.to_string()).collect(),
            success: outcome.is_ok(),
            duration_ms,
            error: outcome.err().map(|e| e.to_string()),
            teardown_warnings: ctx.take_warnings(),
        }
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}
