//! nursery-e2e runner entry point
//!
//! Exit codes: 0 when every selected scenario passed, 1 when any failed,
//! 2 when the harness itself could not run.

use std::path::PathBuf;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nursery_e2e::locator::PaginatedTableLocator;
use nursery_e2e::playwright::{Browser, PlaywrightSession};
use nursery_e2e::scenarios;
use nursery_e2e::{
    ApiClient, AuthSessionCache, E2eConfig, E2eResult, FixtureKind, FixtureLifecycleManager,
    PageSurface, RunnerConfig, Selection, TestRunner,
};

#[derive(Parser, Debug)]
#[command(name = "nursery-e2e")]
#[command(author, version, about = "E2E checks for the nursery application", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true, env = "NURSERY_E2E_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the application under test (overrides config and environment)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run built-in scenarios
    Run {
        /// Run only scenarios carrying this tag (`ui` selects browser scenarios)
        #[arg(short, long, conflicts_with = "name")]
        tag: Option<String>,

        /// Run only the scenario with this name
        #[arg(short, long)]
        name: Option<String>,

        /// Output directory for results
        #[arg(short, long, default_value = "test-results")]
        output: PathBuf,

        /// Browser for UI scenarios (chromium, firefox, webkit)
        #[arg(long)]
        browser: Option<String>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },

    /// Delete leftover test data
    Sweep {
        /// Delete the category with this name (repeatable)
        #[arg(long = "category", value_name = "NAME")]
        categories: Vec<String>,

        /// Delete every sale
        #[arg(long)]
        sales: bool,
    },

    /// Log in as admin, open a page and search its paginated table
    Locate {
        /// UI path to open, e.g. /ui/plants
        #[arg(long)]
        path: String,

        /// Text to look for
        #[arg(long)]
        target: String,
    },

    /// List built-in scenarios
    List,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(2);
        }
    };

    match rt.block_on(async_main(cli)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(cli: Cli) -> E2eResult<bool> {
    let mut config = E2eConfig::load(cli.config.as_deref())?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }

    match cli.command {
        Commands::Run { tag, name, output, browser, headed } => {
            if let Some(browser) = browser {
                config.playwright.browser = Browser::parse(&browser);
            }
            if headed {
                config.playwright.headless = false;
            }
            let selection = match (tag, name) {
                (_, Some(name)) => Selection::Named(name),
                (Some(tag), None) => Selection::Tagged(tag),
                (None, None) => Selection::Default,
            };

            let runner = TestRunner::with_config(RunnerConfig { config, output_dir: output });
            let results = runner.run(&scenarios::builtin(), &selection).await?;
            runner.write_results(&results)?;
            Ok(results.all_passed())
        }

        Commands::Sweep { categories, sales } => {
            let manager = FixtureLifecycleManager::new(ApiClient::from_config(&config)?);
            let mut sessions = AuthSessionCache::new(config.admin.clone());

            if sales {
                let deleted = manager.sweep(&mut sessions, FixtureKind::Sale).await;
                info!("Deleted {} sale(s)", deleted);
            }
            for name in &categories {
                let outcome = manager
                    .delete_existing_by_name(&mut sessions, FixtureKind::Category, name)
                    .await;
                info!("Category '{}': {:?}", name, outcome);
            }
            if !sales && categories.is_empty() {
                warn!("Nothing to sweep; pass --category NAME or --sales");
            }
            Ok(true)
        }

        Commands::Locate { path, target } => {
            let mut page =
                PlaywrightSession::launch(&config.playwright, &config.base_url, config.ui_timeout())
                    .await?;

            let login = nursery_e2e::pages::LoginPage::default().with_settle(config.page_settle());
            login
                .login_first_working(&mut page, std::slice::from_ref(&config.admin), None)
                .await?;
            page.goto(&path).await?;

            let locator = PaginatedTableLocator::new(config.max_pages, config.page_settle());
            let result = locator.locate(&mut page, &target).await;
            page.close().await?;

            let located = result?;
            println!(
                "'{}' found on page {} after {} advance(s){}",
                target,
                located.page_index + 1,
                located.advances,
                located
                    .row
                    .map(|row| format!(": {}", row.text))
                    .unwrap_or_default()
            );
            Ok(true)
        }

        Commands::List => {
            for scenario in scenarios::builtin() {
                println!("{:<32} [{}]", scenario.name(), scenario.tags().join(", "));
            }
            Ok(true)
        }
    }
}
