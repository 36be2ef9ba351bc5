//! # lantern-core
//!
//! Core library for scenario-driven UI verification of hybrid apps: a web view
//! shown inside a native mobile shell, or a plain browser page.
//!
//! Scenarios are declarative, ordered lists of steps (navigate, activate an app,
//! switch between WebView and native contexts, locate, click, wait, assert,
//! capture). The runner executes them against any [`backend::AutomationBackend`]
//! and produces a [`report::ScenarioReport`] per scenario.
//!
//! ## Modules
//!
//! - [`scenario`] - Scenario and step definitions
//! - [`suite`] - Suite files (YAML or JSON), variable expansion and validation
//! - [`context`] - Execution contexts and context selection
//! - [`backend`] - Backend-agnostic automation trait with default wait/retry logic
//! - [`webdriver`] - WebDriver / Appium backend built on `fantoccini`
//! - [`policy`] - Failure propagation policy
//! - [`report`] - Step results, run states and reports
//! - [`runner`] - Scenario and suite execution
//! - [`report_log`] - Event broadcasting and JSON Lines persistence of runs
//! - [`config`] - Persistent configuration in `~/.lantern/config.json`
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lantern_core::config::LanternConfig;
//! use lantern_core::policy::Policy;
//! use lantern_core::runner::ScenarioRunner;
//! use lantern_core::suite::Suite;
//! use lantern_core::webdriver::WebDriverBackend;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LanternConfig::load()?;
//!     let suite = Suite::from_path("suites/hello.yaml")?.resolve(&Default::default())?;
//!     let backend = WebDriverBackend::connect(&config.webdriver()).await?;
//!
//!     let runner = ScenarioRunner::new(Arc::new(backend));
//!     for scenario in &suite.scenarios {
//!         let report = runner.run(scenario, &Policy::fail_fast()).await;
//!         println!("{}: {:?}", report.scenario, report.verdict());
//!     }
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod policy;
pub mod report;
pub mod report_log;
pub mod runner;
pub mod scenario;
pub mod suite;
pub mod webdriver;
