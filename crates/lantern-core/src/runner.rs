//! Scenario and suite execution.
//!
//! [`ScenarioRunner`] executes the steps of one scenario strictly in order
//! against an [`AutomationBackend`] and turns every outcome, including the
//! steps that never ran, into a [`StepResult`]. It never returns an error:
//! backend failures, assertion mismatches, cancellation and malformed
//! scenarios all end up in the [`ScenarioReport`].
//!
//! [`SuiteRunner`] runs the scenarios of a [`Suite`], either one after the
//! other on a shared backend session or concurrently with one session per
//! scenario (see [`SessionFactory`]).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lantern_core::backend::AutomationBackend;
//! use lantern_core::policy::Policy;
//! use lantern_core::runner::ScenarioRunner;
//! use lantern_core::scenario::{Scenario, Step};
//! use lantern_core::context::ExecutionContext;
//!
//! async fn check_home(backend: Arc<dyn AutomationBackend>) -> bool {
//!     let scenario = Scenario::new(
//!         "home",
//!         vec![
//!             Step::Navigate { target: "/".to_string() },
//!             Step::WaitForExist { selector: "h1".to_string(), timeout_ms: Some(5000) },
//!         ],
//!     )
//!     .starting_in(ExecutionContext::WebView("CHROMIUM".to_string()));
//!
//!     ScenarioRunner::new(backend)
//!         .run(&scenario, &Policy::fail_fast())
//!         .await
//!         .passed()
//! }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::backend::{AutomationBackend, BackendError, ElementHandle};
use crate::context::{ContextRetry, ExecutionContext};
use crate::policy::{Policy, PolicyMode};
use crate::report::{
    FailureCause, FailureKind, ScenarioReport, StepFailure, StepResult, SuiteReport,
};
use crate::report_log::{ReportLog, RunEvent};
use crate::scenario::{LocateMode, MatchMode, Scenario, Step, VisibilityCheck};
use crate::suite::Suite;

/// Timeout for `wait_for_exist` steps that do not set one.
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5000;

/// Per-run timing settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Timeout for `wait_for_exist` steps without an explicit `timeout_ms`.
    pub wait_timeout: Duration,
    /// Retry settings for `switch_context` steps.
    pub context_retry: ContextRetry,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS),
            context_retry: ContextRetry::default(),
        }
    }
}

/// What a successful step leaves behind in its result.
#[derive(Debug, Default)]
struct StepOutput {
    detail: Option<String>,
    artifact: Option<PathBuf>,
}

impl StepOutput {
    fn detail(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            artifact: None,
        }
    }
}

/// Per-run mutable state: the active context and the handles resolved in it.
struct RunScope {
    context: Option<ExecutionContext>,
    handles: HashMap<(ExecutionContext, String), ElementHandle>,
}

impl RunScope {
    fn new(context: Option<ExecutionContext>) -> Self {
        Self {
            context,
            handles: HashMap::new(),
        }
    }

    fn active(&self) -> Result<ExecutionContext, StepFailure> {
        self.context
            .clone()
            .ok_or_else(|| StepFailure::new(FailureKind::NotFound, "no execution context is active"))
    }

    fn forget(&mut self, selector: &str) {
        if let Some(context) = &self.context {
            self.handles.remove(&(context.clone(), selector.to_string()));
        }
    }
}

/// Executes scenarios against one backend session.
pub struct ScenarioRunner {
    backend: Arc<dyn AutomationBackend>,
    options: RunOptions,
    cancel: CancellationToken,
    log: Option<Arc<ReportLog>>,
}

impl ScenarioRunner {
    /// Creates a runner with default options and a cancellation token nobody holds.
    pub fn new(backend: Arc<dyn AutomationBackend>) -> Self {
        Self {
            backend,
            options: RunOptions::default(),
            cancel: CancellationToken::new(),
            log: None,
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Cancelling `token` stops the run at the next step boundary.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Sends progress events and finished reports to `log`.
    pub fn with_report_log(mut self, log: Arc<ReportLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Returns a reference to the underlying backend.
    pub fn backend(&self) -> &Arc<dyn AutomationBackend> {
        &self.backend
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Runs one scenario to completion and returns its report.
    ///
    /// Produces exactly one [`StepResult`] per step. Under
    /// [`PolicyMode::FailFast`] the executed results end at the first
    /// counted failure and the rest are [`Skipped`](crate::report::StepOutcome::Skipped).
    /// A transport failure or cancellation ends the run under either mode.
    pub async fn run(&self, scenario: &Scenario, policy: &Policy) -> ScenarioReport {
        let span = info_span!("scenario", name = %scenario.name, policy = %policy.mode);
        let report = self.run_inner(scenario, policy).instrument(span).await;
        if let Some(log) = &self.log {
            log.scenario_finished(report.clone()).await;
        }
        report
    }

    async fn run_inner(&self, scenario: &Scenario, policy: &Policy) -> ScenarioReport {
        if let Err(e) = scenario.validate() {
            warn!(error = %e, "scenario is invalid, not running it");
            return ScenarioReport::not_run(
                scenario,
                policy.mode,
                "invalid scenario",
                FailureCause::Invalid { message: e.to_string() },
            );
        }

        let mut report = ScenarioReport::new(scenario, policy.mode);
        report.state.start();
        if let Some(log) = &self.log {
            log.record(RunEvent::ScenarioStarted {
                scenario: scenario.name.clone(),
                steps: scenario.steps.len(),
            })
            .await;
        }

        let mut scope = RunScope::new(scenario.context.clone());
        let mut abort: Option<FailureCause> = None;
        let mut counted_failures = 0usize;

        for (index, step) in scenario.steps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(index, "run cancelled");
                abort = Some(FailureCause::Cancelled { at_step: index });
                break;
            }

            let step_span = info_span!("step", index, step = step.name());
            let result = self
                .run_step(scenario, policy, &mut scope, index, step)
                .instrument(step_span)
                .await;

            if let Some(failure) = result.counted_failure() {
                if failure.kind == FailureKind::TransportError {
                    warn!(index, error = %failure.message, "backend session lost, aborting run");
                    abort = Some(FailureCause::Transport {
                        index: Some(index),
                        message: failure.message.clone(),
                    });
                } else {
                    counted_failures += 1;
                    if policy.mode == PolicyMode::FailFast {
                        abort = Some(FailureCause::StepFailed { index });
                    }
                }
            }

            self.record_step(scenario, &result).await;
            report.steps.push(result);

            if abort.is_some() {
                break;
            }
        }

        let remaining = report.steps.len();
        if remaining < scenario.steps.len() {
            let reason = match &abort {
                Some(FailureCause::Cancelled { .. }) => "run cancelled",
                Some(FailureCause::Transport { .. }) => "backend session lost",
                _ => "scenario aborted after failure",
            };
            for (index, step) in scenario.steps.iter().enumerate().skip(remaining) {
                let result = StepResult::skipped(index, step, reason);
                self.record_step(scenario, &result).await;
                report.steps.push(result);
            }
        }

        // Handles are scoped to one run.
        self.backend.release_elements().await;

        let cause = abort.or_else(|| {
            (counted_failures > 0).then_some(FailureCause::StepFailures {
                count: counted_failures,
            })
        });
        report.state.finish(cause);
        report.finished_at = Utc::now();

        match report.failure_cause() {
            None => info!(duration_ms = report.duration_ms(), "scenario passed"),
            Some(cause) => info!(duration_ms = report.duration_ms(), %cause, "scenario failed"),
        }
        report
    }

    async fn record_step(&self, scenario: &Scenario, result: &StepResult) {
        if let Some(log) = &self.log {
            log.record(RunEvent::StepFinished {
                scenario: scenario.name.clone(),
                result: result.clone(),
            })
            .await;
        }
    }

    async fn run_step(
        &self,
        scenario: &Scenario,
        policy: &Policy,
        scope: &mut RunScope,
        index: usize,
        step: &Step,
    ) -> StepResult {
        let start = Instant::now();
        let outcome = self.execute(scope, step).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(output) => {
                debug!(elapsed_ms, "step succeeded");
                StepResult::success(index, step)
                    .with_detail(output.detail)
                    .with_artifact(output.artifact)
            }
            Err(failure) => {
                let tolerated = policy.is_tolerated(failure.kind);
                debug!(elapsed_ms, kind = %failure.kind, tolerated, "step failed");
                if tolerated {
                    warn!(error = %failure.message, "tolerated failure");
                }

                let artifact = if policy.capture_on_failure
                    && !tolerated
                    && failure.kind != FailureKind::TransportError
                {
                    self.capture_failure(scenario, index).await
                } else {
                    None
                };

                StepResult::failure(index, step, failure)
                    .with_tolerated(tolerated)
                    .with_artifact(artifact)
            }
        };

        result
            .with_elapsed_ms(elapsed_ms)
            .with_context(scope.context.clone())
    }

    async fn capture_failure(&self, scenario: &Scenario, index: usize) -> Option<PathBuf> {
        let label = format!("{}-step{}-failure", scenario.name, index);
        match self.backend.screenshot(&label).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "failed to capture diagnostic screenshot");
                None
            }
        }
    }

    async fn execute(&self, scope: &mut RunScope, step: &Step) -> Result<StepOutput, StepFailure> {
        match step {
            Step::Navigate { target } => {
                self.backend.navigate(target).await?;
                Ok(StepOutput::default())
            }

            Step::ActivateApp { app_id } => {
                self.backend.activate_app(app_id).await?;
                Ok(StepOutput::default())
            }

            Step::SwitchContext { context } => {
                // Handles never survive a switch attempt, even a failed one.
                scope.handles.clear();
                let id = self
                    .backend
                    .switch_to(context, &self.options.context_retry)
                    .await?;
                scope.context = Some(ExecutionContext::from_id(&id));
                info!(context = %id, "switched context");
                Ok(StepOutput::detail(id.as_str()))
            }

            Step::Locate { selector, mode } => {
                let context = scope.active()?;
                let handle = match mode {
                    LocateMode::First => self.backend.find_element(selector).await?,
                    LocateMode::Unique => {
                        let mut found = self.backend.find_elements(selector).await?;
                        match found.len() {
                            0 => return Err(StepFailure::new(FailureKind::NotFound, format!("no element matches '{}'", selector))),
                            1 => found.remove(0),
                            n => {
                                return Err(StepFailure::mismatch(format!(
                                    "expected exactly one element matching '{}', found {}",
                                    selector, n
                                )))
                            }
                        }
                    }
                };
                scope.handles.insert((context, selector.clone()), handle);
                Ok(StepOutput::default())
            }

            Step::WaitForExist { selector, timeout_ms } => {
                let context = scope.active()?;
                let timeout = timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(self.options.wait_timeout);
                self.backend
                    .wait_for_exist(selector, timeout)
                    .await
                    .map_err(|e| match e {
                        BackendError::Timeout(ms) => StepFailure::new(
                            FailureKind::TimedOut,
                            format!("'{}' did not appear within {}ms", selector, ms),
                        ),
                        other => other.into(),
                    })?;
                let handle = self.backend.find_element(selector).await?;
                scope.handles.insert((context, selector.clone()), handle);
                Ok(StepOutput::default())
            }

            Step::Click { selector } => {
                self.on_element(scope, selector, |backend, handle| async move { backend.click(&handle).await })
                    .await?;
                Ok(StepOutput::default())
            }

            Step::AssertText {
                selector,
                expected,
                match_mode,
            } => {
                let actual = self
                    .on_element(scope, selector, |backend, handle| async move { backend.text(&handle).await })
                    .await?;
                compare(&format!("text of '{}'", selector), &actual, expected, *match_mode)
            }

            Step::AssertVisible {
                selector,
                expected,
                check,
            } => {
                scope.active()?;
                let actual = match check {
                    VisibilityCheck::Existing => self.backend.element_exists(selector).await?,
                    VisibilityCheck::Displayed => {
                        let displayed = self
                            .on_element(scope, selector, |backend, handle| async move {
                                backend.is_displayed(&handle).await
                            })
                            .await;
                        match displayed {
                            Ok(shown) => shown,
                            Err(BackendError::NotFound(_)) => false,
                            Err(e) => return Err(e.into()),
                        }
                    }
                };
                if actual == *expected {
                    Ok(StepOutput::detail(actual.to_string()))
                } else {
                    let what = match check {
                        VisibilityCheck::Displayed => "displayed",
                        VisibilityCheck::Existing => "existing",
                    };
                    Err(StepFailure::mismatch(format!(
                        "expected '{}' {}to be {}",
                        selector,
                        if *expected { "" } else { "not " },
                        what
                    )))
                }
            }

            Step::AssertTitle {
                expected,
                match_mode,
            } => {
                let actual = self.backend.title().await?;
                compare("page title", &actual, expected, *match_mode)
            }

            Step::AssertUrl {
                expected,
                match_mode,
            } => {
                let actual = self.backend.url().await?;
                compare("page URL", &actual, expected, *match_mode)
            }

            Step::Capture { label } => {
                let path = self.backend.screenshot(label).await?;
                Ok(StepOutput {
                    detail: None,
                    artifact: Some(path),
                })
            }

            Step::Pause { duration_ms } => {
                self.backend.pause(Duration::from_millis(*duration_ms)).await?;
                Ok(StepOutput::default())
            }

            Step::Log { message } => {
                info!(message = %message, "scenario log");
                Ok(StepOutput::default())
            }
        }
    }

    /// Resolves `selector` in the active context, reusing a handle resolved
    /// earlier in the same context.
    async fn resolve(&self, scope: &mut RunScope, selector: &str) -> Result<ElementHandle, BackendError> {
        let context = scope
            .context
            .clone()
            .ok_or_else(|| BackendError::NotFound("no execution context is active".to_string()))?;
        let key = (context, selector.to_string());
        if let Some(handle) = scope.handles.get(&key) {
            return Ok(handle.clone());
        }
        let handle = self.backend.find_element(selector).await?;
        scope.handles.insert(key, handle.clone());
        Ok(handle)
    }

    /// Runs `op` on the element behind `selector`. A stale handle is
    /// re-resolved once.
    async fn on_element<T, F, Fut>(&self, scope: &mut RunScope, selector: &str, op: F) -> Result<T, BackendError>
    where
        F: Fn(Arc<dyn AutomationBackend>, ElementHandle) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let handle = self.resolve(scope, selector).await?;
        match op(self.backend.clone(), handle).await {
            Err(BackendError::StaleElement(_)) => {
                debug!(selector, "stale handle, resolving again");
                scope.forget(selector);
                let handle = self.resolve(scope, selector).await?;
                op(self.backend.clone(), handle).await
            }
            other => other,
        }
    }
}

fn compare(what: &str, actual: &str, expected: &str, mode: MatchMode) -> Result<StepOutput, StepFailure> {
    if mode.matches(actual, expected) {
        Ok(StepOutput::detail(actual))
    } else {
        Err(StepFailure::mismatch(format!(
            "{} was '{}', expected {} '{}'",
            what,
            actual,
            mode.describe(),
            expected
        )))
    }
}

/// Runs one scenario with default options.
pub async fn run(scenario: &Scenario, backend: Arc<dyn AutomationBackend>, policy: &Policy) -> ScenarioReport {
    ScenarioRunner::new(backend).run(scenario, policy).await
}

/// Opens a fresh backend session per scenario for isolated concurrent runs.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Arc<dyn AutomationBackend>, BackendError>;
}

/// Runs every scenario of a suite.
pub struct SuiteRunner {
    options: RunOptions,
    policy: Policy,
    mode_override: Option<PolicyMode>,
    capture_override: Option<bool>,
    timeout_override: Option<Duration>,
    cancel: CancellationToken,
    log: Option<Arc<ReportLog>>,
}

impl SuiteRunner {
    /// `policy` applies to scenarios whose suite sets none.
    pub fn new(policy: Policy) -> Self {
        Self {
            options: RunOptions::default(),
            policy,
            mode_override: None,
            capture_override: None,
            timeout_override: None,
            cancel: CancellationToken::new(),
            log: None,
        }
    }

    /// Base options; suite defaults are applied on top of them.
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Forces a policy mode on every scenario.
    pub fn with_mode(mut self, mode: PolicyMode) -> Self {
        self.mode_override = Some(mode);
        self
    }

    /// Forces capture-on-failure on or off for every scenario.
    pub fn with_capture_on_failure(mut self, capture: bool) -> Self {
        self.capture_override = Some(capture);
        self
    }

    /// Forces the default wait timeout, over any suite default.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_report_log(mut self, log: Arc<ReportLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// The options scenarios of `suite` run with.
    pub fn options_for(&self, suite: &Suite) -> RunOptions {
        let mut options = suite.run_options(self.options);
        if let Some(timeout) = self.timeout_override {
            options.wait_timeout = timeout;
        }
        options
    }

    /// The policy a scenario of `suite` runs under.
    pub fn policy_for(&self, suite: &Suite, scenario: &Scenario) -> Policy {
        let mut policy = suite.policy_for(scenario, &self.policy);
        if let Some(mode) = self.mode_override {
            policy.mode = mode;
        }
        if let Some(capture) = self.capture_override {
            policy.capture_on_failure = capture;
        }
        policy
    }

    fn scenario_runner(&self, suite: &Suite, backend: Arc<dyn AutomationBackend>) -> ScenarioRunner {
        let mut runner = ScenarioRunner::new(backend)
            .with_options(self.options_for(suite))
            .with_cancellation(self.cancel.clone());
        if let Some(log) = &self.log {
            runner = runner.with_report_log(log.clone());
        }
        runner
    }

    async fn not_run(&self, scenario: &Scenario, policy: &Policy, reason: &str, cause: FailureCause) -> ScenarioReport {
        let report = ScenarioReport::not_run(scenario, policy.mode, reason, cause);
        if let Some(log) = &self.log {
            log.scenario_finished(report.clone()).await;
        }
        report
    }

    async fn suite_started(&self, suite: &Suite) {
        info!(suite = %suite.name, scenarios = suite.scenarios.len(), "running suite");
        if let Some(log) = &self.log {
            log.record(RunEvent::SuiteStarted {
                suite: suite.name.clone(),
                scenarios: suite.scenarios.len(),
            })
            .await;
        }
    }

    async fn suite_finished(&self, report: &SuiteReport) {
        let summary = report.summary();
        info!(suite = %report.suite, passed = summary.passed, failed = summary.failed, "suite finished");
        if let Some(log) = &self.log {
            log.record(RunEvent::SuiteFinished {
                suite: report.suite.clone(),
                summary,
            })
            .await;
        }
    }

    /// Runs the scenarios one after another on a shared session.
    ///
    /// Once a scenario loses the session, every later scenario is reported as
    /// not run with a transport cause.
    pub async fn run(&self, suite: &Suite, backend: Arc<dyn AutomationBackend>) -> SuiteReport {
        let started_at = Utc::now();
        self.suite_started(suite).await;

        let runner = self.scenario_runner(suite, backend);
        let mut lost: Option<String> = None;
        let mut scenarios = Vec::with_capacity(suite.scenarios.len());

        for scenario in &suite.scenarios {
            let policy = self.policy_for(suite, scenario);
            let report = if self.cancel.is_cancelled() {
                self.not_run(scenario, &policy, "run cancelled", FailureCause::Cancelled { at_step: 0 })
                    .await
            } else if let Some(message) = &lost {
                self.not_run(
                    scenario,
                    &policy,
                    "backend session lost",
                    FailureCause::Transport {
                        index: None,
                        message: message.clone(),
                    },
                )
                .await
            } else {
                let report = runner.run(scenario, &policy).await;
                if let Some(FailureCause::Transport { message, .. }) = report.failure_cause() {
                    lost = Some(message.clone());
                }
                report
            };
            scenarios.push(report);
        }

        let report = SuiteReport {
            suite: suite.name.clone(),
            started_at,
            finished_at: Utc::now(),
            scenarios,
        };
        self.suite_finished(&report).await;
        report
    }

    /// Runs up to `jobs` scenarios at a time, each on its own session from
    /// `factory`. Sessions are quit when their scenario finishes. Reports
    /// come back in suite order.
    pub async fn run_isolated(&self, suite: &Suite, factory: Arc<dyn SessionFactory>, jobs: usize) -> SuiteReport {
        let started_at = Utc::now();
        self.suite_started(suite).await;

        let permits = Arc::new(Semaphore::new(jobs.max(1)));
        let mut tasks = JoinSet::new();

        for (index, scenario) in suite.scenarios.iter().enumerate() {
            let policy = self.policy_for(suite, scenario);
            let scenario = scenario.clone();
            let permits = permits.clone();
            let factory = factory.clone();
            let options = self.options_for(suite);
            let cancel = self.cancel.clone();
            let log = self.log.clone();

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();

                if cancel.is_cancelled() {
                    let report = ScenarioReport::not_run(
                        &scenario,
                        policy.mode,
                        "run cancelled",
                        FailureCause::Cancelled { at_step: 0 },
                    );
                    if let Some(log) = &log {
                        log.scenario_finished(report.clone()).await;
                    }
                    return (index, report);
                }

                let backend = match factory.open().await {
                    Ok(backend) => backend,
                    Err(e) => {
                        warn!(scenario = %scenario.name, error = %e, "failed to open backend session");
                        let report = ScenarioReport::not_run(
                            &scenario,
                            policy.mode,
                            "backend session unavailable",
                            FailureCause::Transport {
                                index: None,
                                message: e.to_string(),
                            },
                        );
                        if let Some(log) = &log {
                            log.scenario_finished(report.clone()).await;
                        }
                        return (index, report);
                    }
                };

                let mut runner = ScenarioRunner::new(backend.clone())
                    .with_options(options)
                    .with_cancellation(cancel);
                if let Some(log) = log {
                    runner = runner.with_report_log(log);
                }
                let report = runner.run(&scenario, &policy).await;

                if let Err(e) = backend.quit().await {
                    warn!(scenario = %scenario.name, error = %e, "failed to close backend session");
                }
                (index, report)
            });
        }

        let mut slots: Vec<Option<ScenarioReport>> = vec![None; suite.scenarios.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(e) => warn!(error = %e, "scenario task failed"),
            }
        }

        let mut scenarios = Vec::with_capacity(slots.len());
        for (slot, scenario) in slots.into_iter().zip(&suite.scenarios) {
            let report = match slot {
                Some(report) => report,
                None => {
                    let policy = self.policy_for(suite, scenario);
                    ScenarioReport::not_run(
                        scenario,
                        policy.mode,
                        "scenario task failed",
                        FailureCause::Transport {
                            index: None,
                            message: "scenario task panicked".to_string(),
                        },
                    )
                }
            };
            scenarios.push(report);
        }

        let report = SuiteReport {
            suite: suite.name.clone(),
            started_at,
            finished_at: Utc::now(),
            scenarios,
        };
        self.suite_finished(&report).await;
        report
    }
}
