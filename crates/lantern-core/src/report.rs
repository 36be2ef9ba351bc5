//! Step results, run states and scenario reports.
//!
//! Every step of a scenario produces exactly one [`StepResult`], including the
//! steps that never ran ([`StepOutcome::Skipped`]). A [`ScenarioReport`] keeps
//! them in the original step order together with the terminal [`RunState`].
//!
//! Failures carry a [`FailureKind`] whose [`FailureCategory`] separates
//! "the app behaved differently than expected" from "the automation broke",
//! so that a lost session is never reported as a failed assertion.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::BackendError;
use crate::context::ExecutionContext;
use crate::policy::PolicyMode;
use crate::scenario::{Scenario, Step};

/// Why a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A selector or context never resolved.
    NotFound,
    /// A wait exceeded its budget.
    TimedOut,
    /// The observed value differs from the expected one.
    AssertionMismatch,
    /// The backend rejected a command (e.g. element not interactable).
    CommandFailed,
    /// The backend session was lost.
    TransportError,
    /// The run was cancelled from outside.
    Cancelled,
}

/// Who is to blame for a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// The app under test behaved differently than the scenario expects.
    Assertion,
    /// The harness or backend broke.
    Automation,
}

impl FailureKind {
    /// Step-local failures are subject to the policy; the rest end the run.
    pub fn is_step_local(&self) -> bool {
        matches!(
            self,
            FailureKind::NotFound
                | FailureKind::TimedOut
                | FailureKind::AssertionMismatch
                | FailureKind::CommandFailed
        )
    }

    pub fn category(&self) -> FailureCategory {
        match self {
            FailureKind::NotFound | FailureKind::TimedOut | FailureKind::AssertionMismatch => {
                FailureCategory::Assertion
            }
            FailureKind::CommandFailed | FailureKind::TransportError | FailureKind::Cancelled => {
                FailureCategory::Automation
            }
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::NotFound => "not found",
            FailureKind::TimedOut => "timed out",
            FailureKind::AssertionMismatch => "assertion mismatch",
            FailureKind::CommandFailed => "command failed",
            FailureKind::TransportError => "transport error",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A classified step failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl StepFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn mismatch(message: impl Into<String>) -> Self {
        Self::new(FailureKind::AssertionMismatch, message)
    }
}

impl From<BackendError> for StepFailure {
    fn from(err: BackendError) -> Self {
        let kind = match err {
            BackendError::NotFound(_) | BackendError::StaleElement(_) => FailureKind::NotFound,
            BackendError::Timeout(_) => FailureKind::TimedOut,
            BackendError::NotConnected | BackendError::ConnectionLost(_) => FailureKind::TransportError,
            BackendError::CommandFailed(_) | BackendError::Unsupported(_) | BackendError::Io(_) => {
                FailureKind::CommandFailed
            }
        };
        Self::new(kind, err.to_string())
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    Failure(StepFailure),
    Skipped(String),
}

/// The recorded result of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Position of the step in the scenario.
    pub index: usize,

    /// Static step name (e.g. `assert_text`).
    pub step: String,

    /// Selector, URL or label the step acted on.
    pub target: String,

    pub outcome: StepOutcome,

    /// True if the failure was recorded but tolerated by the policy.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tolerated: bool,

    /// Context that was active when the step finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ExecutionContext>,

    /// How long the step took in milliseconds.
    #[serde(default)]
    pub elapsed_ms: u64,

    /// Screenshot stored for this step, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,

    /// Observed value or other detail worth keeping (text read, context entered...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StepResult {
    fn new(index: usize, step: &Step, outcome: StepOutcome) -> Self {
        Self {
            index,
            step: step.name().to_string(),
            target: step.target(),
            outcome,
            tolerated: false,
            context: None,
            elapsed_ms: 0,
            artifact: None,
            detail: None,
        }
    }

    pub fn success(index: usize, step: &Step) -> Self {
        Self::new(index, step, StepOutcome::Success)
    }

    pub fn failure(index: usize, step: &Step, failure: StepFailure) -> Self {
        Self::new(index, step, StepOutcome::Failure(failure))
    }

    pub fn skipped(index: usize, step: &Step, reason: impl Into<String>) -> Self {
        Self::new(index, step, StepOutcome::Skipped(reason.into()))
    }

    pub fn with_tolerated(mut self, tolerated: bool) -> Self {
        self.tolerated = tolerated;
        self
    }

    pub fn with_context(mut self, context: Option<ExecutionContext>) -> Self {
        self.context = context;
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    pub fn with_artifact(mut self, artifact: Option<PathBuf>) -> Self {
        self.artifact = artifact;
        self
    }

    pub fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail;
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, StepOutcome::Success)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, StepOutcome::Skipped(_))
    }

    /// The failure, if this step failed (tolerated or not).
    pub fn failure_ref(&self) -> Option<&StepFailure> {
        match &self.outcome {
            StepOutcome::Failure(f) => Some(f),
            _ => None,
        }
    }

    /// The failure, if this step failed and the failure counts against the scenario.
    pub fn counted_failure(&self) -> Option<&StepFailure> {
        self.failure_ref().filter(|_| !self.tolerated)
    }
}

/// Why a run ended in [`RunState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// Fail-fast abort at the given step.
    StepFailed { index: usize },
    /// Best-effort run finished with this many counted failures.
    StepFailures { count: usize },
    /// The backend session was lost. `index` is `None` when the scenario never
    /// started because an earlier scenario lost the shared session.
    Transport { index: Option<usize>, message: String },
    /// Cancelled from outside before the given step.
    Cancelled { at_step: usize },
    /// The scenario is malformed and was not run.
    Invalid { message: String },
}

impl FailureCause {
    pub fn category(&self) -> FailureCategory {
        match self {
            FailureCause::StepFailed { .. } | FailureCause::StepFailures { .. } => FailureCategory::Assertion,
            FailureCause::Transport { .. } | FailureCause::Cancelled { .. } | FailureCause::Invalid { .. } => {
                FailureCategory::Automation
            }
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::StepFailed { index } => write!(f, "aborted at step {}", index),
            FailureCause::StepFailures { count } => write!(f, "{} step(s) failed", count),
            FailureCause::Transport { message, .. } => write!(f, "backend session lost: {}", message),
            FailureCause::Cancelled { at_step } => write!(f, "cancelled before step {}", at_step),
            FailureCause::Invalid { message } => write!(f, "invalid scenario: {}", message),
        }
    }
}

/// Lifecycle of one scenario run.
///
/// `NotStarted -> Running -> {Passed, Failed}`; the terminal states are final.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "cause", rename_all = "snake_case")]
pub enum RunState {
    #[default]
    NotStarted,
    Running,
    Passed,
    Failed(FailureCause),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Passed | RunState::Failed(_))
    }

    /// `NotStarted -> Running`. Any other transition is ignored.
    pub fn start(&mut self) {
        if *self == RunState::NotStarted {
            *self = RunState::Running;
        }
    }

    /// Moves a non-terminal run to its terminal state.
    pub fn finish(&mut self, cause: Option<FailureCause>) {
        if self.is_terminal() {
            return;
        }
        *self = match cause {
            Some(cause) => RunState::Failed(cause),
            None => RunState::Passed,
        };
    }
}

/// Overall scenario verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
}

/// Ordered step results plus the terminal state of one scenario run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub id: Uuid,
    pub scenario: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub policy: PolicyMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepResult>,
    pub state: RunState,
}

impl ScenarioReport {
    /// Creates an empty report in [`RunState::NotStarted`].
    pub fn new(scenario: &Scenario, policy: PolicyMode) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            scenario: scenario.name.clone(),
            title: scenario.title.clone(),
            policy,
            started_at: now,
            finished_at: now,
            steps: Vec::with_capacity(scenario.steps.len()),
            state: RunState::NotStarted,
        }
    }

    /// A report for a scenario that was never run: every step skipped.
    pub fn not_run(scenario: &Scenario, policy: PolicyMode, reason: &str, cause: FailureCause) -> Self {
        let mut report = Self::new(scenario, policy);
        report.steps = scenario
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| StepResult::skipped(index, step, reason))
            .collect();
        report.state = RunState::Failed(cause);
        report
    }

    pub fn verdict(&self) -> Verdict {
        match self.state {
            RunState::Passed => Verdict::Passed,
            _ => Verdict::Failed,
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict() == Verdict::Passed
    }

    pub fn failure_cause(&self) -> Option<&FailureCause> {
        match &self.state {
            RunState::Failed(cause) => Some(cause),
            _ => None,
        }
    }

    /// Returns true if the backend session was lost during (or before) this run.
    pub fn transport_lost(&self) -> bool {
        matches!(self.failure_cause(), Some(FailureCause::Transport { .. }))
    }

    /// Failures that count against the verdict, in step order.
    pub fn failures(&self) -> impl Iterator<Item = (&StepResult, &StepFailure)> {
        self.steps
            .iter()
            .filter_map(|r| r.counted_failure().map(|f| (r, f)))
    }

    /// Failures recorded but tolerated by the policy.
    pub fn tolerated(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|r| r.tolerated)
    }

    pub fn count_category(&self, category: FailureCategory) -> usize {
        self.failures().filter(|(_, f)| f.kind.category() == category).count()
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at).num_milliseconds().max(0) as u64
    }
}

/// Reports for every scenario of one suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub suite: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scenarios: Vec<ScenarioReport>,
}

/// Pass/fail counts across a suite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub passed: usize,
    pub failed: usize,
    /// Counted step failures where the app misbehaved.
    pub assertion_failures: usize,
    /// Scenarios or steps that failed because the automation broke.
    pub automation_failures: usize,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.scenarios.iter().all(ScenarioReport::passed)
    }

    pub fn summary(&self) -> SuiteSummary {
        let mut summary = SuiteSummary::default();
        for report in &self.scenarios {
            if report.passed() {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }
            summary.assertion_failures += report.count_category(FailureCategory::Assertion);
            summary.automation_failures += report.count_category(FailureCategory::Automation);
            if let Some(cause) = report.failure_cause() {
                if cause.category() == FailureCategory::Automation
                    && !matches!(cause, FailureCause::Transport { index: Some(_), .. })
                {
                    summary.automation_failures += 1;
                }
            }
        }
        summary
    }

    /// The most severe failure category in the suite, if anything failed.
    pub fn worst_category(&self) -> Option<FailureCategory> {
        let summary = self.summary();
        if summary.automation_failures > 0 {
            Some(FailureCategory::Automation)
        } else if summary.failed > 0 {
            Some(FailureCategory::Assertion)
        } else {
            None
        }
    }
}
