//! Scenario and step definitions.
//!
//! A [`Scenario`] is one test case: a named, ordered list of [`Step`]s. Steps
//! are serialized with an `action` tag so suite files read naturally:
//!
//! ```yaml
//! - action: switch_context
//!   context: webview
//! - action: wait_for_exist
//!   selector: h1
//!   timeout_ms: 10000
//! - action: assert_text
//!   selector: h1
//!   expected: HelloWorld!
//! ```
//!
//! # Step Types
//!
//! - **Navigation**: [`Step::Navigate`], [`Step::ActivateApp`], [`Step::SwitchContext`]
//! - **Element lookup**: [`Step::Locate`], [`Step::WaitForExist`]
//! - **Interaction**: [`Step::Click`]
//! - **Assertions**: [`Step::AssertText`], [`Step::AssertVisible`], [`Step::AssertTitle`], [`Step::AssertUrl`]
//! - **Diagnostics**: [`Step::Capture`], [`Step::Pause`], [`Step::Log`]

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{ContextSelector, ExecutionContext};
use crate::policy::Policy;

/// How an observed string is compared against the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Exact,
    Contains,
    #[serde(alias = "startsWith")]
    StartsWith,
}

impl MatchMode {
    pub fn matches(&self, actual: &str, expected: &str) -> bool {
        match self {
            MatchMode::Exact => actual == expected,
            MatchMode::Contains => actual.contains(expected),
            MatchMode::StartsWith => actual.starts_with(expected),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            MatchMode::Exact => "equal to",
            MatchMode::Contains => "containing",
            MatchMode::StartsWith => "starting with",
        }
    }
}

/// How many elements a `locate` step accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocateMode {
    /// Take the first match.
    #[default]
    First,
    /// Require exactly one match.
    Unique,
}

/// Which property an `assert_visible` step checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityCheck {
    /// The element is rendered on screen. A missing element counts as not displayed.
    #[default]
    Displayed,
    /// The element is present in the UI tree, visible or not.
    Existing,
}

fn default_expected_state() -> bool {
    true
}

/// One operation in a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Open a URL (relative targets resolve against the configured base URL).
    Navigate {
        target: String,
    },

    /// Bring an installed app to the foreground.
    ActivateApp {
        app_id: String,
    },

    /// Make another UI surface the active execution context.
    SwitchContext {
        context: ContextSelector,
    },

    /// Resolve a selector in the active context and keep the handle.
    Locate {
        selector: String,
        #[serde(default)]
        mode: LocateMode,
    },

    /// Poll until an element exists. Falls back to the run's default timeout
    /// when `timeout_ms` is omitted.
    WaitForExist {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },

    /// Click an element.
    Click {
        selector: String,
    },

    /// Compare an element's text with an expected value.
    AssertText {
        selector: String,
        expected: String,
        #[serde(default, alias = "matchMode")]
        match_mode: MatchMode,
    },

    /// Compare an element's displayed or existing state with an expected boolean.
    AssertVisible {
        selector: String,
        #[serde(default = "default_expected_state")]
        expected: bool,
        #[serde(default)]
        check: VisibilityCheck,
    },

    /// Compare the page title with an expected value.
    AssertTitle {
        expected: String,
        #[serde(default, alias = "matchMode")]
        match_mode: MatchMode,
    },

    /// Compare the current URL with an expected value.
    AssertUrl {
        expected: String,
        #[serde(default, alias = "matchMode")]
        match_mode: MatchMode,
    },

    /// Take a screenshot and attach it to the report.
    Capture {
        label: String,
    },

    /// Sleep for a fixed time.
    Pause {
        duration_ms: u64,
    },

    /// Write a message to the run log.
    Log {
        message: String,
    },
}

impl Step {
    /// Returns a short, static name for this step suitable for use in
    /// tracing span metadata and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Navigate { .. } => "navigate",
            Step::ActivateApp { .. } => "activate_app",
            Step::SwitchContext { .. } => "switch_context",
            Step::Locate { .. } => "locate",
            Step::WaitForExist { .. } => "wait_for_exist",
            Step::Click { .. } => "click",
            Step::AssertText { .. } => "assert_text",
            Step::AssertVisible { .. } => "assert_visible",
            Step::AssertTitle { .. } => "assert_title",
            Step::AssertUrl { .. } => "assert_url",
            Step::Capture { .. } => "capture",
            Step::Pause { .. } => "pause",
            Step::Log { .. } => "log",
        }
    }

    /// The element selector this step resolves, if any.
    pub fn selector(&self) -> Option<&str> {
        match self {
            Step::Locate { selector, .. }
            | Step::WaitForExist { selector, .. }
            | Step::Click { selector }
            | Step::AssertText { selector, .. }
            | Step::AssertVisible { selector, .. } => Some(selector),
            _ => None,
        }
    }

    /// Steps that resolve selectors need a known execution context.
    pub fn requires_context(&self) -> bool {
        self.selector().is_some()
    }

    /// Short human-readable target for logs (selector, URL, label...).
    pub fn target(&self) -> String {
        match self {
            Step::Navigate { target } => target.clone(),
            Step::ActivateApp { app_id } => app_id.clone(),
            Step::SwitchContext { context } => context.to_string(),
            Step::AssertTitle { expected, .. } | Step::AssertUrl { expected, .. } => expected.clone(),
            Step::Capture { label } => label.clone(),
            Step::Pause { duration_ms } => format!("{}ms", duration_ms),
            Step::Log { message } => message.clone(),
            other => other.selector().unwrap_or_default().to_string(),
        }
    }
}

/// Problems that make a scenario impossible to run as written.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScenarioError {
    #[error("scenario has no name")]
    MissingName,

    #[error("scenario '{scenario}' has no steps")]
    NoSteps { scenario: String },

    #[error(
        "scenario '{scenario}' step {index} ({step}) resolves a selector before any execution \
         context is established; add a switch_context step or declare `context`"
    )]
    ContextNotEstablished {
        scenario: String,
        index: usize,
        step: &'static str,
    },
}

/// A named, ordered sequence of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name within the suite.
    pub name: String,

    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Context the session is known to start in (e.g. a plain browser page),
    /// for scenarios that never switch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ExecutionContext>,

    /// Policy for this scenario, overriding the suite default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Policy>,

    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            title: None,
            context: None,
            policy: None,
            steps,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Declares the context the session starts in.
    pub fn starting_in(mut self, context: ExecutionContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Checks that every selector-resolving step runs under an established
    /// execution context.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.name.trim().is_empty() {
            return Err(ScenarioError::MissingName);
        }
        if self.steps.is_empty() {
            return Err(ScenarioError::NoSteps {
                scenario: self.name.clone(),
            });
        }

        let mut established = self.context.is_some();
        for (index, step) in self.steps.iter().enumerate() {
            if matches!(step, Step::SwitchContext { .. }) {
                established = true;
            } else if step.requires_context() && !established {
                return Err(ScenarioError::ContextNotEstablished {
                    scenario: self.name.clone(),
                    index,
                    step: step.name(),
                });
            }
        }
        Ok(())
    }
}
