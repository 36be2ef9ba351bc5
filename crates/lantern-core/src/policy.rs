//! Failure propagation policy.
//!
//! The policy decides what happens after a step fails: stop the scenario
//! ([`PolicyMode::FailFast`]) or keep going and collect every failure
//! ([`PolicyMode::BestEffort`]). Step-local failure kinds listed in
//! [`Policy::tolerate`] are recorded but neither abort the scenario nor fail
//! its verdict. Transport failures are never tolerated.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::report::FailureKind;

/// What the runner does after a non-tolerated step failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyMode {
    /// Abort the scenario at the first failure; later steps are skipped.
    #[default]
    FailFast,
    /// Run every step and fail the verdict if any step failed.
    BestEffort,
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyMode::FailFast => f.write_str("fail-fast"),
            PolicyMode::BestEffort => f.write_str("best-effort"),
        }
    }
}

impl FromStr for PolicyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "fail-fast" | "failfast" => Ok(PolicyMode::FailFast),
            "best-effort" | "besteffort" => Ok(PolicyMode::BestEffort),
            other => Err(format!("Unknown policy '{}'. Use: fail-fast, best-effort", other)),
        }
    }
}

/// Failure handling settings for a scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub mode: PolicyMode,

    /// Step-local failure kinds that are recorded but tolerated.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tolerate: BTreeSet<FailureKind>,

    /// Take a screenshot after every non-tolerated step failure.
    #[serde(default)]
    pub capture_on_failure: bool,
}

impl Policy {
    pub fn fail_fast() -> Self {
        Self {
            mode: PolicyMode::FailFast,
            ..Default::default()
        }
    }

    pub fn best_effort() -> Self {
        Self {
            mode: PolicyMode::BestEffort,
            ..Default::default()
        }
    }

    /// Adds a tolerated failure kind.
    pub fn tolerating(mut self, kind: FailureKind) -> Self {
        self.tolerate.insert(kind);
        self
    }

    pub fn with_capture_on_failure(mut self, capture: bool) -> Self {
        self.capture_on_failure = capture;
        self
    }

    /// Returns true if a failure of this kind should not count against the scenario.
    pub fn is_tolerated(&self, kind: FailureKind) -> bool {
        kind.is_step_local() && self.tolerate.contains(&kind)
    }
}
