//! Declarative suite files.
//!
//! A suite is a named list of scenarios plus the variables and defaults they
//! share, written in YAML or JSON:
//!
//! ```yaml
//! name: hello-world
//! vars:
//!   app_id: com.example.helloworld
//!   expected_version: "14"
//! defaults:
//!   policy:
//!     mode: fail-fast
//!   wait_timeout_ms: 5000
//! scenarios:
//!   - name: device-info
//!     steps:
//!       - action: activate_app
//!         app_id: ${app_id}
//!       - action: switch_context
//!         context: webview
//!       - action: assert_text
//!         selector: "#version"
//!         expected: ${expected_version}
//!         match_mode: contains
//! ```
//!
//! `${name}` placeholders in any string of a scenario are replaced by
//! [`Suite::resolve`], which also validates every scenario. Device-specific
//! values therefore live in `vars` and can be overridden per run.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::context::{glob_match, ContextRetry};
use crate::policy::Policy;
use crate::runner::RunOptions;
use crate::scenario::{Scenario, ScenarioError};

/// Errors loading or resolving a suite.
#[derive(Error, Debug)]
pub enum SuiteError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON suite: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML suite: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("scenario '{scenario}' uses undefined variable '${{{name}}}'")]
    UnknownVariable { scenario: String, name: String },

    #[error(transparent)]
    Invalid(#[from] ScenarioError),

    #[error("scenario name '{0}' is used more than once")]
    DuplicateScenario(String),

    #[error("no scenario matches '{0}'")]
    UnknownScenario(String),

    #[error("suite '{0}' has no scenarios")]
    Empty(String),
}

/// Settings shared by every scenario of a suite unless the scenario overrides them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuiteDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Policy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_retry: Option<ContextRetry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_on_failure: Option<bool>,
}

/// A named collection of scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suite {
    /// Suite name. Taken from the file stem when omitted.
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Values substituted for `${name}` placeholders.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    #[serde(default)]
    pub defaults: SuiteDefaults,

    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

impl Suite {
    /// Parses a suite from YAML.
    ///
    /// Enum values such as contexts are written as single-key maps
    /// (`context: { webview: CHROMIUM }`), the same shape JSON uses, rather
    /// than YAML tags.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SuiteError> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml);
        Ok(serde_yaml::with::singleton_map_recursive::deserialize(deserializer)?)
    }

    /// Parses a suite from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, SuiteError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a suite file. `.json` files are parsed as JSON, everything else
    /// as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SuiteError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SuiteError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let mut suite = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_yaml_str(&content)?
        };

        if suite.name.trim().is_empty() {
            suite.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "suite".to_string());
        }
        Ok(suite)
    }

    /// Returns a copy with every `${var}` expanded and every scenario validated.
    ///
    /// `overrides` take precedence over the suite's own `vars`.
    pub fn resolve(&self, overrides: &BTreeMap<String, String>) -> Result<Suite, SuiteError> {
        if self.scenarios.is_empty() {
            return Err(SuiteError::Empty(self.name.clone()));
        }

        let mut vars = self.vars.clone();
        vars.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut seen = HashSet::new();
        let mut scenarios = Vec::with_capacity(self.scenarios.len());
        for scenario in &self.scenarios {
            let resolved = expand_scenario(scenario, &vars)?;
            resolved.validate()?;
            if !seen.insert(resolved.name.clone()) {
                return Err(SuiteError::DuplicateScenario(resolved.name));
            }
            scenarios.push(resolved);
        }

        Ok(Suite {
            name: self.name.clone(),
            description: self.description.clone(),
            vars,
            defaults: self.defaults.clone(),
            scenarios,
        })
    }

    /// Keeps only the scenarios whose name matches one of `patterns`
    /// (`*` and `?` wildcards). Every pattern must match something.
    pub fn select(mut self, patterns: &[String]) -> Result<Suite, SuiteError> {
        if patterns.is_empty() {
            return Ok(self);
        }
        for pattern in patterns {
            if !self.scenarios.iter().any(|s| glob_match(pattern, &s.name)) {
                return Err(SuiteError::UnknownScenario(pattern.clone()));
            }
        }
        self.scenarios
            .retain(|s| patterns.iter().any(|p| glob_match(p, &s.name)));
        Ok(self)
    }

    pub fn scenario(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// The policy a scenario runs under: its own, else the suite default,
    /// else `fallback`. A suite-level `capture_on_failure` applies to whichever
    /// of the latter two is chosen.
    pub fn policy_for(&self, scenario: &Scenario, fallback: &Policy) -> Policy {
        if let Some(policy) = &scenario.policy {
            return policy.clone();
        }
        let mut policy = self.defaults.policy.clone().unwrap_or_else(|| fallback.clone());
        if let Some(capture) = self.defaults.capture_on_failure {
            policy.capture_on_failure = capture;
        }
        policy
    }

    /// Applies the suite's timeout and retry defaults on top of `base`.
    pub fn run_options(&self, base: RunOptions) -> RunOptions {
        RunOptions {
            wait_timeout: self
                .defaults
                .wait_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(base.wait_timeout),
            context_retry: self.defaults.context_retry.unwrap_or(base.context_retry),
        }
    }
}

fn expand_scenario(scenario: &Scenario, vars: &BTreeMap<String, String>) -> Result<Scenario, SuiteError> {
    let mut value = serde_json::to_value(scenario)?;
    expand_value(&mut value, vars).map_err(|name| SuiteError::UnknownVariable {
        scenario: scenario.name.clone(),
        name,
    })?;
    Ok(serde_json::from_value(value)?)
}

fn expand_value(value: &mut Value, vars: &BTreeMap<String, String>) -> Result<(), String> {
    match value {
        Value::String(s) => {
            if s.contains("${") {
                *s = expand(s, vars)?;
            }
        }
        Value::Array(items) => {
            for item in items {
                expand_value(item, vars)?;
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                expand_value(item, vars)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Replaces `${name}` with `vars[name]`. Returns the first undefined name as
/// the error. A `${` without a closing brace is left as is.
pub fn expand(input: &str, vars: &BTreeMap<String, String>) -> Result<String, String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = after[..end].trim();
                match vars.get(name) {
                    Some(v) => out.push_str(v),
                    None => return Err(name.to_string()),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}
