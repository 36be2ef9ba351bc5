//! Execution contexts for hybrid apps.
//!
//! A hybrid app exposes several UI surfaces to the automation session: the
//! native shell (`NATIVE_APP`) and one or more web views (`WEBVIEW_<package>`,
//! or `CHROMIUM` for a browser). Selectors are only meaningful relative to the
//! surface that is active, so every element lookup is keyed by an
//! [`ExecutionContext`].
//!
//! # Example
//!
//! ```
//! use lantern_core::context::{ContextId, ContextSelector};
//!
//! let available = vec![
//!     ContextId::new("NATIVE_APP"),
//!     ContextId::new("WEBVIEW_com.example.helloworld"),
//! ];
//!
//! let picked = ContextSelector::WebView.pick(&available);
//! assert_eq!(picked, Some(ContextId::new("WEBVIEW_com.example.helloworld")));
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Context name Appium reports for the native UI surface.
pub const NATIVE_CONTEXT: &str = "NATIVE_APP";

/// Identifier of a UI surface as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn native() -> Self {
        Self(NATIVE_CONTEXT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_native(&self) -> bool {
        self.0 == NATIVE_CONTEXT
    }

    /// Web contexts are `WEBVIEW_*` for embedded web views and `CHROMIUM`
    /// for Chrome-backed sessions.
    pub fn is_webview(&self) -> bool {
        self.0.starts_with("WEBVIEW") || self.0 == "CHROMIUM"
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The UI surface a scenario is currently talking to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionContext {
    /// The host operating system's own UI (dialogs, permission prompts).
    Native,
    /// A web-rendering surface, identified by its backend context name.
    #[serde(rename = "webview", alias = "web_view")]
    WebView(String),
}

impl ExecutionContext {
    /// Classifies a backend context id. Anything that is not the native
    /// context is treated as a web surface.
    pub fn from_id(id: &ContextId) -> Self {
        if id.is_native() {
            ExecutionContext::Native
        } else {
            ExecutionContext::WebView(id.as_str().to_string())
        }
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionContext::Native => f.write_str("native"),
            ExecutionContext::WebView(id) => write!(f, "webview({})", id),
        }
    }
}

/// Which context a `switch_context` step targets.
///
/// In suite files this is written as `native`, `webview`, or
/// `{ named: "WEBVIEW_com.example.*" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSelector {
    /// The native UI surface.
    Native,
    /// The first web context the backend reports.
    #[serde(rename = "webview", alias = "web_view")]
    WebView,
    /// A context whose name matches a glob pattern (`*` and `?`).
    Named(String),
}

impl ContextSelector {
    /// Picks the first available context this selector accepts.
    pub fn pick(&self, available: &[ContextId]) -> Option<ContextId> {
        available
            .iter()
            .find(|id| match self {
                ContextSelector::Native => id.is_native(),
                ContextSelector::WebView => id.is_webview(),
                ContextSelector::Named(pattern) => glob_match(pattern, id.as_str()),
            })
            .cloned()
    }
}

impl fmt::Display for ContextSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextSelector::Native => f.write_str("native"),
            ContextSelector::WebView => f.write_str("webview"),
            ContextSelector::Named(pattern) => write!(f, "'{}'", pattern),
        }
    }
}

/// How long to keep polling for a context that is not available yet.
///
/// Web views register their context only after the page has loaded, so a
/// switch right after app activation usually needs a few attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRetry {
    /// Total number of `list_contexts` attempts (at least one is always made).
    pub attempts: u32,
    /// Pause between attempts in milliseconds.
    pub backoff_ms: u64,
}

impl ContextRetry {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for ContextRetry {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff_ms: 1000,
        }
    }
}

fn has_wildcard(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Matches a string against a glob pattern with `*` (any chars) and `?` (single char).
///
/// When the pattern has no wildcards, falls back to exact equality.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    if !has_wildcard(pattern) {
        return pattern == text;
    }

    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = text.chars().collect();
    let (plen, tlen) = (pat.len(), txt.len());

    // dp[i][j] = pattern[..i] matches text[..j]
    let mut dp = vec![vec![false; tlen + 1]; plen + 1];
    dp[0][0] = true;

    for i in 1..=plen {
        if pat[i - 1] == '*' {
            dp[i][0] = dp[i - 1][0];
        }
    }

    for i in 1..=plen {
        for j in 1..=tlen {
            if pat[i - 1] == '*' {
                dp[i][j] = dp[i - 1][j] || dp[i][j - 1];
            } else if pat[i - 1] == '?' || pat[i - 1] == txt[j - 1] {
                dp[i][j] = dp[i - 1][j - 1];
            }
        }
    }

    dp[plen][tlen]
}
