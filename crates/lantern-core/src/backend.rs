//! Automation backend trait for backend-agnostic UI verification.
//!
//! This module defines the [`AutomationBackend`] trait, the capability set the
//! runner consumes: navigation, app activation, context listing and switching,
//! element lookup, interaction, screenshots and pauses. Implementations wrap a
//! real automation client (see [`crate::webdriver`]) or, in tests, a scripted
//! in-memory UI.
//!
//! Waiting for an element and retrying a context switch are default methods on
//! the trait so that every backend gets the same polling semantics, while a
//! backend with server-side waits can still override them.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::context::{ContextId, ContextRetry, ContextSelector};

/// Default interval between existence checks while waiting for an element.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors that can occur during backend operations.
///
/// Transport-level failures ([`NotConnected`](BackendError::NotConnected),
/// [`ConnectionLost`](BackendError::ConnectionLost)) mean the automation
/// session itself is unusable; everything else is local to one operation.
#[derive(Error, Debug)]
pub enum BackendError {
    /// No element or context matched.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A previously resolved element handle no longer refers to a live element.
    #[error("Stale element handle: {0}")]
    StaleElement(String),

    /// A wait exceeded its budget.
    #[error("Timed out after {0}ms")]
    Timeout(u64),

    /// The backend rejected or failed to execute a command.
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// The backend has no live session.
    #[error("Not connected to automation backend")]
    NotConnected,

    /// The session with the automation server was lost.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The backend does not implement this capability.
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),

    /// An I/O error occurred (e.g. writing a screenshot).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Returns true if the error means the backend session is unusable.
    pub fn is_transport(&self) -> bool {
        matches!(self, BackendError::NotConnected | BackendError::ConnectionLost(_))
    }
}

/// Opaque reference to an element resolved by a backend.
///
/// Handles are only valid within the context they were resolved in; the
/// runner drops them on every context switch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    id: String,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Trait for backend-agnostic browser and mobile UI automation.
///
/// Selectors are passed through untouched; their syntax is defined by the
/// implementation. All methods that talk to the device are async.
///
/// # Required Methods
///
/// Implementors must provide: [`navigate`](AutomationBackend::navigate),
/// [`activate_app`](AutomationBackend::activate_app),
/// [`list_contexts`](AutomationBackend::list_contexts),
/// [`current_context`](AutomationBackend::current_context),
/// [`switch_context`](AutomationBackend::switch_context),
/// [`find_element`](AutomationBackend::find_element),
/// [`find_elements`](AutomationBackend::find_elements),
/// [`click`](AutomationBackend::click),
/// [`text`](AutomationBackend::text),
/// [`is_displayed`](AutomationBackend::is_displayed),
/// [`screenshot`](AutomationBackend::screenshot),
/// [`title`](AutomationBackend::title)
/// and [`url`](AutomationBackend::url).
#[async_trait]
pub trait AutomationBackend: Send + Sync {
    /// Check if the backend holds a live session.
    fn is_connected(&self) -> bool {
        true
    }

    /// Open a URL. Relative targets are resolved by the backend.
    async fn navigate(&self, target: &str) -> Result<(), BackendError>;

    /// Bring an installed app to the foreground.
    ///
    /// # Arguments
    ///
    /// * `app_id` - Package name or bundle identifier
    async fn activate_app(&self, app_id: &str) -> Result<(), BackendError>;

    /// List the contexts the session currently exposes, in backend order.
    async fn list_contexts(&self) -> Result<Vec<ContextId>, BackendError>;

    /// Return the context commands are currently sent to.
    async fn current_context(&self) -> Result<ContextId, BackendError>;

    /// Switch the session to a context.
    async fn switch_context(&self, context: &ContextId) -> Result<(), BackendError>;

    /// Resolve a selector to the first matching element.
    ///
    /// Fails with [`BackendError::NotFound`] when nothing matches.
    async fn find_element(&self, selector: &str) -> Result<ElementHandle, BackendError>;

    /// Resolve a selector to every matching element. An empty result is not an error.
    async fn find_elements(&self, selector: &str) -> Result<Vec<ElementHandle>, BackendError>;

    /// Check whether at least one element matches the selector.
    ///
    /// The default implementation maps a [`BackendError::NotFound`] from
    /// [`find_element`](Self::find_element) to `false`.
    async fn element_exists(&self, selector: &str) -> Result<bool, BackendError> {
        match self.find_element(selector).await {
            Ok(_) => Ok(true),
            Err(BackendError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Interval between existence checks in [`wait_for_exist`](Self::wait_for_exist).
    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }

    /// Wait until an element matching the selector exists.
    ///
    /// Polls [`element_exists`](Self::element_exists) every
    /// [`poll_interval`](Self::poll_interval), never sleeping past the
    /// deadline, and fails with [`BackendError::Timeout`] once `timeout` has
    /// elapsed. Transport errors end the wait immediately; other lookup errors
    /// count as "not there yet".
    async fn wait_for_exist(&self, selector: &str, timeout: Duration) -> Result<(), BackendError> {
        let start = Instant::now();
        let poll_interval = self.poll_interval();

        loop {
            match self.element_exists(selector).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => debug!(selector, error = %e, "existence check failed, retrying"),
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(BackendError::Timeout(timeout.as_millis() as u64));
            }
            tokio::time::sleep(poll_interval.min(timeout - elapsed)).await;
        }
    }

    /// Click an element.
    async fn click(&self, element: &ElementHandle) -> Result<(), BackendError>;

    /// Get the visible text of an element.
    async fn text(&self, element: &ElementHandle) -> Result<String, BackendError>;

    /// Check whether an element is displayed.
    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool, BackendError>;

    /// Capture a screenshot and store it.
    ///
    /// # Returns
    ///
    /// The path of the stored artifact.
    async fn screenshot(&self, label: &str) -> Result<PathBuf, BackendError>;

    /// Pause for a fixed duration.
    async fn pause(&self, duration: Duration) -> Result<(), BackendError> {
        tokio::time::sleep(duration).await;
        Ok(())
    }

    /// Title of the current page.
    async fn title(&self) -> Result<String, BackendError>;

    /// URL of the current page.
    async fn url(&self) -> Result<String, BackendError>;

    /// Switch to the first context accepted by `selector`, polling
    /// [`list_contexts`](Self::list_contexts) until it shows up.
    ///
    /// Makes up to `retry.attempts` attempts with `retry.backoff_ms` between
    /// them (via [`pause`](Self::pause)) and fails with
    /// [`BackendError::NotFound`] if the context never becomes available.
    /// Listing errors count as a miss unless they are transport errors.
    ///
    /// # Returns
    ///
    /// The id of the context that is now active.
    async fn switch_to(
        &self,
        selector: &ContextSelector,
        retry: &ContextRetry,
    ) -> Result<ContextId, BackendError> {
        let attempts = retry.attempts.max(1);

        let mut last_error = None;

        for attempt in 1..=attempts {
            // A failed listing uses up an attempt; only transport loss aborts.
            match self.list_contexts().await {
                Ok(available) => {
                    if let Some(id) = selector.pick(&available) {
                        self.switch_context(&id).await?;
                        return Ok(id);
                    }
                    debug!(attempt, attempts, target = %selector, ?available, "context not available yet");
                }
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => {
                    debug!(attempt, attempts, target = %selector, error = %e, "listing contexts failed");
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                self.pause(retry.backoff()).await?;
            }
        }

        Err(BackendError::NotFound(match last_error {
            Some(e) => format!("context {} after {} attempts (last error: {})", selector, attempts, e),
            None => format!("context {} after {} attempts", selector, attempts),
        }))
    }

    /// Drop every element handle resolved so far. Called when a scenario
    /// run ends. The default does nothing.
    async fn release_elements(&self) {}

    /// End the session. The default does nothing.
    async fn quit(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
