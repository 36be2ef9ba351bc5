//! WebDriver / Appium backend.
//!
//! [`WebDriverBackend`] implements [`AutomationBackend`] on top of a
//! [`fantoccini`] client. It talks plain W3C WebDriver for browser sessions
//! and adds the Appium extensions hybrid apps need: the `/context` and
//! `/contexts` endpoints and `mobile: activateApp`.
//!
//! # Selectors
//!
//! | Form | Meaning |
//! |------|---------|
//! | `xpath://h1` | XPath expression |
//! | `id:android:id/button1` | native resource id, DOM `id` or `name` |
//! | `~Allow` | accessibility id (content description / label) |
//! | anything else | CSS selector |
//!
//! # Example
//!
//! ```no_run
//! use lantern_core::backend::AutomationBackend;
//! use lantern_core::config::LanternConfig;
//! use lantern_core::webdriver::WebDriverBackend;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LanternConfig::load()?;
//!     let backend = WebDriverBackend::connect(&config.webdriver()).await?;
//!     for context in backend.list_contexts().await? {
//!         println!("{}", context);
//!     }
//!     backend.quit().await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::wd::WebDriverCompatibleCommand;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::backend::{AutomationBackend, BackendError, ElementHandle, DEFAULT_POLL_INTERVAL};
use crate::context::ContextId;
use crate::runner::SessionFactory;

/// Context reported for sessions whose server has no context endpoints
/// (a plain browser driver).
const BROWSER_CONTEXT: &str = "CHROMIUM";

/// Connection settings for a WebDriver session.
#[derive(Debug, Clone, PartialEq)]
pub struct WebDriverConfig {
    /// WebDriver / Appium server URL.
    pub webdriver_url: String,
    /// Base URL for relative navigation targets.
    pub base_url: Option<String>,
    /// Session capabilities (a JSON object).
    pub capabilities: Value,
    /// Directory screenshots are written to.
    pub artifacts_dir: PathBuf,
    /// Interval between existence checks while waiting.
    pub poll_interval: Duration,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            webdriver_url: crate::config::DEFAULT_WEBDRIVER_URL.to_string(),
            base_url: None,
            capabilities: Value::Object(Default::default()),
            artifacts_dir: PathBuf::from("artifacts"),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// A parsed selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Css(String),
    XPath(String),
}

impl Selector {
    /// Parses the selector syntax described in the module docs.
    pub fn parse(selector: &str) -> Self {
        if let Some(xpath) = selector.strip_prefix("xpath:") {
            Selector::XPath(xpath.to_string())
        } else if let Some(id) = selector.strip_prefix("id:") {
            let id = xpath_literal(id);
            Selector::XPath(format!(
                "//*[@resource-id={id} or @id={id} or @name={id}]",
                id = id
            ))
        } else if let Some(label) = selector.strip_prefix('~') {
            let label = xpath_literal(label);
            Selector::XPath(format!(
                "//*[@content-desc={l} or @accessibility-id={l} or @label={l} or @name={l}]",
                l = label
            ))
        } else {
            Selector::Css(selector.to_string())
        }
    }

    fn locator(&self) -> Locator<'_> {
        match self {
            Selector::Css(css) => Locator::Css(css),
            Selector::XPath(xpath) => Locator::XPath(xpath),
        }
    }
}

/// Quotes a string as an XPath 1.0 literal.
fn xpath_literal(value: &str) -> String {
    if !value.contains('"') {
        format!("\"{}\"", value)
    } else if !value.contains('\'') {
        format!("'{}'", value)
    } else {
        let parts: Vec<String> = value.split('"').map(|p| format!("\"{}\"", p)).collect();
        format!("concat({})", parts.join(", '\"', "))
    }
}

/// Appium endpoints that are not part of W3C WebDriver.
#[derive(Debug, Clone)]
enum AppiumCommand {
    Contexts,
    CurrentContext,
    SetContext(String),
}

impl WebDriverCompatibleCommand for AppiumCommand {
    fn endpoint(&self, base_url: &Url, session_id: Option<&str>) -> Result<Url, url::ParseError> {
        let session = session_id.unwrap_or_default();
        let path = match self {
            AppiumCommand::Contexts => format!("session/{}/contexts", session),
            AppiumCommand::CurrentContext | AppiumCommand::SetContext(_) => {
                format!("session/{}/context", session)
            }
        };
        base_url.join(&path)
    }

    fn method_and_body(&self, _request_url: &Url) -> (http::Method, Option<String>) {
        match self {
            AppiumCommand::Contexts | AppiumCommand::CurrentContext => (http::Method::GET, None),
            AppiumCommand::SetContext(name) => (
                http::Method::POST,
                Some(json!({ "name": name }).to_string()),
            ),
        }
    }
}

/// Maps a WebDriver command error onto the backend taxonomy.
///
/// A dead session (`invalid session id`) and any failure to reach the server
/// are transport errors; everything else is local to the command.
fn map_cmd_error(err: CmdError, what: &str) -> BackendError {
    if err.is_no_such_element() {
        BackendError::NotFound(what.to_string())
    } else if err.is_stale_element_reference() {
        BackendError::StaleElement(what.to_string())
    } else if err.is_invalid_session_id()
        || matches!(err, CmdError::Lost(_) | CmdError::Failed(_) | CmdError::FailedC(_))
    {
        BackendError::ConnectionLost(format!("{}: {}", what, err))
    } else {
        BackendError::CommandFailed(format!("{}: {}", what, err))
    }
}

/// Servers without Appium extensions answer context commands with an
/// unknown-command error.
fn is_unknown_command(err: &CmdError) -> bool {
    err.is_unknown_command() || err.is_unknown_method() || err.is_unknown_path()
}

/// [`AutomationBackend`] over a WebDriver session.
pub struct WebDriverBackend {
    client: Client,
    config: WebDriverConfig,
    base_url: Option<Url>,
    elements: Mutex<HashMap<String, Element>>,
    next_id: AtomicU64,
    connected: AtomicBool,
    browser_only: AtomicBool,
}

impl WebDriverBackend {
    /// Opens a new session on the configured server.
    pub async fn connect(config: &WebDriverConfig) -> Result<Self, BackendError> {
        let base_url = match &config.base_url {
            Some(base) => Some(Url::parse(base).map_err(|e| {
                BackendError::CommandFailed(format!("invalid base URL '{}': {}", base, e))
            })?),
            None => None,
        };

        let capabilities = config.capabilities.as_object().cloned().unwrap_or_default();
        debug!(url = %config.webdriver_url, ?capabilities, "creating WebDriver session");

        let mut builder = ClientBuilder::native();
        builder.capabilities(capabilities);
        let client = builder
            .connect(&config.webdriver_url)
            .await
            .map_err(|e| {
                BackendError::ConnectionLost(format!(
                    "cannot create session at {}: {}",
                    config.webdriver_url, e
                ))
            })?;
        info!(url = %config.webdriver_url, "WebDriver session created");

        Ok(Self {
            client,
            config: config.clone(),
            base_url,
            elements: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(true),
            browser_only: AtomicBool::new(false),
        })
    }

    /// Returns the underlying fantoccini client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn check(&self, err: BackendError) -> BackendError {
        if err.is_transport() {
            self.connected.store(false, Ordering::SeqCst);
        }
        err
    }

    fn resolve_target(&self, target: &str) -> Result<String, BackendError> {
        if Url::parse(target).is_ok() {
            return Ok(target.to_string());
        }
        match &self.base_url {
            Some(base) => base
                .join(target)
                .map(String::from)
                .map_err(|e| BackendError::CommandFailed(format!("cannot resolve '{}': {}", target, e))),
            None => Err(BackendError::CommandFailed(format!(
                "relative target '{}' needs a base_url",
                target
            ))),
        }
    }

    async fn store(&self, element: Element) -> ElementHandle {
        let id = format!("el-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.elements.lock().await.insert(id.clone(), element);
        ElementHandle::new(id)
    }

    async fn element(&self, handle: &ElementHandle) -> Result<Element, BackendError> {
        self.elements
            .lock()
            .await
            .get(handle.id())
            .cloned()
            .ok_or_else(|| BackendError::StaleElement(handle.id().to_string()))
    }

    /// Maps the error of a command on a stored element. Stale elements are
    /// dropped from the handle map.
    async fn element_error(&self, handle: &ElementHandle, err: CmdError) -> BackendError {
        let err = self.check(map_cmd_error(err, handle.id()));
        if matches!(err, BackendError::StaleElement(_)) {
            self.elements.lock().await.remove(handle.id());
        }
        err
    }

    /// Issues an Appium extension command. `None` means the server does not
    /// know the command.
    async fn appium(&self, cmd: AppiumCommand) -> Result<Option<Value>, BackendError> {
        let what = format!("{:?}", cmd);
        match self.client.issue_cmd(cmd).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if is_unknown_command(&e) => {
                if !self.browser_only.swap(true, Ordering::SeqCst) {
                    debug!("server has no context endpoints, treating session as a browser");
                }
                Ok(None)
            }
            Err(e) => Err(self.check(map_cmd_error(e, &what))),
        }
    }
}

#[async_trait]
impl AutomationBackend for WebDriverBackend {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn navigate(&self, target: &str) -> Result<(), BackendError> {
        let url = self.resolve_target(target)?;
        debug!(%url, "navigate");
        self.client
            .goto(&url)
            .await
            .map_err(|e| self.check(map_cmd_error(e, &url)))
    }

    async fn activate_app(&self, app_id: &str) -> Result<(), BackendError> {
        self.client
            .execute("mobile: activateApp", vec![json!({ "appId": app_id })])
            .await
            .map(|_| ())
            .map_err(|e| self.check(map_cmd_error(e, app_id)))
    }

    async fn list_contexts(&self) -> Result<Vec<ContextId>, BackendError> {
        if self.browser_only.load(Ordering::SeqCst) {
            return Ok(vec![ContextId::new(BROWSER_CONTEXT)]);
        }
        match self.appium(AppiumCommand::Contexts).await? {
            Some(value) => {
                let names: Vec<String> = serde_json::from_value(value).map_err(|e| {
                    BackendError::CommandFailed(format!("unexpected contexts response: {}", e))
                })?;
                Ok(names.into_iter().map(ContextId::new).collect())
            }
            None => Ok(vec![ContextId::new(BROWSER_CONTEXT)]),
        }
    }

    async fn current_context(&self) -> Result<ContextId, BackendError> {
        if self.browser_only.load(Ordering::SeqCst) {
            return Ok(ContextId::new(BROWSER_CONTEXT));
        }
        match self.appium(AppiumCommand::CurrentContext).await? {
            Some(Value::String(name)) => Ok(ContextId::new(name)),
            Some(other) => Err(BackendError::CommandFailed(format!(
                "unexpected context response: {}",
                other
            ))),
            None => Ok(ContextId::new(BROWSER_CONTEXT)),
        }
    }

    async fn switch_context(&self, context: &ContextId) -> Result<(), BackendError> {
        // Element references from the old context are meaningless in the new one.
        self.elements.lock().await.clear();
        if self.browser_only.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.appium(AppiumCommand::SetContext(context.as_str().to_string()))
            .await
            .map(|_| ())
    }

    async fn find_element(&self, selector: &str) -> Result<ElementHandle, BackendError> {
        let parsed = Selector::parse(selector);
        let element = self
            .client
            .find(parsed.locator())
            .await
            .map_err(|e| self.check(map_cmd_error(e, selector)))?;
        Ok(self.store(element).await)
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<ElementHandle>, BackendError> {
        let parsed = Selector::parse(selector);
        let found = match self.client.find_all(parsed.locator()).await {
            Ok(found) => found,
            Err(e) if e.is_no_such_element() => Vec::new(),
            Err(e) => return Err(self.check(map_cmd_error(e, selector))),
        };
        let mut handles = Vec::with_capacity(found.len());
        for element in found {
            handles.push(self.store(element).await);
        }
        Ok(handles)
    }

    async fn element_exists(&self, selector: &str) -> Result<bool, BackendError> {
        // Polled often; does not keep the element.
        let parsed = Selector::parse(selector);
        match self.client.find_all(parsed.locator()).await {
            Ok(found) => Ok(!found.is_empty()),
            Err(e) if e.is_no_such_element() => Ok(false),
            Err(e) => Err(self.check(map_cmd_error(e, selector))),
        }
    }

    fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), BackendError> {
        match self.element(element).await?.click().await {
            Ok(value) => Ok(value),
            Err(e) => Err(self.element_error(element, e).await),
        }
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, BackendError> {
        match self.element(element).await?.text().await {
            Ok(value) => Ok(value),
            Err(e) => Err(self.element_error(element, e).await),
        }
    }

    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool, BackendError> {
        match self.element(element).await?.is_displayed().await {
            Ok(value) => Ok(value),
            Err(e) => Err(self.element_error(element, e).await),
        }
    }

    async fn screenshot(&self, label: &str) -> Result<PathBuf, BackendError> {
        let png = self
            .client
            .screenshot()
            .await
            .map_err(|e| self.check(map_cmd_error(e, "screenshot")))?;

        let path = write_artifact(&self.config.artifacts_dir, label, &png).await?;
        debug!(path = %path.display(), "screenshot saved");
        Ok(path)
    }

    async fn title(&self) -> Result<String, BackendError> {
        self.client
            .title()
            .await
            .map_err(|e| self.check(map_cmd_error(e, "title")))
    }

    async fn url(&self) -> Result<String, BackendError> {
        self.client
            .current_url()
            .await
            .map(String::from)
            .map_err(|e| self.check(map_cmd_error(e, "url")))
    }

    async fn release_elements(&self) {
        self.elements.lock().await.clear();
    }

    async fn quit(&self) -> Result<(), BackendError> {
        self.elements.lock().await.clear();
        self.connected.store(false, Ordering::SeqCst);
        self.client
            .clone()
            .close()
            .await
            .map_err(|e| map_cmd_error(e, "close session"))
    }
}

/// Writes a PNG into `dir`, creating it if needed.
async fn write_artifact(dir: &Path, label: &str, png: &[u8]) -> Result<PathBuf, BackendError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(artifact_name(label, &Utc::now().format("%Y%m%d_%H%M%S%3f").to_string()));
    tokio::fs::write(&path, png).await?;
    Ok(path)
}

fn artifact_name(label: &str, timestamp: &str) -> String {
    let label: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}_{}.png", label, timestamp)
}

/// Opens one WebDriver session per call, for isolated concurrent runs.
#[derive(Debug, Clone)]
pub struct WebDriverSessions {
    config: WebDriverConfig,
}

impl WebDriverSessions {
    pub fn new(config: WebDriverConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for WebDriverSessions {
    async fn open(&self) -> Result<Arc<dyn AutomationBackend>, BackendError> {
        let backend = WebDriverBackend::connect(&self.config).await?;
        Ok(Arc::new(backend))
    }
}
