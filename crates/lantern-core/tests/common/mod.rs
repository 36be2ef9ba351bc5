//! Shared test helpers for lantern-core integration tests.
//!
//! [`ScriptedBackend`] is an in-memory [`AutomationBackend`] whose UI is
//! described up front: which elements exist in which context, when they
//! appear, what text they show, when web views register their context, and
//! where the session should drop. Time is measured with `tokio::time`, so
//! tests run with `start_paused = true` are deterministic.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use lantern_core::backend::{AutomationBackend, BackendError, ElementHandle};
use lantern_core::context::ContextId;
use lantern_core::runner::SessionFactory;

pub const BROWSER: &str = "CHROMIUM";
pub const NATIVE: &str = "NATIVE_APP";
pub const WEBVIEW: &str = "WEBVIEW_com.example.helloworld";

#[derive(Debug, Clone)]
struct ScriptedElement {
    text: String,
    displayed: bool,
    appears_after: Duration,
    count: usize,
}

#[derive(Debug, Default)]
struct State {
    /// Keyed by (context, selector).
    elements: HashMap<(String, String), ScriptedElement>,
    /// Context name and the number of listings before it shows up.
    contexts: Vec<(String, usize)>,
    listings: usize,
    /// Number of `list_contexts` calls that fail before listings work.
    failing_listings: usize,
    current: String,
    title: String,
    url: String,
    handles: HashMap<String, (String, String)>,
    next_id: usize,
    releases: usize,
    stale_once: bool,
    lose_on: Option<String>,
    lost: bool,
    calls: Vec<String>,
    screenshots: Vec<String>,
    quit: bool,
}

/// Scriptable in-memory UI.
pub struct ScriptedBackend {
    start: Instant,
    state: Mutex<State>,
}

impl ScriptedBackend {
    fn with_contexts(contexts: Vec<(String, usize)>, current: &str) -> Self {
        Self {
            start: Instant::now(),
            state: Mutex::new(State {
                contexts,
                current: current.to_string(),
                title: "Hello World".to_string(),
                url: "http://localhost:8080/".to_string(),
                ..Default::default()
            }),
        }
    }

    /// A plain browser session with a single `CHROMIUM` context.
    pub fn browser() -> Self {
        Self::with_contexts(vec![(BROWSER.to_string(), 0)], BROWSER)
    }

    /// A hybrid app starting in the native context, with a web view that is
    /// available immediately.
    pub fn hybrid() -> Self {
        Self::with_contexts(
            vec![(NATIVE.to_string(), 0), (WEBVIEW.to_string(), 0)],
            NATIVE,
        )
    }

    /// A hybrid app whose web view only shows up after `listings` calls to
    /// `list_contexts` (`usize::MAX` for never).
    pub fn hybrid_webview_after(listings: usize) -> Self {
        Self::with_contexts(
            vec![(NATIVE.to_string(), 0), (WEBVIEW.to_string(), listings)],
            NATIVE,
        )
    }

    fn insert(self, context: &str, selector: &str, element: ScriptedElement) -> Self {
        self.state
            .lock()
            .unwrap()
            .elements
            .insert((context.to_string(), selector.to_string()), element);
        self
    }

    /// A visible element present from the start.
    pub fn element(self, context: &str, selector: &str, text: &str) -> Self {
        self.element_after(context, selector, text, Duration::ZERO)
    }

    /// A visible element that appears `delay` after the backend was created.
    pub fn element_after(self, context: &str, selector: &str, text: &str, delay: Duration) -> Self {
        self.insert(
            context,
            selector,
            ScriptedElement {
                text: text.to_string(),
                displayed: true,
                appears_after: delay,
                count: 1,
            },
        )
    }

    /// An element present in the tree but not displayed.
    pub fn hidden(self, context: &str, selector: &str) -> Self {
        self.insert(
            context,
            selector,
            ScriptedElement {
                text: String::new(),
                displayed: false,
                appears_after: Duration::ZERO,
                count: 1,
            },
        )
    }

    /// `count` identical elements matching one selector.
    pub fn duplicates(self, context: &str, selector: &str, count: usize) -> Self {
        self.insert(
            context,
            selector,
            ScriptedElement {
                text: selector.to_string(),
                displayed: true,
                appears_after: Duration::ZERO,
                count,
            },
        )
    }

    pub fn title(self, title: &str) -> Self {
        self.state.lock().unwrap().title = title.to_string();
        self
    }

    /// The first element operation reports a stale handle.
    pub fn stale_once(self) -> Self {
        self.state.lock().unwrap().stale_once = true;
        self
    }

    /// The first `count` calls to `list_contexts` fail with a command error.
    pub fn fail_listings(self, count: usize) -> Self {
        self.state.lock().unwrap().failing_listings = count;
        self
    }

    /// The session drops when `operation` is first called.
    pub fn lose_connection_on(self, operation: &str) -> Self {
        self.state.lock().unwrap().lose_on = Some(operation.to_string());
        self
    }

    /// Names of the backend operations called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// How often `operation` was called.
    pub fn count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    pub fn current(&self) -> String {
        self.state.lock().unwrap().current.clone()
    }

    /// Live element handles.
    pub fn handle_count(&self) -> usize {
        self.state.lock().unwrap().handles.len()
    }

    /// How often the runner released its handles.
    pub fn releases(&self) -> usize {
        self.state.lock().unwrap().releases
    }

    pub fn screenshots(&self) -> Vec<String> {
        self.state.lock().unwrap().screenshots.clone()
    }

    pub fn was_quit(&self) -> bool {
        self.state.lock().unwrap().quit
    }

    /// Records the call and fails if the session is (or is now) gone.
    fn enter(&self, operation: &str) -> Result<std::sync::MutexGuard<'_, State>, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(operation.to_string());
        if state.lose_on.as_deref() == Some(operation) {
            state.lost = true;
        }
        if state.lost {
            return Err(BackendError::ConnectionLost("scripted session dropped".to_string()));
        }
        Ok(state)
    }

    fn visible(&self, state: &State, selector: &str) -> Option<ScriptedElement> {
        state
            .elements
            .get(&(state.current.clone(), selector.to_string()))
            .filter(|e| self.start.elapsed() >= e.appears_after)
            .cloned()
    }

    fn new_handle(state: &mut State, selector: &str) -> ElementHandle {
        state.next_id += 1;
        let id = format!("el-{}", state.next_id);
        state
            .handles
            .insert(id.clone(), (state.current.clone(), selector.to_string()));
        ElementHandle::new(id)
    }

    fn lookup(&self, state: &mut State, handle: &ElementHandle) -> Result<ScriptedElement, BackendError> {
        if state.stale_once {
            state.stale_once = false;
            return Err(BackendError::StaleElement(handle.id().to_string()));
        }
        let (context, selector) = state
            .handles
            .get(handle.id())
            .cloned()
            .ok_or_else(|| BackendError::StaleElement(handle.id().to_string()))?;
        if context != state.current {
            return Err(BackendError::StaleElement(handle.id().to_string()));
        }
        state
            .elements
            .get(&(context, selector.clone()))
            .cloned()
            .ok_or(BackendError::NotFound(selector))
    }
}

#[async_trait]
impl AutomationBackend for ScriptedBackend {
    fn is_connected(&self) -> bool {
        !self.state.lock().unwrap().lost
    }

    async fn navigate(&self, target: &str) -> Result<(), BackendError> {
        let mut state = self.enter("navigate")?;
        state.url = format!("http://localhost:8080{}", target);
        Ok(())
    }

    async fn activate_app(&self, _app_id: &str) -> Result<(), BackendError> {
        self.enter("activate_app")?;
        Ok(())
    }

    async fn list_contexts(&self) -> Result<Vec<ContextId>, BackendError> {
        let mut state = self.enter("list_contexts")?;
        if state.failing_listings > 0 {
            state.failing_listings -= 1;
            return Err(BackendError::CommandFailed("no web view debugger attached".to_string()));
        }
        let listings = state.listings;
        state.listings += 1;
        Ok(state
            .contexts
            .iter()
            .filter(|(_, after)| listings >= *after)
            .map(|(name, _)| ContextId::new(name.clone()))
            .collect())
    }

    async fn current_context(&self) -> Result<ContextId, BackendError> {
        let state = self.enter("current_context")?;
        Ok(ContextId::new(state.current.clone()))
    }

    async fn switch_context(&self, context: &ContextId) -> Result<(), BackendError> {
        let mut state = self.enter("switch_context")?;
        if !state.contexts.iter().any(|(name, _)| name == context.as_str()) {
            return Err(BackendError::NotFound(context.to_string()));
        }
        state.current = context.as_str().to_string();
        Ok(())
    }

    async fn find_element(&self, selector: &str) -> Result<ElementHandle, BackendError> {
        let mut state = self.enter("find_element")?;
        match self.visible(&state, selector) {
            Some(_) => Ok(Self::new_handle(&mut state, selector)),
            None => Err(BackendError::NotFound(selector.to_string())),
        }
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<ElementHandle>, BackendError> {
        let mut state = self.enter("find_elements")?;
        let count = self.visible(&state, selector).map(|e| e.count).unwrap_or(0);
        Ok((0..count).map(|_| Self::new_handle(&mut state, selector)).collect())
    }

    async fn element_exists(&self, selector: &str) -> Result<bool, BackendError> {
        let state = self.enter("element_exists")?;
        Ok(self.visible(&state, selector).is_some())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), BackendError> {
        let mut state = self.enter("click")?;
        self.lookup(&mut state, element).map(|_| ())
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, BackendError> {
        let mut state = self.enter("text")?;
        self.lookup(&mut state, element).map(|e| e.text)
    }

    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool, BackendError> {
        let mut state = self.enter("is_displayed")?;
        self.lookup(&mut state, element).map(|e| e.displayed)
    }

    async fn screenshot(&self, label: &str) -> Result<PathBuf, BackendError> {
        let mut state = self.enter("screenshot")?;
        state.screenshots.push(label.to_string());
        Ok(PathBuf::from(format!("/artifacts/{}.png", label)))
    }

    async fn pause(&self, duration: Duration) -> Result<(), BackendError> {
        self.enter("pause")?;
        tokio::time::sleep(duration).await;
        Ok(())
    }

    async fn title(&self) -> Result<String, BackendError> {
        let state = self.enter("title")?;
        Ok(state.title.clone())
    }

    async fn url(&self) -> Result<String, BackendError> {
        let state = self.enter("url")?;
        Ok(state.url.clone())
    }

    async fn release_elements(&self) {
        let mut state = self.state.lock().unwrap();
        state.handles.clear();
        state.releases += 1;
    }

    async fn quit(&self) -> Result<(), BackendError> {
        self.state.lock().unwrap().quit = true;
        Ok(())
    }
}

/// Hands out scripted sessions built by `make`, or fails every open.
pub struct ScriptedSessions {
    make: Box<dyn Fn() -> ScriptedBackend + Send + Sync>,
    fail: bool,
    pub opened: AtomicUsize,
    pub sessions: Mutex<Vec<Arc<ScriptedBackend>>>,
}

impl ScriptedSessions {
    pub fn new(make: impl Fn() -> ScriptedBackend + Send + Sync + 'static) -> Self {
        Self {
            make: Box::new(make),
            fail: false,
            opened: AtomicUsize::new(0),
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail: true,
            ..Self::new(ScriptedBackend::browser)
        }
    }
}

#[async_trait]
impl SessionFactory for ScriptedSessions {
    async fn open(&self) -> Result<Arc<dyn AutomationBackend>, BackendError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(BackendError::ConnectionLost("connection refused".to_string()));
        }
        let backend = Arc::new((self.make)());
        self.sessions.lock().unwrap().push(backend.clone());
        Ok(backend)
    }
}

/// The hello-world page: `h1` appears after `delay` in the browser context.
pub fn hello_world_page(delay: Option<Duration>) -> ScriptedBackend {
    match delay {
        Some(delay) => ScriptedBackend::browser().element_after(BROWSER, "h1", "HelloWorld!", delay),
        None => ScriptedBackend::browser(),
    }
}
