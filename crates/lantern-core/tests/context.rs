//! Context switching: retry against late web views, selection, and the
//! hybrid-app flow from app activation to the demo page.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedBackend, NATIVE, WEBVIEW};

use lantern_core::backend::{AutomationBackend, BackendError};
use lantern_core::context::{ContextId, ContextRetry, ContextSelector, ExecutionContext};
use lantern_core::policy::Policy;
use lantern_core::report::{FailureCause, FailureKind, RunState};
use lantern_core::runner::{RunOptions, ScenarioRunner};
use lantern_core::scenario::{MatchMode, Scenario, Step};

fn retry(attempts: u32, backoff_ms: u64) -> ContextRetry {
    ContextRetry { attempts, backoff_ms }
}

#[tokio::test(start_paused = true)]
async fn test_switch_to_unavailable_webview_retries_then_not_found() {
    let backend = ScriptedBackend::hybrid_webview_after(usize::MAX);
    let start = tokio::time::Instant::now();

    let err = backend
        .switch_to(&ContextSelector::WebView, &retry(3, 500))
        .await
        .unwrap_err();

    assert!(matches!(err, BackendError::NotFound(ref msg) if msg.contains("after 3 attempts")));
    assert_eq!(backend.count("list_contexts"), 3);
    assert_eq!(backend.count("switch_context"), 0);
    // Two pauses between three attempts.
    assert_eq!(start.elapsed(), Duration::from_millis(1000));
    assert_eq!(backend.current(), NATIVE);
}

#[tokio::test(start_paused = true)]
async fn test_switch_succeeds_once_webview_registers() {
    let backend = ScriptedBackend::hybrid_webview_after(2);

    let id = backend
        .switch_to(&ContextSelector::WebView, &retry(5, 1000))
        .await
        .unwrap();

    assert_eq!(id, ContextId::new(WEBVIEW));
    assert_eq!(backend.count("list_contexts"), 3);
    assert_eq!(backend.current(), WEBVIEW);
}

#[tokio::test(start_paused = true)]
async fn test_failed_listing_uses_an_attempt() {
    let backend = ScriptedBackend::hybrid().fail_listings(1);

    let id = backend
        .switch_to(&ContextSelector::WebView, &retry(3, 500))
        .await
        .unwrap();

    assert_eq!(id, ContextId::new(WEBVIEW));
    assert_eq!(backend.count("list_contexts"), 2);
    assert_eq!(backend.count("pause"), 1);
    assert_eq!(backend.current(), WEBVIEW);
}

#[tokio::test(start_paused = true)]
async fn test_listing_failures_exhaust_attempts_with_last_error() {
    let backend = ScriptedBackend::hybrid().fail_listings(usize::MAX);

    let err = backend
        .switch_to(&ContextSelector::WebView, &retry(3, 500))
        .await
        .unwrap_err();

    match err {
        BackendError::NotFound(msg) => {
            assert!(msg.contains("after 3 attempts"));
            assert!(msg.contains("no web view debugger attached"));
        }
        other => panic!("expected NotFound, got {:?}", other),
    }
    assert_eq!(backend.count("list_contexts"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_lost_session_ends_context_retry() {
    let backend = ScriptedBackend::hybrid_webview_after(usize::MAX).lose_connection_on("list_contexts");

    let err = backend
        .switch_to(&ContextSelector::WebView, &retry(5, 500))
        .await
        .unwrap_err();

    assert!(err.is_transport());
    assert_eq!(backend.count("list_contexts"), 1);
    assert_eq!(backend.count("pause"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_single_attempt_does_not_pause() {
    let backend = ScriptedBackend::hybrid_webview_after(usize::MAX);
    let err = backend
        .switch_to(&ContextSelector::WebView, &retry(1, 1000))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::NotFound(_)));
    assert_eq!(backend.count("pause"), 0);
}

#[tokio::test]
async fn test_switch_by_name_pattern() {
    let backend = ScriptedBackend::hybrid();
    let id = backend
        .switch_to(
            &ContextSelector::Named("WEBVIEW_com.example.*".to_string()),
            &ContextRetry::default(),
        )
        .await
        .unwrap();
    assert_eq!(id.as_str(), WEBVIEW);

    let id = backend
        .switch_to(&ContextSelector::Native, &ContextRetry::default())
        .await
        .unwrap();
    assert!(id.is_native());
    assert_eq!(backend.current_context().await.unwrap(), ContextId::native());
}

#[tokio::test(start_paused = true)]
async fn test_failed_switch_step_reports_not_found_and_keeps_context() {
    let backend = Arc::new(
        ScriptedBackend::hybrid_webview_after(usize::MAX).element(NATIVE, "~Allow", "Allow"),
    );
    let scenario = Scenario::new(
        "late-webview",
        vec![
            Step::SwitchContext {
                context: ContextSelector::Native,
            },
            Step::SwitchContext {
                context: ContextSelector::WebView,
            },
            Step::Click {
                selector: "~Allow".to_string(),
            },
        ],
    );
    let options = RunOptions {
        context_retry: retry(4, 250),
        ..Default::default()
    };

    let report = ScenarioRunner::new(backend.clone())
        .with_options(options)
        .run(&scenario, &Policy::best_effort())
        .await;

    let failure = report.steps[1].failure_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::NotFound);
    assert_eq!(report.steps[1].elapsed_ms, 750);
    // Still in the native context, so the native button is clickable.
    assert_eq!(report.steps[1].context, Some(ExecutionContext::Native));
    assert!(report.steps[2].is_success());
    assert_eq!(report.state, RunState::Failed(FailureCause::StepFailures { count: 1 }));
}

/// The hybrid app flow: activate, wait for the web view, check the home page,
/// open the demo page.
#[tokio::test(start_paused = true)]
async fn test_hybrid_app_home_and_demo_page() {
    let backend = Arc::new(
        ScriptedBackend::hybrid_webview_after(2)
            .element_after(WEBVIEW, "h1", "HelloWorld!", Duration::from_millis(4000))
            .element(WEBVIEW, "a.button--large", "Start Demo"),
    );
    let scenario = Scenario::new(
        "open-app",
        vec![
            Step::ActivateApp {
                app_id: "com.example.helloworld".to_string(),
            },
            Step::Pause { duration_ms: 3000 },
            Step::SwitchContext {
                context: ContextSelector::WebView,
            },
            Step::WaitForExist {
                selector: "h1".to_string(),
                timeout_ms: Some(10_000),
            },
            Step::AssertText {
                selector: "h1".to_string(),
                expected: "HelloWorld!".to_string(),
                match_mode: MatchMode::Exact,
            },
            Step::AssertVisible {
                selector: "a.button--large".to_string(),
                expected: true,
                check: Default::default(),
            },
            Step::Capture {
                label: "home_page".to_string(),
            },
            Step::Click {
                selector: "a.button--large".to_string(),
            },
            Step::Capture {
                label: "demo_page_navigation".to_string(),
            },
        ],
    );

    let options = RunOptions {
        context_retry: retry(5, 100),
        ..Default::default()
    };
    let report = ScenarioRunner::new(backend.clone())
        .with_options(options)
        .run(&scenario, &Policy::fail_fast())
        .await;

    assert!(report.passed(), "{:#?}", report.steps);
    assert_eq!(report.steps[2].detail.as_deref(), Some(WEBVIEW));
    assert_eq!(
        backend.screenshots(),
        vec!["home_page".to_string(), "demo_page_navigation".to_string()]
    );
    assert_eq!(backend.current(), WEBVIEW);
}
