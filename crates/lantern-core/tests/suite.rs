//! Suite loading and suite runs, sequential and isolated.

mod common;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedBackend, ScriptedSessions, BROWSER, WEBVIEW};

use lantern_core::context::ContextSelector;
use lantern_core::policy::{Policy, PolicyMode};
use lantern_core::report::{FailureCategory, FailureCause, FailureKind, RunState};
use lantern_core::report_log::{ReportLog, RunEvent};
use lantern_core::runner::{RunOptions, SuiteRunner};
use lantern_core::scenario::Step;
use lantern_core::suite::{Suite, SuiteError};
use tokio_util::sync::CancellationToken;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn hello_world(overrides: &[(&str, &str)]) -> Suite {
    let overrides: BTreeMap<String, String> = overrides
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Suite::from_path(fixture("hello_world.yaml"))
        .unwrap()
        .resolve(&overrides)
        .unwrap()
}

/// The browser page and the app's web view both render the full UI.
fn full_app(version: &str) -> ScriptedBackend {
    ScriptedBackend::hybrid()
        .element(BROWSER, "h1", "HelloWorld!")
        .element(WEBVIEW, "h1", "HelloWorld!")
        .element(WEBVIEW, "a.button--large", "Start Demo")
        .element(WEBVIEW, "#platform", "Android")
        .element(WEBVIEW, "#version", &format!("Android {}", version))
}

#[test]
fn test_fixture_loads_and_expands() {
    let suite = hello_world(&[]);
    assert_eq!(suite.name, "hello-world");
    let names: Vec<_> = suite.scenarios.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["home-page", "open-app", "device-info"]);

    let info = suite.scenario("device-info").unwrap();
    assert_eq!(
        info.steps[0],
        Step::SwitchContext {
            context: ContextSelector::Named(WEBVIEW.to_string())
        }
    );
    assert_eq!(suite.policy_for(info, &Policy::default()).mode, PolicyMode::BestEffort);

    let options = suite.run_options(RunOptions::default());
    assert_eq!(options.wait_timeout, Duration::from_millis(5000));
    assert_eq!(options.context_retry.attempts, 5);
}

#[test]
fn test_wait_timeout_override_beats_suite_default() {
    let suite = hello_world(&[]);
    let options = SuiteRunner::new(Policy::default())
        .with_wait_timeout(Duration::from_millis(750))
        .options_for(&suite);
    assert_eq!(options.wait_timeout, Duration::from_millis(750));
    assert_eq!(options.context_retry.attempts, 5);
}

#[test]
fn test_missing_file_is_io_error() {
    let err = Suite::from_path(fixture("does_not_exist.yaml")).unwrap_err();
    assert!(matches!(err, SuiteError::Io { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_sequential_suite_on_hybrid_app() {
    let suite = hello_world(&[]).select(&["open-app".to_string(), "device-info".to_string()]).unwrap();
    let backend = Arc::new(full_app("14"));

    let report = SuiteRunner::new(Policy::fail_fast()).run(&suite, backend).await;

    assert!(report.passed(), "{:#?}", report.scenarios);
    let summary = report.summary();
    assert_eq!((summary.passed, summary.failed), (2, 0));
}

#[tokio::test(start_paused = true)]
async fn test_version_mismatch_is_an_assertion_failure() {
    let suite = hello_world(&[]).select(&["device-info".to_string()]).unwrap();
    let backend = Arc::new(full_app("13"));

    let report = SuiteRunner::new(Policy::fail_fast()).run(&suite, backend.clone()).await;

    let info = &report.scenarios[0];
    // best-effort from the scenario: every step ran.
    assert!(info.steps.iter().all(|r| !r.is_skipped()));
    let (result, failure) = info.failures().next().unwrap();
    assert_eq!(result.index, 5);
    assert_eq!(failure.kind, FailureKind::AssertionMismatch);
    // capture_on_failure from the scenario policy.
    assert!(result.artifact.is_some());
    assert_eq!(report.worst_category(), Some(FailureCategory::Assertion));
}

#[tokio::test(start_paused = true)]
async fn test_var_override_changes_expectation() {
    let suite = hello_world(&[("version", "13")])
        .select(&["device-info".to_string()])
        .unwrap();
    let backend = Arc::new(full_app("13"));
    let report = SuiteRunner::new(Policy::fail_fast()).run(&suite, backend).await;
    assert!(report.passed());
}

#[tokio::test(start_paused = true)]
async fn test_mode_override_wins_over_scenario_policy() {
    let suite = hello_world(&[]).select(&["device-info".to_string()]).unwrap();
    let backend = Arc::new(ScriptedBackend::hybrid().element(WEBVIEW, "#version", "Android 14"));

    let report = SuiteRunner::new(Policy::best_effort())
        .with_mode(PolicyMode::FailFast)
        .with_capture_on_failure(false)
        .run(&suite, backend.clone())
        .await;

    let info = &report.scenarios[0];
    assert_eq!(info.policy, PolicyMode::FailFast);
    // #platform never appears: the run stops at the first wait.
    assert!(matches!(info.state, RunState::Failed(FailureCause::StepFailed { index: 2 })));
    assert!(info.steps[3..].iter().all(|r| r.is_skipped()));
    assert_eq!(backend.screenshots(), vec!["info_section_before".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_transport_loss_skips_later_scenarios() {
    let suite = hello_world(&[]).select(&["open-app".to_string(), "device-info".to_string()]).unwrap();
    let backend = Arc::new(full_app("14").lose_connection_on("activate_app"));

    let report = SuiteRunner::new(Policy::fail_fast()).run(&suite, backend.clone()).await;

    assert!(report.scenarios[0].transport_lost());
    let second = &report.scenarios[1];
    assert!(second.steps.iter().all(|r| r.is_skipped()));
    assert!(matches!(
        second.state,
        RunState::Failed(FailureCause::Transport { index: None, .. })
    ));
    // The second scenario never touched the backend.
    assert_eq!(backend.calls(), vec!["activate_app".to_string()]);
    assert_eq!(report.worst_category(), Some(FailureCategory::Automation));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_suite_reports_remaining_scenarios() {
    let suite = hello_world(&[]).select(&["open-app".to_string(), "device-info".to_string()]).unwrap();
    let backend = Arc::new(full_app("14"));
    let token = CancellationToken::new();
    token.cancel();

    let report = SuiteRunner::new(Policy::fail_fast())
        .with_cancellation(token)
        .run(&suite, backend)
        .await;

    for scenario in &report.scenarios {
        assert_eq!(scenario.state, RunState::Failed(FailureCause::Cancelled { at_step: 0 }));
    }
}

#[tokio::test(start_paused = true)]
async fn test_isolated_sessions_run_concurrently_in_suite_order() {
    let suite = hello_world(&[]).select(&["open-app".to_string(), "device-info".to_string()]).unwrap();
    let factory = Arc::new(ScriptedSessions::new(|| full_app("14")));
    let log = ReportLog::in_memory("isolated");
    let mut rx = log.subscribe();

    let report = SuiteRunner::new(Policy::fail_fast())
        .with_report_log(log.clone())
        .run_isolated(&suite, factory.clone(), 2)
        .await;

    assert!(report.passed(), "{:#?}", report.scenarios);
    let names: Vec<_> = report.scenarios.iter().map(|s| s.scenario.as_str()).collect();
    assert_eq!(names, vec!["open-app", "device-info"]);
    assert_eq!(factory.opened.load(Ordering::SeqCst), 2);
    assert!(factory.sessions.lock().unwrap().iter().all(|s| s.was_quit()));

    let mut suite_events = 0;
    while let Ok(entry) = rx.try_recv() {
        if matches!(entry.event, RunEvent::SuiteStarted { .. } | RunEvent::SuiteFinished { .. }) {
            suite_events += 1;
        }
    }
    assert_eq!(suite_events, 2);
    assert_eq!(log.reports().await.len(), 2);
}

#[tokio::test]
async fn test_isolated_session_failure_is_automation_failure() {
    let suite = hello_world(&[]).select(&["home-page".to_string()]).unwrap();
    let factory = Arc::new(ScriptedSessions::unreachable());

    let report = SuiteRunner::new(Policy::fail_fast())
        .run_isolated(&suite, factory, 4)
        .await;

    let home = &report.scenarios[0];
    assert!(matches!(
        home.state,
        RunState::Failed(FailureCause::Transport { index: None, ref message }) if message.contains("connection refused")
    ));
    assert_eq!(report.worst_category(), Some(FailureCategory::Automation));
}
