//! Wait semantics: `wait_for_exist` polling, default timeouts and the
//! hello-world page timings.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{hello_world_page, ScriptedBackend, BROWSER};

use lantern_core::backend::{AutomationBackend, BackendError};
use lantern_core::context::ExecutionContext;
use lantern_core::policy::Policy;
use lantern_core::report::{FailureCause, FailureKind, RunState, StepOutcome, Verdict};
use lantern_core::runner::{RunOptions, ScenarioRunner};
use lantern_core::scenario::{MatchMode, Scenario, Step};

fn hello_world(timeout_ms: Option<u64>) -> Scenario {
    Scenario::new(
        "home-page",
        vec![
            Step::Navigate { target: "/".to_string() },
            Step::WaitForExist {
                selector: "h1".to_string(),
                timeout_ms,
            },
            Step::AssertText {
                selector: "h1".to_string(),
                expected: "HelloWorld!".to_string(),
                match_mode: MatchMode::Exact,
            },
        ],
    )
    .starting_in(ExecutionContext::WebView(BROWSER.to_string()))
}

#[tokio::test(start_paused = true)]
async fn test_heading_appearing_after_one_second_passes() {
    let backend = Arc::new(hello_world_page(Some(Duration::from_millis(1000))));
    let report = ScenarioRunner::new(backend.clone())
        .run(&hello_world(Some(5000)), &Policy::fail_fast())
        .await;

    let outcomes: Vec<_> = report.steps.iter().map(|r| r.outcome.clone()).collect();
    assert_eq!(outcomes, vec![StepOutcome::Success, StepOutcome::Success, StepOutcome::Success]);
    assert_eq!(report.state, RunState::Passed);
    assert_eq!(report.verdict(), Verdict::Passed);

    // Found on the first poll at or after 1000ms.
    assert_eq!(report.steps[1].elapsed_ms, 1000);
    assert_eq!(report.steps[2].detail.as_deref(), Some("HelloWorld!"));
}

#[tokio::test(start_paused = true)]
async fn test_heading_never_appearing_times_out_and_skips_rest() {
    let backend = Arc::new(hello_world_page(None));
    let report = ScenarioRunner::new(backend)
        .run(&hello_world(Some(5000)), &Policy::fail_fast())
        .await;

    assert_eq!(report.steps.len(), 3);
    assert_eq!(report.steps[0].outcome, StepOutcome::Success);
    let failure = report.steps[1].failure_ref().expect("wait should fail");
    assert_eq!(failure.kind, FailureKind::TimedOut);
    assert!(failure.message.contains("'h1'"));
    assert!(report.steps[2].is_skipped());
    assert_eq!(report.state, RunState::Failed(FailureCause::StepFailed { index: 1 }));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_elapsed_within_one_poll_interval() {
    let backend = Arc::new(hello_world_page(None));
    let poll = backend.poll_interval().as_millis() as u64;

    for timeout in [250u64, 1000, 5000, 1234] {
        let report = ScenarioRunner::new(backend.clone())
            .run(&hello_world(Some(timeout)), &Policy::fail_fast())
            .await;
        let elapsed = report.steps[1].elapsed_ms;
        assert!(
            elapsed >= timeout && elapsed < timeout + poll,
            "timeout {}ms took {}ms",
            timeout,
            elapsed
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_default_timeout_is_five_seconds() {
    let backend = Arc::new(hello_world_page(None));
    let report = ScenarioRunner::new(backend)
        .run(&hello_world(None), &Policy::fail_fast())
        .await;
    assert_eq!(report.steps[1].elapsed_ms, 5000);
}

#[tokio::test(start_paused = true)]
async fn test_run_options_override_default_timeout() {
    let backend = Arc::new(hello_world_page(None));
    let options = RunOptions {
        wait_timeout: Duration::from_millis(800),
        ..Default::default()
    };
    let report = ScenarioRunner::new(backend)
        .with_options(options)
        .run(&hello_world(None), &Policy::fail_fast())
        .await;
    assert_eq!(report.steps[1].elapsed_ms, 800);
}

#[tokio::test(start_paused = true)]
async fn test_backend_wait_resolves_before_deadline() {
    let backend = hello_world_page(Some(Duration::from_millis(2000)));
    let start = tokio::time::Instant::now();
    backend
        .wait_for_exist("h1", Duration::from_millis(5000))
        .await
        .unwrap();
    assert_eq!(start.elapsed(), Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn test_backend_wait_stops_on_transport_loss() {
    let backend = ScriptedBackend::browser().lose_connection_on("element_exists");
    let start = tokio::time::Instant::now();
    let err = backend
        .wait_for_exist("h1", Duration::from_millis(5000))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::ConnectionLost(_)));
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_checks_once() {
    let backend = hello_world_page(None);
    let err = backend.wait_for_exist("h1", Duration::ZERO).await.unwrap_err();
    assert!(matches!(err, BackendError::Timeout(0)));
    assert_eq!(backend.count("element_exists"), 1);
}
