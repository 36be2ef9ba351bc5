//! Text rendering of suites and reports.

use lantern_core::report::{ScenarioReport, StepOutcome, StepResult, SuiteReport};
use lantern_core::report_log::{LoggedEvent, RunEvent};
use lantern_core::suite::Suite;

/// One-line status for a step: `[index] step target: outcome`.
pub fn step_line(result: &StepResult) -> String {
    let head = if result.target.is_empty() {
        format!("[{}] {}", result.index, result.step)
    } else {
        format!("[{}] {} {}", result.index, result.step, result.target)
    };
    match &result.outcome {
        StepOutcome::Success => head,
        StepOutcome::Skipped(reason) => format!("{}: skipped ({})", head, reason),
        StepOutcome::Failure(failure) => {
            let mut line = if result.tolerated {
                format!("{}: tolerated {}", head, failure)
            } else {
                format!("{}: {}", head, failure)
            };
            if let Some(artifact) = &result.artifact {
                line.push_str(&format!(" (screenshot: {})", artifact.display()));
            }
            line
        }
    }
}

/// Verdict line for a scenario plus one indented line per failed or
/// tolerated step.
pub fn scenario_report(report: &ScenarioReport) -> String {
    let mut out = if report.passed() {
        format!("  PASS {} ({}ms)", report.scenario, report.duration_ms())
    } else {
        let cause = report
            .failure_cause()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "not finished".to_string());
        format!("  FAIL {} ({}ms): {}", report.scenario, report.duration_ms(), cause)
    };

    for result in &report.steps {
        if matches!(result.outcome, StepOutcome::Failure(_)) {
            out.push_str("\n      ");
            out.push_str(&step_line(result));
        }
    }
    out
}

pub fn suite_report(report: &SuiteReport) -> String {
    let mut out = format!("suite {}\n", report.suite);
    for scenario in &report.scenarios {
        out.push_str(&scenario_report(scenario));
        out.push('\n');
    }
    let summary = report.summary();
    out.push_str(&format!(
        "{} passed, {} failed ({} assertion, {} automation)",
        summary.passed, summary.failed, summary.assertion_failures, summary.automation_failures
    ));
    out
}

/// Progress line for a finished step, in the `|time|scenario|step|target|duration|status|` layout.
pub fn progress_line(entry: &LoggedEvent) -> Option<String> {
    let RunEvent::StepFinished { scenario, result } = &entry.event else {
        return None;
    };
    let status = match &result.outcome {
        StepOutcome::Success => "ok".to_string(),
        StepOutcome::Skipped(_) => "skipped".to_string(),
        StepOutcome::Failure(failure) if result.tolerated => format!("tolerated {}", failure.kind),
        StepOutcome::Failure(failure) => failure.kind.to_string(),
    };
    Some(format!(
        "|{}|{}|{}|{}|{}ms|{}|",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3fZ"),
        scenario,
        result.step,
        result.target,
        result.elapsed_ms,
        status
    ))
}

/// Scenario listing for `lantern list`.
pub fn suite_listing(suite: &Suite) -> String {
    let mut out = suite.name.clone();
    if let Some(description) = &suite.description {
        out.push_str(&format!(" - {}", description));
    }
    for scenario in &suite.scenarios {
        out.push_str(&format!("\n  {} ({} steps)", scenario.name, scenario.steps.len()));
        if let Some(title) = &scenario.title {
            out.push_str(&format!("  {}", title));
        }
    }
    out
}
