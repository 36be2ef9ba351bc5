//! Report sink for scenario runs.
//!
//! A [`ReportLog`] receives [`RunEvent`]s from the runner as they happen,
//! broadcasts them to subscribers (a progress printer, a watcher) and appends
//! them to a JSON Lines file in `~/.lantern/reports/`. Finished
//! [`ScenarioReport`]s are also kept in memory so the caller can collect them
//! after the run.
//!
//! # Example
//!
//! ```no_run
//! use lantern_core::report_log::{ReportLog, RunEvent};
//!
//! #[tokio::main]
//! async fn main() {
//!     let log = ReportLog::new("hello_world");
//!     let mut rx = log.subscribe();
//!
//!     tokio::spawn(async move {
//!         while let Ok(entry) = rx.recv().await {
//!             if let RunEvent::ScenarioFinished { report } = &entry.event {
//!                 println!("{}: {:?}", report.scenario, report.verdict());
//!             }
//!         }
//!     });
//! }
//! ```

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::warn;
use uuid::Uuid;

use crate::config::lantern_dir;
use crate::report::{ScenarioReport, StepResult, SuiteSummary};

/// Returns the reports directory path (`~/.lantern/reports/`).
///
/// Creates the directory if it doesn't exist.
pub fn reports_dir() -> PathBuf {
    let dir = lantern_dir().join("reports");
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// Progress events emitted while a suite runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    SuiteStarted {
        suite: String,
        scenarios: usize,
    },
    ScenarioStarted {
        scenario: String,
        steps: usize,
    },
    StepFinished {
        scenario: String,
        result: StepResult,
    },
    ScenarioFinished {
        report: Arc<ScenarioReport>,
    },
    SuiteFinished {
        suite: String,
        summary: SuiteSummary,
    },
}

/// A [`RunEvent`] stamped with an id and time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: RunEvent,
}

/// Broadcasting, persisting sink for run events.
pub struct ReportLog {
    /// Name used for the persisted file.
    pub name: String,

    pub created_at: DateTime<Utc>,

    /// Finished scenario reports, in completion order.
    reports: RwLock<Vec<Arc<ScenarioReport>>>,

    event_tx: broadcast::Sender<LoggedEvent>,

    log_path: Option<PathBuf>,

    log_writer: Mutex<Option<BufWriter<std::fs::File>>>,
}

impl ReportLog {
    /// Creates a sink persisting to `~/.lantern/reports/{name}_{timestamp}_{id}.jsonl`.
    pub fn new(name: &str) -> Arc<Self> {
        Self::new_with_dir(name, &reports_dir())
    }

    /// Creates a sink persisting into `dir`. If the file cannot be created the
    /// sink still broadcasts and collects reports.
    pub fn new_with_dir(name: &str, dir: &Path) -> Arc<Self> {
        let created_at = Utc::now();
        let timestamp = created_at.format("%Y%m%d_%H%M%S%3f");
        let suffix = Uuid::new_v4().simple().to_string();
        let path = dir.join(format!("{}_{}_{}.jsonl", sanitize(name), timestamp, &suffix[..8]));

        let created = std::fs::OpenOptions::new().write(true).create_new(true).open(&path);
        let (log_path, log_writer) = match created {
            Ok(file) => (Some(path), Some(BufWriter::new(file))),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot create report log, continuing without it");
                (None, None)
            }
        };

        Self::build(name, created_at, log_path, log_writer)
    }

    /// Creates a sink that only broadcasts and collects.
    pub fn in_memory(name: &str) -> Arc<Self> {
        Self::build(name, Utc::now(), None, None)
    }

    fn build(
        name: &str,
        created_at: DateTime<Utc>,
        log_path: Option<PathBuf>,
        log_writer: Option<BufWriter<std::fs::File>>,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            name: name.to_string(),
            created_at,
            reports: RwLock::new(Vec::new()),
            event_tx,
            log_path,
            log_writer: Mutex::new(log_writer),
        })
    }

    /// Path of the JSON Lines file, if one is being written.
    pub fn path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Subscribes to run events. Slow receivers may miss events.
    pub fn subscribe(&self) -> broadcast::Receiver<LoggedEvent> {
        self.event_tx.subscribe()
    }

    /// Records an event: persists it, keeps finished reports and broadcasts it.
    pub async fn record(&self, event: RunEvent) -> LoggedEvent {
        let entry = LoggedEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        };

        if let RunEvent::ScenarioFinished { report } = &entry.event {
            self.reports.write().await.push(report.clone());
        }

        {
            let mut writer_guard = self.log_writer.lock().await;
            if let Some(ref mut writer) = *writer_guard {
                if let Ok(json) = serde_json::to_string(&entry) {
                    let _ = writeln!(writer, "{}", json);
                    let _ = writer.flush();
                }
            }
        }

        // No subscribers is fine.
        let _ = self.event_tx.send(entry.clone());
        entry
    }

    /// Convenience for the most common event.
    pub async fn scenario_finished(&self, report: ScenarioReport) -> Arc<ScenarioReport> {
        let report = Arc::new(report);
        self.record(RunEvent::ScenarioFinished {
            report: report.clone(),
        })
        .await;
        report
    }

    /// Returns the finished reports recorded so far.
    pub async fn reports(&self) -> Vec<Arc<ScenarioReport>> {
        self.reports.read().await.clone()
    }
}

impl std::fmt::Debug for ReportLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportLog")
            .field("name", &self.name)
            .field("created_at", &self.created_at)
            .field("log_path", &self.log_path)
            .field("event_tx", &"<broadcast::Sender>")
            .finish()
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
