//! Sync progress reporting.
//!
//! `blogctl sync` reports which posts it is working on. Progress goes to
//! **stderr** so stdout stays clean for the final summary.

use std::io::Write;

/// Phase of the sync.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyncPhase {
    /// `ready` posts are rendered and written.
    Publish,
    /// `delete` posts are removed.
    Delete,
}

impl SyncPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncPhase::Publish => "publish",
            SyncPhase::Delete => "delete",
        }
    }
}

#[derive(Clone, Debug)]
pub enum SyncProgressEvent {
    /// Querying the source for this phase's posts.
    Querying { phase: SyncPhase },
    /// Working on post `n` of `total`.
    Post {
        phase: SyncPhase,
        n: usize,
        total: usize,
        title: String,
    },
    /// A post was skipped after an error.
    Failed {
        phase: SyncPhase,
        title: String,
        error: String,
    },
}

pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "sync publish  2 / 5  My post".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Querying { phase } => {
                format!("sync {}  querying...\n", phase.as_str())
            }
            SyncProgressEvent::Post {
                phase,
                n,
                total,
                title,
            } => format!("sync {}  {} / {}  {}\n", phase.as_str(), n, total, title),
            SyncProgressEvent::Failed {
                phase,
                title,
                error,
            } => format!("sync {}  FAILED  {}: {}\n", phase.as_str(), title, error),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &SyncProgressEvent) -> serde_json::Value {
        match event {
            SyncProgressEvent::Querying { phase } => serde_json::json!({
                "event": "querying",
                "phase": phase.as_str(),
            }),
            SyncProgressEvent::Post {
                phase,
                n,
                total,
                title,
            } => serde_json::json!({
                "event": "progress",
                "phase": phase.as_str(),
                "n": n,
                "total": total,
                "title": title,
            }),
            SyncProgressEvent::Failed {
                phase,
                title,
                error,
            } => serde_json::json!({
                "event": "failed",
                "phase": phase.as_str(),
                "title": title,
                "error": error,
            }),
        }
    }
}

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape() {
        let v = JsonProgress::to_json(&SyncProgressEvent::Post {
            phase: SyncPhase::Delete,
            n: 2,
            total: 3,
            title: "Old".to_string(),
        });
        assert_eq!(v["event"], "progress");
        assert_eq!(v["phase"], "delete");
        assert_eq!(v["n"], 2);
        assert_eq!(v["title"], "Old");
    }
}
