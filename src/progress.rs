//! Harvest progress reporting.
//!
//! Reports what a `chv harvest` run is doing: one event per thread page,
//! one per thread whose replies could not be fully collected, and one at
//! the end. Progress goes to **stderr** so stdout stays parseable.

use std::io::Write;

/// A single progress event for a harvest run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HarvestProgressEvent {
    /// A thread page and all of its replies have been processed.
    Page {
        scope: String,
        page: u64,
        threads: u64,
        replies: u64,
    },
    /// Reply collection for one thread stopped early.
    IncompleteThread { scope: String, thread_id: String },
    /// The run ended with `status`.
    Finished {
        scope: String,
        status: &'static str,
        documents: u64,
    },
}

pub trait HarvestProgressReporter: Send + Sync {
    fn report(&self, event: HarvestProgressEvent);
}

/// Human-friendly progress on stderr: "harvest video:abc  page 3  1,234 threads  5,678 replies".
pub struct StderrProgress;

impl HarvestProgressReporter for StderrProgress {
    fn report(&self, event: HarvestProgressEvent) {
        let line = match &event {
            HarvestProgressEvent::Page {
                scope,
                page,
                threads,
                replies,
            } => format!(
                "harvest {}  page {}  {} threads  {} replies\n",
                scope,
                page,
                format_number(*threads),
                format_number(*replies)
            ),
            HarvestProgressEvent::IncompleteThread { scope, thread_id } => {
                format!("harvest {}  replies incomplete for thread {}\n", scope, thread_id)
            }
            HarvestProgressEvent::Finished {
                scope,
                status,
                documents,
            } => format!(
                "harvest {}  {}  {} documents\n",
                scope,
                status,
                format_number(*documents)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl HarvestProgressReporter for JsonProgress {
    fn report(&self, event: HarvestProgressEvent) {
        let obj = match &event {
            HarvestProgressEvent::Page {
                scope,
                page,
                threads,
                replies,
            } => serde_json::json!({
                "event": "page",
                "scope": scope,
                "page": page,
                "threads": threads,
                "replies": replies
            }),
            HarvestProgressEvent::IncompleteThread { scope, thread_id } => serde_json::json!({
                "event": "incomplete_thread",
                "scope": scope,
                "thread_id": thread_id
            }),
            HarvestProgressEvent::Finished {
                scope,
                status,
                documents,
            } => serde_json::json!({
                "event": "finished",
                "scope": scope,
                "status": status,
                "documents": documents
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

pub struct NoProgress;

impl HarvestProgressReporter for NoProgress {
    fn report(&self, _event: HarvestProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
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

    pub fn reporter(&self) -> Box<dyn HarvestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
