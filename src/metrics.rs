// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Local usage metrics
//!
//! Events are appended as JSON lines to `events-YYYY-MM.jsonl` in the
//! metrics directory, one file per month. Nothing leaves the machine, paths
//! and branch names are replaced by [`fingerprint`]s, and a failed write
//! never reaches the user.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Version of the event line layout
pub const SCHEMA_VERSION: u32 = 1;

/// A CLI invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandEvent {
    /// Subcommand name
    pub name: String,
    /// Flags that were set (names only)
    pub flags: Vec<String>,
    /// Wall time
    pub duration_ms: u64,
    /// Process exit code
    pub exit_code: i32,
}

/// An item offered for cleanup and whether the user took it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestionEvent {
    /// What was suggested (`merged-branch`, `stale-branch`, ...)
    pub kind: String,
    /// Fingerprint of the item
    pub fingerprint: String,
    /// The user selected it
    pub accepted: bool,
}

/// Timing of a batch operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerfEvent {
    /// Operation name
    pub operation: String,
    /// Items processed
    pub items: usize,
    /// Wall time
    pub duration_ms: u64,
}

/// Event body; exactly one per line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// See [`CommandEvent`]
    Command(CommandEvent),
    /// See [`SuggestionEvent`]
    Suggestion(SuggestionEvent),
    /// See [`PerfEvent`]
    Perf(PerfEvent),
}

#[derive(Serialize)]
struct Event<'a> {
    schema_version: u32,
    timestamp: DateTime<Utc>,
    session_id: &'a str,
    #[serde(flatten)]
    payload: &'a Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    age_days: Option<i64>,
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Metrics sink
pub trait Metrics: Send + Sync {
    /// Append one event
    fn log(&self, payload: Payload, age_days: Option<i64>);

    /// Record a CLI invocation
    fn command(&self, name: &str, flags: Vec<String>, duration: Duration, exit_code: i32) {
        self.log(
            Payload::Command(CommandEvent {
                name: name.to_string(),
                flags,
                duration_ms: millis(duration),
                exit_code,
            }),
            None,
        );
    }

    /// Record a suggestion and the user's answer
    fn suggestion(&self, kind: &str, fingerprint: String, accepted: bool, age_days: Option<i64>) {
        self.log(
            Payload::Suggestion(SuggestionEvent {
                kind: kind.to_string(),
                fingerprint,
                accepted,
            }),
            age_days,
        );
    }

    /// Record how long a batch took
    fn perf(&self, operation: &str, items: usize, duration: Duration) {
        self.log(
            Payload::Perf(PerfEvent {
                operation: operation.to_string(),
                items,
                duration_ms: millis(duration),
            }),
            None,
        );
    }
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn log(&self, _payload: Payload, _age_days: Option<i64>) {}
}

struct OpenLog {
    month: String,
    file: File,
}

/// JSONL sink with monthly files, opened on first write
pub struct FileMetrics {
    dir: PathBuf,
    session_id: String,
    log: Mutex<Option<OpenLog>>,
}

impl FileMetrics {
    /// Sink writing under `dir` with a fresh session id
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            session_id: uuid::Uuid::new_v4().to_string(),
            log: Mutex::new(None),
        }
    }

    /// Session id stamped on every event
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// File events for `at` go to
    #[must_use]
    pub fn file_for(&self, at: DateTime<Utc>) -> PathBuf {
        self.dir.join(format!("events-{}.jsonl", at.format("%Y-%m")))
    }

    pub(crate) fn log_at(&self, payload: &Payload, age_days: Option<i64>, at: DateTime<Utc>) -> io::Result<()> {
        let event = Event {
            schema_version: SCHEMA_VERSION,
            timestamp: at,
            session_id: &self.session_id,
            payload,
            age_days,
        };
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let month = at.format("%Y-%m").to_string();
        let mut guard = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        let log = match guard.take() {
            Some(log) if log.month == month => guard.insert(log),
            _ => guard.insert(OpenLog {
                file: open_log(&self.dir, &self.file_for(at))?,
                month,
            }),
        };
        log.file.write_all(line.as_bytes())
    }
}

impl Metrics for FileMetrics {
    fn log(&self, payload: Payload, age_days: Option<i64>) {
        if let Err(e) = self.log_at(&payload, age_days, Utc::now()) {
            debug!(dir = %self.dir.display(), "metrics write failed: {e}");
        }
    }
}

#[cfg(unix)]
fn open_log(dir: &Path, path: &Path) -> io::Result<File> {
    use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
    fs::DirBuilder::new().recursive(true).mode(0o750).create(dir)?;
    OpenOptions::new().create(true).append(true).mode(0o600).open(path)
}

#[cfg(not(unix))]
fn open_log(dir: &Path, path: &Path) -> io::Result<File> {
    fs::create_dir_all(dir)?;
    OpenOptions::new().create(true).append(true).open(path)
}

/// Stable, boundary-safe identifier for a sequence of strings: SHA-256 over
/// `len:part` for each part, hex encoded.
#[must_use]
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.len().to_string().as_bytes());
        hasher.update(b":");
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}
