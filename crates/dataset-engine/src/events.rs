// crates/dataset-engine/src/events.rs
// ============================================================================
// Module: Engine Events
// Description: Structured engine events and their sinks.
// Purpose: Emit JSON-line operational logs without a logging framework.
// Dependencies: dataset-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Services report noteworthy transitions (barrier timeouts, lock contention,
//! snapshot and import progress, job failures, counter repairs) as
//! [`EngineEvent`] values. Deployments choose a sink: JSON lines on stderr,
//! an append-only file, nothing, or an in-memory buffer for tests. Events
//! never carry item payloads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use dataset_core::DatasetError;
use dataset_core::DatasetId;
use dataset_core::JobId;
use dataset_core::VersionId;
use dataset_core::core::time::now_millis;
use serde::Serialize;

// ============================================================================
// SECTION: Event Names
// ============================================================================

/// Barrier wait elapsed without the conflicting operations clearing.
pub const BARRIER_WAIT_TIMEOUT: &str = "barrier_wait_timeout";
/// Another worker holds a job or version lock.
pub const LOCK_CONTENDED: &str = "lock_contended";
/// Lease renewal stopped before the work finished.
pub const LOCK_LOST: &str = "lock_lost";
/// Snapshot cursor committed.
pub const SNAPSHOT_PROGRESS: &str = "snapshot_progress";
/// Snapshot finished.
pub const SNAPSHOT_COMPLETED: &str = "snapshot_completed";
/// Snapshot marked failed.
pub const SNAPSHOT_FAILED: &str = "snapshot_failed";
/// Another worker advanced the snapshot first.
pub const SNAPSHOT_SUPERSEDED: &str = "snapshot_superseded";
/// Snapshot job could not be published.
pub const SNAPSHOT_ENQUEUE_FAILED: &str = "snapshot_enqueue_failed";
/// Import unit committed.
pub const IMPORT_FLUSH: &str = "import_flush";
/// Import finished.
pub const IMPORT_COMPLETED: &str = "import_completed";
/// Job marked failed.
pub const JOB_FAILED: &str = "job_failed";
/// Job message re-enqueued after a retryable error.
pub const JOB_REQUEUED: &str = "job_requeued";
/// Job message dropped without work.
pub const JOB_SKIPPED: &str = "job_skipped";
/// Reserved capacity returned to the counter.
pub const CAPACITY_REFUND: &str = "capacity_refund";
/// Counter repaired from the repository.
pub const COUNTER_ANOMALY: &str = "counter_anomaly";
/// Id generator unavailable; store-assigned ids used instead.
pub const ID_FALLBACK: &str = "id_fallback";
/// Best-effort cleanup of payload objects failed.
pub const PAYLOAD_CLEANUP_FAILED: &str = "payload_cleanup_failed";

// ============================================================================
// SECTION: Event
// ============================================================================

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    /// Routine progress.
    Info,
    /// Degraded but recoverable.
    Warn,
    /// Work failed.
    Error,
}

/// Engine event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Severity.
    pub level: EventLevel,
    /// Dataset identifier when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<DatasetId>,
    /// Version identifier when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<VersionId>,
    /// Job identifier when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    /// Normalized error kind label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    /// Human-readable message.
    pub message: String,
}

impl EngineEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(event: &'static str, level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            event,
            timestamp_ms: now_millis(),
            level,
            dataset_id: None,
            version_id: None,
            job_id: None,
            error_kind: None,
            message: message.into(),
        }
    }

    /// Creates an info event.
    #[must_use]
    pub fn info(event: &'static str, message: impl Into<String>) -> Self {
        Self::new(event, EventLevel::Info, message)
    }

    /// Creates a warning event.
    #[must_use]
    pub fn warn(event: &'static str, message: impl Into<String>) -> Self {
        Self::new(event, EventLevel::Warn, message)
    }

    /// Creates an error event.
    #[must_use]
    pub fn error(event: &'static str, message: impl Into<String>) -> Self {
        Self::new(event, EventLevel::Error, message)
    }

    /// Attaches a dataset identifier.
    #[must_use]
    pub const fn dataset(mut self, dataset_id: DatasetId) -> Self {
        self.dataset_id = Some(dataset_id);
        self
    }

    /// Attaches a version identifier.
    #[must_use]
    pub const fn version(mut self, version_id: VersionId) -> Self {
        self.version_id = Some(version_id);
        self
    }

    /// Attaches a job identifier.
    #[must_use]
    pub const fn job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    /// Attaches the error kind label of `err`.
    #[must_use]
    pub fn caused_by(mut self, err: &DatasetError) -> Self {
        self.error_kind = Some(err.kind().as_str());
        self
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Destination for engine events.
pub trait EngineEventSink: Send + Sync {
    /// Records one event.
    fn record(&self, event: &EngineEvent);
}

/// Sink that writes JSON lines to stderr.
pub struct StderrEventSink;

impl EngineEventSink for StderrEventSink {
    fn record(&self, event: &EngineEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Sink that appends JSON lines to a file.
pub struct FileEventSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileEventSink {
    /// Opens the event log in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EngineEventSink for FileEventSink {
    fn record(&self, event: &EngineEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// Sink that drops every event.
pub struct NoopEventSink;

impl EngineEventSink for NoopEventSink {
    fn record(&self, _event: &EngineEvent) {}
}

/// Sink that buffers events in memory.
#[derive(Default)]
pub struct MemoryEventSink {
    /// Recorded events in emission order.
    events: Mutex<Vec<EngineEvent>>,
}

impl MemoryEventSink {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Returns the names of the recorded events.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|event| event.event).collect()
    }
}

impl EngineEventSink for MemoryEventSink {
    fn record(&self, event: &EngineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::expect_used,
        clippy::unwrap_used,
        reason = "Test assertions use expect/unwrap for clarity."
    )]

    use super::*;

    #[test]
    fn event_serializes_known_ids_only() {
        let event = EngineEvent::warn(LOCK_CONTENDED, "held elsewhere").job(JobId::new(9));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "lock_contended");
        assert_eq!(value["level"], "warn");
        assert_eq!(value["job_id"], 9);
        assert!(value.get("dataset_id").is_none());
    }

    #[test]
    fn file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let sink = FileEventSink::new(&path).unwrap();
        sink.record(&EngineEvent::info(IMPORT_FLUSH, "first"));
        sink.record(&EngineEvent::info(IMPORT_COMPLETED, "second"));
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("import_completed"));
    }

    #[test]
    fn caused_by_records_error_kind() {
        let event = EngineEvent::error(JOB_FAILED, "boom")
            .caused_by(&DatasetError::MalformedFile("bad".to_string()).retryable());
        assert_eq!(event.error_kind, Some("malformed_file"));
    }
}
