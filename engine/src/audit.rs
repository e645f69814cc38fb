//! Audit trail for resolved sessions.
//!
//! Every terminal outcome produces exactly one [`AuditRecord`]. Unlike the
//! host-facing exit status, the audit trail always distinguishes DENY from
//! IGNORE.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use hellou_types::{Identity, Outcome};

use crate::session::SessionReport;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub identity: Identity,
    pub outcome: Outcome,
    pub reason: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub attempts: u32,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_distance: Option<f64>,
}

impl AuditRecord {
    #[must_use]
    pub fn from_report(report: &SessionReport) -> Self {
        Self {
            timestamp: Utc::now(),
            identity: report.identity.clone(),
            outcome: report.outcome,
            reason: report.reason.as_str(),
            detail: report.reason.detail().map(str::to_owned),
            attempts: report.attempts,
            elapsed_ms: u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            best_distance: report.best_distance,
        }
    }
}

/// Destination for audit records. Recording must not fail the session.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

/// Emits records as structured events under the `hellou::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        tracing::info!(
            target: "hellou::audit",
            identity = %record.identity,
            outcome = %record.outcome,
            reason = record.reason,
            detail = record.detail.as_deref().unwrap_or(""),
            attempts = record.attempts,
            elapsed_ms = record.elapsed_ms,
            best_distance = record.best_distance,
            "Authentication resolved"
        );
    }
}

/// Append-only JSON lines file (0600).
///
/// Each record is a single `write_all` on an `O_APPEND` descriptor, so
/// concurrent writers never interleave within a line.
#[derive(Debug, Clone)]
pub struct FileAuditSink {
    path: PathBuf,
}

impl FileAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &AuditRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(record).map_err(std::io::Error::other)?;
        line.push(b'\n');

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        file.write_all(&line)
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, record: &AuditRecord) {
        if let Err(e) = self.append(record) {
            tracing::warn!(path = %self.path.display(), "Failed to write audit record: {e}");
        }
    }
}

impl<A: AuditSink, B: AuditSink> AuditSink for (A, B) {
    fn record(&self, record: &AuditRecord) {
        self.0.record(record);
        self.1.record(record);
    }
}

impl<S: AuditSink + ?Sized> AuditSink for std::sync::Arc<S> {
    fn record(&self, record: &AuditRecord) {
        (**self).record(record);
    }
}
