//! Job lifecycle events read back from a run's shared log.
//!
//! The external pool appends one record per lifecycle transition. Only four
//! kinds matter to the exerciser; everything else is kept as
//! [`EventKind::Other`] so callers can skip it explicitly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The scheduler's compound identifier for one job: the batch (cluster) it
/// was submitted in and its position within that batch (process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId {
    pub cluster: u64,
    pub proc: u64,
}

impl JobId {
    pub fn new(cluster: u64, proc: u64) -> Self {
        Self { cluster, proc }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.cluster, self.proc)
    }
}

/// How a job left the pool after running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The payload exited on its own with this return code.
    Exited(i32),
    /// The payload was killed by this signal.
    Signaled(i32),
}

impl Termination {
    /// Only a zero return code counts as a pass.
    pub fn succeeded(self) -> bool {
        matches!(self, Termination::Exited(0))
    }
}

/// The type-specific part of a lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EventKind {
    /// Job entered the queue. Carries the submit-time log notes, if any.
    Submitted { notes: Option<String> },
    /// Job began executing on a resource.
    Executing,
    /// Job finished running.
    Terminated { termination: Termination },
    /// Job was removed by the system (periodic removal, operator, hold).
    Aborted,
    /// Any other event code; ignored by the monitor.
    Other { code: u16 },
}

/// An immutable record from the shared log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub id: JobId,
    #[serde(flatten)]
    pub kind: EventKind,
    /// Timestamp text exactly as the pool wrote it.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timestamp: String,
}

impl JobEvent {
    pub fn new(id: JobId, kind: EventKind) -> Self {
        Self {
            id,
            kind,
            timestamp: String::new(),
        }
    }

    pub fn submitted(cluster: u64, proc: u64, notes: impl Into<String>) -> Self {
        Self::new(
            JobId::new(cluster, proc),
            EventKind::Submitted {
                notes: Some(notes.into()),
            },
        )
    }

    pub fn executing(cluster: u64, proc: u64) -> Self {
        Self::new(JobId::new(cluster, proc), EventKind::Executing)
    }

    pub fn exited(cluster: u64, proc: u64, return_code: i32) -> Self {
        Self::new(
            JobId::new(cluster, proc),
            EventKind::Terminated {
                termination: Termination::Exited(return_code),
            },
        )
    }

    pub fn aborted(cluster: u64, proc: u64) -> Self {
        Self::new(JobId::new(cluster, proc), EventKind::Aborted)
    }

    /// Short name of the event kind, used in diagnostics.
    pub fn label(&self) -> &'static str {
        match self.kind {
            EventKind::Submitted { .. } => "submitted",
            EventKind::Executing => "executing",
            EventKind::Terminated { .. } => "terminated",
            EventKind::Aborted => "aborted",
            EventKind::Other { .. } => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_zero_exit_succeeds() {
        assert!(Termination::Exited(0).succeeded());
        assert!(!Termination::Exited(1).succeeded());
        assert!(!Termination::Exited(-1).succeeded());
        assert!(!Termination::Signaled(0).succeeded());
        assert!(!Termination::Signaled(9).succeeded());
    }

    #[test]
    fn test_job_id_display() {
        assert_eq!(JobId::new(1234, 7).to_string(), "1234.7");
    }

    #[test]
    fn test_event_serializes_flat() {
        let event = JobEvent::exited(3, 1, 2);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["id"]["cluster"], 3);
        assert_eq!(json["kind"], "terminated");
        assert_eq!(json["termination"]["exited"], 2);
        assert!(json.get("timestamp").is_none());
    }

    #[test]
    fn test_labels() {
        assert_eq!(JobEvent::submitted(1, 0, "x").label(), "submitted");
        assert_eq!(JobEvent::executing(1, 0).label(), "executing");
        assert_eq!(JobEvent::aborted(1, 0).label(), "aborted");
        let other = JobEvent::new(JobId::new(1, 0), EventKind::Other { code: 6 });
        assert_eq!(other.label(), "other");
    }
}
