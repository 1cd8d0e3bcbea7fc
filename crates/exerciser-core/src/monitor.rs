//! Rebuilds per-test outcomes from a run's shared log.
//!
//! Only submitted events carry the correlation note, so the replay keeps a
//! cluster → process → (test, resource) binding built from them and joins
//! every later event through it. The bindings live for one replay only.

use crate::run::{RunError, RunHandle};
use crate::tally::{RunStatus, TallyBucket, TestGroup};
use crate::user_log::UserLogReader;
use exerciser_proto::{CorrelationNote, EventKind, JobEvent, JobId, NoteError};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that make a log unusable. Partial tallies are never returned
/// alongside one of these.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("log references job {id} in a {kind} event before it was submitted; the log is corrupt or truncated")]
    UnknownBinding { id: JobId, kind: &'static str },

    #[error("submitted event for job {0} carries no correlation note; not an exerciser job")]
    MissingNote(JobId),

    #[error("submitted event for job {id}: {source}")]
    MalformedNote {
        id: JobId,
        #[source]
        source: NoteError,
    },

    #[error("malformed log record at line {line_number}: {error}")]
    MalformedRecord { line_number: u64, error: String },

    #[error("shared log does not exist for run {0}")]
    MissingLog(PathBuf),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The test and resource one submitted job was noted with.
#[derive(Debug)]
struct JobBinding {
    test_name: String,
    group: TestGroup,
    resource: String,
}

/// Replays `events` in order against the tests staged in the run.
///
/// Tests seen in the log but not in `expected` land in the unknown group.
pub fn replay<I, S>(expected: I, events: &[JobEvent]) -> Result<RunStatus, MonitorError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut status = RunStatus::with_expected(expected);
    let mut clusters: HashMap<u64, HashMap<u64, JobBinding>> = HashMap::new();

    for event in events {
        let bucket = match &event.kind {
            EventKind::Submitted { notes } => {
                bind_submission(&mut status, &mut clusters, event.id, notes.as_deref())?;
                continue;
            }
            EventKind::Executing => TallyBucket::Executing,
            EventKind::Terminated { termination } if termination.succeeded() => TallyBucket::Succeeded,
            EventKind::Terminated { .. } => TallyBucket::Failed,
            EventKind::Aborted => TallyBucket::Aborted,
            EventKind::Other { code } => {
                debug!(id = %event.id, code, "Ignoring event");
                continue;
            }
        };

        let unknown = || MonitorError::UnknownBinding {
            id: event.id,
            kind: event.label(),
        };
        let binding = clusters
            .get(&event.id.cluster)
            .and_then(|procs| procs.get(&event.id.proc))
            .ok_or_else(unknown)?;
        status
            .tally_mut(binding.group, &binding.test_name)
            .record(bucket, binding.resource.as_str());
    }

    Ok(status)
}

fn bind_submission(
    status: &mut RunStatus,
    clusters: &mut HashMap<u64, HashMap<u64, JobBinding>>,
    id: JobId,
    notes: Option<&str>,
) -> Result<(), MonitorError> {
    let notes = notes.ok_or(MonitorError::MissingNote(id))?;
    let note = CorrelationNote::decode(notes).map_err(|source| MonitorError::MalformedNote { id, source })?;

    let group = if status.is_expected(&note.test_name) {
        TestGroup::Expected
    } else {
        debug!(test = %note.test_name, %id, "Job belongs to a test outside this run");
        TestGroup::Unknown
    };

    let procs = clusters.entry(id.cluster).or_default();
    if let Some(other) = procs.values().find(|bound| bound.test_name != note.test_name) {
        warn!(%id, bound = %other.test_name, noted = %note.test_name, "Cluster carries jobs of more than one test");
    }

    let binding = JobBinding {
        test_name: note.test_name,
        group,
        resource: note.resource_name,
    };
    status
        .tally_mut(binding.group, &binding.test_name)
        .record(TallyBucket::Submitted, binding.resource.as_str());
    if let Some(previous) = procs.insert(id.proc, binding) {
        warn!(%id, previous = %previous.resource, "Job submitted twice");
    }
    Ok(())
}

/// Reads the run's shared log through its current end and replays it.
pub fn monitor_run(run: &RunHandle) -> Result<RunStatus, MonitorError> {
    let log_path = run.shared_log_path();
    if !log_path.is_file() {
        return Err(MonitorError::MissingLog(run.dir().to_path_buf()));
    }

    let parsed = UserLogReader::new(&log_path).read_events()?;
    if let Some(record) = parsed.malformed.into_iter().next() {
        return Err(MonitorError::MalformedRecord {
            line_number: record.line_number,
            error: record.error,
        });
    }

    let expected = run.test_names()?;
    let status = replay(expected, &parsed.events)?;
    info!(
        run = %run.key(),
        events = parsed.events.len(),
        expected = status.expected.len(),
        unknown = status.unknown.len(),
        "Replayed shared log"
    );
    Ok(status)
}
