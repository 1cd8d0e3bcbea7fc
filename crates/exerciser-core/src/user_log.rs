//! Reader for the shared job event log.
//!
//! The pool writes the log in the classic user-log text format. Each record
//! is a header line, zero or more body lines, and a `...` terminator:
//!
//! ```text
//! 000 (1234.000.000) 2024-06-01 13:05:42 Job submitted from host: <10.0.0.1:9618>
//!     exerciser_info:sleep,UCSD,0
//! ...
//! 005 (1234.000.000) 2024-06-01 13:09:10 Job terminated.
//!     (1) Normal termination (return value 0)
//! ...
//! ```
//!
//! The log may still be growing while it is read. Only complete records are
//! returned; a trailing record without its terminator is left for the next
//! read.

use exerciser_proto::{EventKind, JobEvent, JobId, Termination};
use regex::Regex;
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Line that closes every record.
pub const RECORD_TERMINATOR: &str = "...";

pub const SUBMIT_CODE: u16 = 0;
pub const EXECUTE_CODE: u16 = 1;
pub const TERMINATED_CODE: u16 = 5;
pub const ABORTED_CODE: u16 = 9;

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{3}) \((\d+)\.(\d+)\.\d+\) (\S+ \S+)(?: |$)")
        .expect("record header regex is valid")
});

static NORMAL_TERMINATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Normal termination \(return value (-?\d+)\)")
        .expect("normal termination regex is valid")
});

static ABNORMAL_TERMINATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Abnormal termination \(signal (\d+)\)").expect("abnormal termination regex is valid")
});

/// Events read from the log, plus any records that could not be parsed.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub events: Vec<JobEvent>,
    pub malformed: Vec<MalformedRecord>,
}

/// A record that does not follow the user-log format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedRecord {
    /// Line number of the record's first line (1-indexed).
    pub line_number: u64,
    /// The offending line, truncated if very long.
    pub content: String,
    pub error: String,
}

impl MalformedRecord {
    const MAX_CONTENT_LEN: usize = 100;

    pub fn new(line_number: u64, content: &str, error: impl Into<String>) -> Self {
        let content = match content.char_indices().nth(Self::MAX_CONTENT_LEN) {
            Some((cut, _)) => format!("{}...", &content[..cut]),
            None => content.to_string(),
        };
        Self {
            line_number,
            content,
            error: error.into(),
        }
    }
}

/// Reads complete records from a user log, remembering where it stopped.
pub struct UserLogReader {
    path: PathBuf,
    position: u64,
    lines_read: u64,
}

impl UserLogReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            position: 0,
            lines_read: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the records appended since the last read.
    ///
    /// A missing log yields nothing. The position only advances past
    /// complete records.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub fn read_events(&mut self) -> std::io::Result<ParseResult> {
        if !self.path.exists() {
            return Ok(ParseResult::default());
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.position))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let mut result = ParseResult::default();
        let mut record: Vec<String> = Vec::new();
        let mut record_start_line = 0;
        let mut consumed = 0usize;
        let mut consumed_lines = self.lines_read;
        let mut offset = 0usize;
        let mut line_number = self.lines_read;

        // Lines without a trailing newline are still being written.
        while let Some(newline) = bytes[offset..].iter().position(|b| *b == b'\n') {
            let raw = &bytes[offset..offset + newline];
            offset += newline + 1;
            line_number += 1;

            let line = String::from_utf8_lossy(raw);
            let line = line.trim_end_matches('\r');

            if line.trim() == RECORD_TERMINATOR {
                if record.is_empty() {
                    result.malformed.push(MalformedRecord::new(
                        line_number,
                        line,
                        "record terminator without a record",
                    ));
                } else {
                    match parse_record(&record) {
                        Ok(event) => result.events.push(event),
                        Err(error) => {
                            warn!(error = %error, line_number = record_start_line, "Malformed user log record");
                            result
                                .malformed
                                .push(MalformedRecord::new(record_start_line, &record[0], error));
                        }
                    }
                    record.clear();
                }
                consumed = offset;
                consumed_lines = line_number;
                continue;
            }

            if record.is_empty() {
                if line.trim().is_empty() {
                    consumed = offset;
                    consumed_lines = line_number;
                    continue;
                }
                record_start_line = line_number;
            }
            record.push(line.to_string());
        }

        if !record.is_empty() {
            debug!(
                line_number = record_start_line,
                "Trailing record is incomplete, leaving it for the next read"
            );
        }

        self.position += consumed as u64;
        self.lines_read = consumed_lines;
        Ok(result)
    }

    /// Current byte offset into the log.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Starts the next read from the beginning of the log.
    pub fn reset(&mut self) {
        self.position = 0;
        self.lines_read = 0;
    }
}

/// Parses one record's lines (header first, terminator excluded).
fn parse_record(lines: &[String]) -> Result<JobEvent, String> {
    let header = &lines[0];
    let captures = HEADER
        .captures(header)
        .ok_or_else(|| "expected 'NNN (cluster.proc.subproc) date time ...'".to_string())?;

    let code: u16 = captures[1].parse().map_err(|e| format!("bad event code: {e}"))?;
    let cluster: u64 = captures[2].parse().map_err(|e| format!("bad cluster id: {e}"))?;
    let proc: u64 = captures[3].parse().map_err(|e| format!("bad process id: {e}"))?;
    let timestamp = captures[4].to_string();
    let body = &lines[1..];

    let kind = match code {
        SUBMIT_CODE => EventKind::Submitted {
            notes: body
                .first()
                .map(|line| line.trim().to_string())
                .filter(|notes| !notes.is_empty()),
        },
        EXECUTE_CODE => EventKind::Executing,
        TERMINATED_CODE => EventKind::Terminated {
            termination: parse_termination(body)?,
        },
        ABORTED_CODE => EventKind::Aborted,
        other => EventKind::Other { code: other },
    };

    Ok(JobEvent {
        id: JobId::new(cluster, proc),
        kind,
        timestamp,
    })
}

fn parse_termination(body: &[String]) -> Result<Termination, String> {
    for line in body {
        if let Some(captures) = NORMAL_TERMINATION.captures(line) {
            let code = captures[1]
                .parse()
                .map_err(|e| format!("bad return value: {e}"))?;
            return Ok(Termination::Exited(code));
        }
        if let Some(captures) = ABNORMAL_TERMINATION.captures(line) {
            let signal = captures[1].parse().map_err(|e| format!("bad signal: {e}"))?;
            return Ok(Termination::Signaled(signal));
        }
    }
    Err("terminated record has no termination status".to_string())
}
