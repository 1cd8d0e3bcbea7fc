//! Timestamped run directories under the working root.
//!
//! Layout of one run:
//!
//! ```text
//! <working>/<YYYY-MM-DD_HH-MM>/resource_list.txt
//! <working>/<YYYY-MM-DD_HH-MM>/shared_exerciser.log
//! <working>/<YYYY-MM-DD_HH-MM>/<test>/...
//! ```
//!
//! The directory name is the run's key. Creation never reuses an existing
//! directory, so two runs in the same minute collide instead of merging.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// `chrono` format of a run directory name.
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M";

/// Resource snapshot taken when the run was created.
pub const RESOURCE_LIST_FILE: &str = "resource_list.txt";

/// Log every job of the run appends its lifecycle events to.
pub const SHARED_LOG_FILE: &str = "shared_exerciser.log";

/// Errors raised while creating, locating, or flushing runs.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("run {timestamp} already exists; wait at least one minute between successive runs")]
    Collision { timestamp: String },

    #[error("working directory {0} does not exist")]
    MissingWorkingDir(PathBuf),

    #[error("working directory {0} contains no runs")]
    NoRuns(PathBuf),

    #[error("run {timestamp} not found under {working_dir}")]
    NotFound {
        timestamp: String,
        working_dir: PathBuf,
    },

    #[error("invalid date/time '{0}'; expected a prefix of YYYY-MM-DD_hh-mm")]
    InvalidDate(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A run directory that exists on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    dir: PathBuf,
    timestamp: NaiveDateTime,
}

impl RunHandle {
    /// Creates the run directory for the minute containing `at`.
    ///
    /// Fails with [`RunError::Collision`] if that directory already exists;
    /// the existing directory is left untouched.
    pub fn create(working_dir: &Path, at: NaiveDateTime) -> Result<Self, RunError> {
        let key = at.format(RUN_TIMESTAMP_FORMAT).to_string();
        fs::create_dir_all(working_dir)?;

        let dir = working_dir.join(&key);
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(RunError::Collision { timestamp: key });
            }
            Err(e) => return Err(e.into()),
        }

        let timestamp = parse_run_key(&key).ok_or_else(|| RunError::InvalidDate(key.clone()))?;
        info!(run = %key, dir = %dir.display(), "Created run directory");
        Ok(Self { dir, timestamp })
    }

    /// Opens an existing run by its timestamp key.
    pub fn open(working_dir: &Path, key: &str) -> Result<Self, RunError> {
        let timestamp = parse_run_key(key).ok_or_else(|| RunError::InvalidDate(key.to_string()))?;
        let dir = working_dir.join(key);
        if !dir.is_dir() {
            return Err(RunError::NotFound {
                timestamp: key.to_string(),
                working_dir: working_dir.to_path_buf(),
            });
        }
        Ok(Self { dir, timestamp })
    }

    /// Opens the most recent run under `working_dir`.
    pub fn latest(working_dir: &Path) -> Result<Self, RunError> {
        list_runs(working_dir)?
            .pop()
            .ok_or_else(|| RunError::NoRuns(working_dir.to_path_buf()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// The directory name, e.g. `2024-06-01_13-05`.
    pub fn key(&self) -> String {
        self.timestamp.format(RUN_TIMESTAMP_FORMAT).to_string()
    }

    pub fn shared_log_path(&self) -> PathBuf {
        self.dir.join(SHARED_LOG_FILE)
    }

    pub fn resource_list_path(&self) -> PathBuf {
        self.dir.join(RESOURCE_LIST_FILE)
    }

    pub fn test_dir(&self, test_name: &str) -> PathBuf {
        self.dir.join(test_name)
    }

    /// Names of the tests staged into this run, sorted.
    pub fn test_names(&self) -> Result<Vec<String>, RunError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Parses a run directory name.
pub fn parse_run_key(key: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(key, RUN_TIMESTAMP_FORMAT).ok()
}

/// All runs under `working_dir`, oldest first. Entries whose names are not
/// run timestamps are skipped.
pub fn list_runs(working_dir: &Path) -> Result<Vec<RunHandle>, RunError> {
    if !working_dir.is_dir() {
        return Err(RunError::MissingWorkingDir(working_dir.to_path_buf()));
    }

    let mut runs = Vec::new();
    for entry in fs::read_dir(working_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        match parse_run_key(&name) {
            Some(timestamp) => runs.push(RunHandle {
                dir: entry.path(),
                timestamp,
            }),
            None => debug!(entry = %name, "Skipping non-run entry in working directory"),
        }
    }
    runs.sort_by_key(RunHandle::timestamp);
    Ok(runs)
}

/// Removes every entry of the working directory. Returns the removed names.
pub fn flush_all(working_dir: &Path) -> Result<Vec<String>, RunError> {
    if !working_dir.is_dir() {
        return Err(RunError::MissingWorkingDir(working_dir.to_path_buf()));
    }

    let mut removed = Vec::new();
    for entry in fs::read_dir(working_dir)? {
        let entry = entry?;
        remove_entry(&entry.path())?;
        removed.push(entry.file_name().to_string_lossy().into_owned());
    }
    removed.sort();
    info!(count = removed.len(), "Flushed working directory");
    Ok(removed)
}

/// Removes every run strictly older than `cutoff`. Returns the removed keys.
pub fn flush_before(working_dir: &Path, cutoff: NaiveDateTime) -> Result<Vec<String>, RunError> {
    if !working_dir.is_dir() {
        return Err(RunError::MissingWorkingDir(working_dir.to_path_buf()));
    }

    let mut removed = Vec::new();
    for entry in fs::read_dir(working_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(timestamp) = parse_run_key(&name) else {
            warn!(entry = %name, "Not a run directory, leaving it in place");
            continue;
        };
        if timestamp < cutoff {
            remove_entry(&entry.path())?;
            removed.push(name);
        }
    }
    removed.sort();
    info!(count = removed.len(), cutoff = %cutoff, "Flushed runs by date");
    Ok(removed)
}

fn remove_entry(path: &Path) -> std::io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Parses a flush cutoff given at any precision from `YYYY` to
/// `YYYY-MM-DD_hh-mm`. Omitted components take their smallest value.
pub fn parse_flush_date(text: &str) -> Result<NaiveDateTime, RunError> {
    let invalid = || RunError::InvalidDate(text.to_string());

    let (date_part, time_part) = match text.split_once('_') {
        Some((date, time)) => (date, Some(time)),
        None => (text, None),
    };

    let date_fields: Vec<&str> = date_part.split('-').collect();
    if date_fields.len() > 3 {
        return Err(invalid());
    }
    // A time of day only makes sense against a full date.
    if time_part.is_some() && date_fields.len() != 3 {
        return Err(invalid());
    }

    let year = parse_field(date_fields[0], 4, 4).ok_or_else(invalid)?;
    let month = date_fields
        .get(1)
        .map_or(Some(1), |field| parse_field(field, 1, 2))
        .ok_or_else(invalid)?;
    let day = date_fields
        .get(2)
        .map_or(Some(1), |field| parse_field(field, 1, 2))
        .ok_or_else(invalid)?;
    let date = NaiveDate::from_ymd_opt(year as i32, month, day).ok_or_else(invalid)?;

    let (hour, minute) = match time_part {
        None => (0, 0),
        Some(time) => {
            let time_fields: Vec<&str> = time.split('-').collect();
            if time_fields.len() > 2 {
                return Err(invalid());
            }
            let hour = parse_field(time_fields[0], 1, 2).ok_or_else(invalid)?;
            let minute = time_fields
                .get(1)
                .map_or(Some(0), |field| parse_field(field, 1, 2))
                .ok_or_else(invalid)?;
            (hour, minute)
        }
    };
    let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)?;

    Ok(NaiveDateTime::new(date, time))
}

fn parse_field(field: &str, min_width: usize, max_width: usize) -> Option<u32> {
    if !(min_width..=max_width).contains(&field.len()) || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}
