//! Test definitions and staging them into a run.
//!
//! A test is a directory under the tests root holding input files plus
//! exactly one submit description (a `.sub` file). Staging copies the test
//! into a fresh subdirectory of the run, which is where the job is submitted
//! from and where its results land.

use crate::run::RunHandle;
use exerciser_proto::{JobTemplate, TemplateError};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// File suffix of a test's submit description.
pub const TEMPLATE_SUFFIX: &str = ".sub";

/// Errors raised while selecting or staging tests.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("test directory {test_dir} must contain only files, directories and symlinks; found {entry}")]
    UnsupportedEntry { test_dir: PathBuf, entry: PathBuf },

    #[error("there must be one {TEMPLATE_SUFFIX} file in the test directory {0}")]
    MissingTemplate(PathBuf),

    #[error("there can only be one {TEMPLATE_SUFFIX} file in the test directory {test_dir}; found {first} and {second}")]
    DuplicateTemplate {
        test_dir: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("test {test} is already staged at {dir}")]
    AlreadyStaged { test: String, dir: PathBuf },

    #[error("tests directory {0} does not exist")]
    MissingTestsDir(PathBuf),

    #[error("invalid submit description {path}: {source}")]
    InvalidTemplate {
        path: PathBuf,
        #[source]
        source: TemplateError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A named test bundle under the tests root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestDefinition {
    pub name: String,
    pub path: PathBuf,
}

impl TestDefinition {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// A test copied into a run, ready to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedTest {
    pub name: String,
    /// The per-test subdirectory of the run.
    pub execution_dir: PathBuf,
    /// The copied submit description.
    pub template_path: PathBuf,
}

impl StagedTest {
    /// Reads and parses the staged submit description.
    pub fn load_template(&self) -> Result<JobTemplate, StagingError> {
        let text = fs::read_to_string(&self.template_path)?;
        JobTemplate::parse(&text).map_err(|source| StagingError::InvalidTemplate {
            path: self.template_path.clone(),
            source,
        })
    }
}

/// Names of every entry under the tests root, sorted.
pub fn list_tests(tests_dir: &Path) -> Result<Vec<String>, StagingError> {
    if !tests_dir.is_dir() {
        return Err(StagingError::MissingTestsDir(tests_dir.to_path_buf()));
    }
    let mut names: Vec<String> = fs::read_dir(tests_dir)?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    names.sort();
    Ok(names)
}

/// Splits requested test names on commas, drops empties and duplicates.
pub fn normalize_requested<S: AsRef<str>>(requested: &[S]) -> Vec<String> {
    let unique: BTreeSet<String> = requested
        .iter()
        .flat_map(|item| item.as_ref().split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    unique.into_iter().collect()
}

/// Resolves the tests to run.
///
/// With nothing requested every test under the root is selected. Requested
/// names that do not exist are skipped with a warning.
pub fn select_tests<S: AsRef<str>>(
    tests_dir: &Path,
    requested: &[S],
) -> Result<Vec<TestDefinition>, StagingError> {
    let requested = normalize_requested(requested);
    if requested.is_empty() {
        return Ok(list_tests(tests_dir)?
            .into_iter()
            .map(|name| {
                let path = tests_dir.join(&name);
                TestDefinition::new(name, path)
            })
            .collect());
    }

    if !tests_dir.is_dir() {
        return Err(StagingError::MissingTestsDir(tests_dir.to_path_buf()));
    }

    let mut selected = Vec::new();
    for name in requested {
        let path = tests_dir.join(&name);
        if path.exists() {
            selected.push(TestDefinition::new(name, path));
        } else {
            warn!(test = %name, "Specified test not found, continuing with other tests");
        }
    }
    Ok(selected)
}

/// Copies `test` into a fresh subdirectory of `run`.
///
/// Regular files, directories, and symlinks are copied; anything else fails
/// the staging. Exactly one `.sub` file must sit at the top of the test.
pub fn stage_test(run: &RunHandle, test: &TestDefinition) -> Result<StagedTest, StagingError> {
    let execution_dir = run.test_dir(&test.name);
    if let Err(e) = fs::create_dir(&execution_dir) {
        if e.kind() == std::io::ErrorKind::AlreadyExists {
            return Err(StagingError::AlreadyStaged {
                test: test.name.clone(),
                dir: execution_dir,
            });
        }
        return Err(e.into());
    }

    let mut entries: Vec<PathBuf> = fs::read_dir(&test.path)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    entries.sort();

    let mut template: Option<(PathBuf, PathBuf)> = None;
    for source in entries {
        let Some(file_name) = source.file_name() else {
            continue;
        };
        let target = execution_dir.join(file_name);
        let is_template = source.is_file()
            && file_name.to_string_lossy().ends_with(TEMPLATE_SUFFIX);

        if is_template {
            if let Some((first, _)) = &template {
                return Err(StagingError::DuplicateTemplate {
                    test_dir: test.path.clone(),
                    first: first.clone(),
                    second: source,
                });
            }
            template = Some((source.clone(), target.clone()));
        }

        copy_entry(&test.path, &source, &target)?;
    }

    let Some((_, template_path)) = template else {
        return Err(StagingError::MissingTemplate(test.path.clone()));
    };

    info!(
        test = %test.name,
        dir = %execution_dir.display(),
        template = %template_path.display(),
        "Staged test"
    );
    Ok(StagedTest {
        name: test.name.clone(),
        execution_dir,
        template_path,
    })
}

/// Copies one entry. Symlinks that resolve are copied as what they point to;
/// dangling ones are recreated as links.
fn copy_entry(test_dir: &Path, source: &Path, target: &Path) -> Result<(), StagingError> {
    if source.is_file() {
        fs::copy(source, target)?;
        debug!(from = %source.display(), "Copied file");
        return Ok(());
    }

    if source.is_dir() {
        fs::create_dir(target)?;
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            copy_entry(test_dir, &entry.path(), &target.join(entry.file_name()))?;
        }
        return Ok(());
    }

    let metadata = fs::symlink_metadata(source)?;
    if metadata.file_type().is_symlink() {
        return copy_dangling_link(test_dir, source, target);
    }

    Err(StagingError::UnsupportedEntry {
        test_dir: test_dir.to_path_buf(),
        entry: source.to_path_buf(),
    })
}

#[cfg(unix)]
fn copy_dangling_link(_test_dir: &Path, source: &Path, target: &Path) -> Result<(), StagingError> {
    let destination = fs::read_link(source)?;
    warn!(link = %source.display(), points_to = %destination.display(), "Copying dangling symlink");
    std::os::unix::fs::symlink(destination, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_dangling_link(test_dir: &Path, source: &Path, _target: &Path) -> Result<(), StagingError> {
    Err(StagingError::UnsupportedEntry {
        test_dir: test_dir.to_path_buf(),
        entry: source.to_path_buf(),
    })
}
