//! Creates a run and fans each selected test out over the pool.
//!
//! A run moves from absent to created when its directory and resource
//! snapshot are written, and to populated as each test is staged and
//! submitted. Any error stops the run where it is; a partially populated
//! run is never resumed.

use crate::config::{ConfigError, ExerciserConfig, RemovalPolicy};
use crate::job_template::build_job_template;
use crate::resources::ResourceSnapshot;
use crate::run::{RunError, RunHandle};
use crate::sampling::{SampleFraction, expand_submission_items};
use crate::staging::{StagingError, TestDefinition, stage_test};
use chrono::NaiveDateTime;
use exerciser_proto::{BatchHandle, GatewayError, JobTemplate, ResourceDirectory, SubmissionGateway, SubmissionItem};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Run(#[from] RunError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error("resource directory query failed: {0}")]
    Directory(#[source] GatewayError),

    #[error("submitting test {test} failed: {source}")]
    Submission {
        test: String,
        #[source]
        source: GatewayError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The settings a run is carried out with.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub working_dir: PathBuf,
    pub resource_attribute: String,
    pub fraction: SampleFraction,
    pub removal: RemovalPolicy,
}

impl RunSettings {
    pub fn from_config(config: &ExerciserConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            working_dir: config.working_dir.clone(),
            resource_attribute: config.resource_attribute().to_string(),
            fraction: config.sample_fraction()?,
            removal: config.removal.clone(),
        })
    }
}

/// A run directory together with the resources it was created against.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub run: RunHandle,
    pub snapshot: ResourceSnapshot,
}

/// What was queued for one test.
#[derive(Debug, Clone, Serialize)]
pub struct TestSubmission {
    pub test_name: String,
    pub execution_dir: PathBuf,
    pub jobs: usize,
    /// `None` when there was nothing to submit.
    pub batch: Option<BatchHandle>,
}

/// Drives runs against a resource directory and a submission gateway.
pub struct Orchestrator<D, G> {
    directory: D,
    gateway: G,
    settings: RunSettings,
}

impl<D, G> Orchestrator<D, G>
where
    D: ResourceDirectory,
    G: SubmissionGateway,
{
    pub fn new(directory: D, gateway: G, settings: RunSettings) -> Self {
        Self {
            directory,
            gateway,
            settings,
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Creates the run directory for `now` and records the pool's resources
    /// in it.
    ///
    /// The directory is claimed before the pool is queried so that a
    /// collision fails without touching the pool. If the query fails, the
    /// still-empty directory is removed again.
    pub async fn create_run(&self, now: NaiveDateTime) -> Result<PreparedRun, OrchestratorError> {
        let run = RunHandle::create(&self.settings.working_dir, now)?;

        let snapshot = match ResourceSnapshot::capture(&self.directory).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir(run.dir()) {
                    warn!(dir = %run.dir().display(), error = %cleanup, "Could not remove run directory");
                }
                return Err(OrchestratorError::Directory(e));
            }
        };
        if snapshot.is_empty() {
            warn!(attribute = %self.settings.resource_attribute, "No resources found in the pool");
        }

        snapshot.write_list(&run.resource_list_path())?;
        fs::File::create(run.shared_log_path())?;
        Ok(PreparedRun { run, snapshot })
    }

    /// Stages `test` into the run and submits one job per sampled resource
    /// instance.
    pub async fn submit_test(
        &self,
        prepared: &PreparedRun,
        test: &TestDefinition,
    ) -> Result<TestSubmission, OrchestratorError> {
        let staged = stage_test(&prepared.run, test)?;
        let template = staged.load_template()?;
        let job = build_job_template(
            &template,
            &test.name,
            &prepared.run,
            &self.settings.resource_attribute,
            &self.settings.removal,
        )?;

        let items = expand_submission_items(&test.name, &prepared.snapshot, self.settings.fraction);
        if items.is_empty() {
            warn!(test = %test.name, "No resources sampled, nothing to submit");
            return Ok(TestSubmission {
                test_name: test.name.clone(),
                execution_dir: staged.execution_dir,
                jobs: 0,
                batch: None,
            });
        }

        let batch = self
            .submit_job(&staged.execution_dir, &job, &items)
            .await
            .map_err(|source| OrchestratorError::Submission {
                test: test.name.clone(),
                source,
            })?;
        info!(test = %test.name, cluster = batch.cluster, jobs = batch.jobs, "Submitted test");

        Ok(TestSubmission {
            test_name: test.name.clone(),
            execution_dir: staged.execution_dir,
            jobs: items.len(),
            batch: Some(batch),
        })
    }

    /// Issues credentials for `job`, then queues it once per item.
    pub async fn submit_job(
        &self,
        submit_dir: &Path,
        job: &JobTemplate,
        items: &[SubmissionItem],
    ) -> Result<BatchHandle, GatewayError> {
        self.gateway.issue_credentials(job).await?;
        self.gateway.submit(submit_dir, job, items).await
    }

    /// Creates a run and submits every test in order.
    pub async fn execute(
        &self,
        tests: &[TestDefinition],
        now: NaiveDateTime,
    ) -> Result<(PreparedRun, Vec<TestSubmission>), OrchestratorError> {
        let prepared = self.create_run(now).await?;
        info!(
            run = %prepared.run.key(),
            tests = tests.len(),
            resources = prepared.snapshot.len(),
            "Starting run"
        );

        let mut submissions = Vec::with_capacity(tests.len());
        for test in tests {
            submissions.push(self.submit_test(&prepared, test).await?);
        }
        Ok((prepared, submissions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_template::{NOTES_KEY, REQUIREMENTS_KEY, SHARED_LOG_KEY};
    use crate::testing::{MockDirectory, MockGateway};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(13, 5, 9)
            .unwrap()
    }

    fn settings(working: &Path, fraction: f64) -> RunSettings {
        RunSettings {
            working_dir: working.to_path_buf(),
            resource_attribute: "GLIDEIN_ResourceName".to_string(),
            fraction: SampleFraction::new(fraction).unwrap(),
            removal: RemovalPolicy::default(),
        }
    }

    fn write_test(root: &Path, name: &str) -> TestDefinition {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{name}.sub")), "executable = run.sh\nqueue\n").unwrap();
        fs::write(dir.join("run.sh"), "#!/bin/sh\nexit 0\n").unwrap();
        TestDefinition::new(name, dir)
    }

    #[tokio::test]
    async fn test_create_run_writes_snapshot() {
        let working = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(
            MockDirectory::new([("UCSD", 3), ("UNL", 1)]),
            MockGateway::new(100),
            settings(working.path(), 0.5),
        );

        let prepared = orchestrator.create_run(now()).await.unwrap();
        assert_eq!(prepared.run.key(), "2024-06-01_13-05");
        assert_eq!(
            fs::read_to_string(prepared.run.resource_list_path()).unwrap(),
            "UCSD\nUNL\n"
        );
        assert!(prepared.run.shared_log_path().is_file());
    }

    #[tokio::test]
    async fn test_second_run_in_same_minute_collides() {
        let working = TempDir::new().unwrap();
        let directory = MockDirectory::new([("UCSD", 1)]);
        let orchestrator = Orchestrator::new(directory, MockGateway::new(1), settings(working.path(), 1.0));

        let first = orchestrator.create_run(now()).await.unwrap();
        let err = orchestrator.create_run(now()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Run(RunError::Collision { .. })));
        assert_eq!(
            fs::read_to_string(first.run.resource_list_path()).unwrap(),
            "UCSD\n"
        );
    }

    #[tokio::test]
    async fn test_failed_query_leaves_no_run() {
        let working = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(
            MockDirectory::failing("collector down"),
            MockGateway::new(1),
            settings(working.path(), 1.0),
        );

        let err = orchestrator.create_run(now()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Directory(_)));
        assert_eq!(fs::read_dir(working.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_execute_submits_sampled_items() {
        let working = TempDir::new().unwrap();
        let tests_root = TempDir::new().unwrap();
        let tests = vec![write_test(tests_root.path(), "checksum"), write_test(tests_root.path(), "sleep")];
        let gateway = MockGateway::new(40);
        let orchestrator = Orchestrator::new(
            MockDirectory::new([("UCSD", 10), ("UNL", 1)]),
            gateway.clone(),
            settings(working.path(), 0.25),
        );

        let (prepared, submissions) = orchestrator.execute(&tests, now()).await.unwrap();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0].batch, Some(BatchHandle { cluster: 40, jobs: 4 }));
        assert_eq!(submissions[1].batch.map(|b| b.cluster), Some(41));
        assert_eq!(gateway.credential_requests(), 2);

        let records = gateway.submissions();
        assert_eq!(records[0].submit_dir, prepared.run.test_dir("checksum"));
        let items: Vec<(&str, u32)> = records[0]
            .items
            .iter()
            .map(|item| (item.resource_name.as_str(), item.sample))
            .collect();
        assert_eq!(items, vec![("UCSD", 0), ("UCSD", 1), ("UCSD", 2), ("UNL", 0)]);

        let job = &records[1].template;
        assert_eq!(job.get("executable"), Some("run.sh"));
        assert_eq!(
            job.get(REQUIREMENTS_KEY),
            Some("TARGET.GLIDEIN_ResourceName == \"$(ResourceName)\"")
        );
        assert_eq!(
            job.get(NOTES_KEY),
            Some("exerciser_info:sleep,$(ResourceName),$(SampleNumber)")
        );
        assert!(job.get(SHARED_LOG_KEY).unwrap().ends_with("shared_exerciser.log"));
        assert!(prepared.run.test_dir("sleep").join("run.sh").is_file());
    }

    #[tokio::test]
    async fn test_staging_error_stops_run() {
        let working = TempDir::new().unwrap();
        let tests_root = TempDir::new().unwrap();
        let broken = tests_root.path().join("broken");
        fs::create_dir(&broken).unwrap();
        fs::write(broken.join("a.sub"), "executable = a\n").unwrap();
        fs::write(broken.join("b.sub"), "executable = b\n").unwrap();
        let tests = vec![
            TestDefinition::new("broken", broken),
            write_test(tests_root.path(), "sleep"),
        ];
        let gateway = MockGateway::new(1);
        let orchestrator = Orchestrator::new(
            MockDirectory::new([("UCSD", 1)]),
            gateway.clone(),
            settings(working.path(), 1.0),
        );

        let err = orchestrator.execute(&tests, now()).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Staging(StagingError::DuplicateTemplate { .. })
        ));
        assert!(gateway.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_submission_is_reported() {
        let working = TempDir::new().unwrap();
        let tests_root = TempDir::new().unwrap();
        let tests = vec![write_test(tests_root.path(), "sleep")];
        let orchestrator = Orchestrator::new(
            MockDirectory::new([("UCSD", 1)]),
            MockGateway::new(1).rejecting("schedd unavailable"),
            settings(working.path(), 1.0),
        );

        let err = orchestrator.execute(&tests, now()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Submission { ref test, .. } if test == "sleep"));
        assert!(err.to_string().contains("schedd unavailable"));
    }

    #[tokio::test]
    async fn test_empty_pool_submits_nothing() {
        let working = TempDir::new().unwrap();
        let tests_root = TempDir::new().unwrap();
        let tests = vec![write_test(tests_root.path(), "sleep")];
        let gateway = MockGateway::new(1);
        let orchestrator = Orchestrator::new(MockDirectory::new(Vec::<(&str, u32)>::new()), gateway.clone(), settings(working.path(), 1.0));

        let (_, submissions) = orchestrator.execute(&tests, now()).await.unwrap();
        assert_eq!(submissions[0].jobs, 0);
        assert!(submissions[0].batch.is_none());
        assert!(gateway.submissions().is_empty());
    }
}
