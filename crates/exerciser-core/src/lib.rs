//! # exerciser-core
//!
//! Run orchestration and shared-log correlation for the pool exerciser.
//!
//! This crate provides:
//! - Configuration loading and validation
//! - Timestamped run directories and working-directory maintenance
//! - Test selection and staging
//! - Resource snapshots and sampling into submission items
//! - Job template augmentation and the run orchestrator
//! - The shared user-log reader, the replay monitor, and status reports

mod config;
mod job_template;
mod monitor;
mod orchestrator;
mod report;
mod resources;
mod run;
mod sampling;
mod staging;
mod tally;
mod user_log;
pub mod testing;

pub use config::{
    ConfigError, DEFAULT_RESOURCE_ATTRIBUTE, ExerciserConfig, OSPOOL_CENTRAL_MANAGER,
    OSPOOL_RESOURCE_ATTRIBUTE, RemovalPolicy,
};
pub use job_template::{
    EXECUTE_ATTRS_KEY, MARKER_JOB_KEY, MARKER_SAMPLE_KEY, MARKER_TEST_KEY, NOTES_KEY,
    PERIODIC_REMOVE_KEY, REQUIREMENTS_KEY, SHARED_LOG_KEY, build_job_template, classad_string,
    periodic_remove, requirements,
};
pub use monitor::{MonitorError, monitor_run, replay};
pub use orchestrator::{Orchestrator, OrchestratorError, PreparedRun, RunSettings, TestSubmission};
pub use report::{write_header, write_status};
pub use resources::ResourceSnapshot;
pub use run::{
    RESOURCE_LIST_FILE, RUN_TIMESTAMP_FORMAT, RunError, RunHandle, SHARED_LOG_FILE, flush_all,
    flush_before, list_runs, parse_flush_date, parse_run_key,
};
pub use sampling::{SampleFraction, expand_submission_items};
pub use staging::{
    StagedTest, StagingError, TEMPLATE_SUFFIX, TestDefinition, list_tests, normalize_requested,
    select_tests, stage_test,
};
pub use tally::{RunStatus, TallyBucket, TestGroup, TestTally};
pub use user_log::{MalformedRecord, ParseResult, UserLogReader};
