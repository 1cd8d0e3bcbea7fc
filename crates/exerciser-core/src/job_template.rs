//! Augments a test's submit description with exerciser metadata.

use crate::config::RemovalPolicy;
use crate::run::RunHandle;
use exerciser_proto::{CorrelationNote, JobTemplate};
use tracing::debug;

pub const REQUIREMENTS_KEY: &str = "Requirements";
pub const PERIODIC_REMOVE_KEY: &str = "periodic_remove";
pub const SHARED_LOG_KEY: &str = "dagman_log";
pub const NOTES_KEY: &str = "submit_event_notes";
pub const EXECUTE_ATTRS_KEY: &str = "ulog_execute_attrs";

pub const MARKER_JOB_KEY: &str = "My.EXERCISER_Job";
pub const MARKER_TEST_KEY: &str = "My.EXERCISER_TestName";
pub const MARKER_SAMPLE_KEY: &str = "My.EXERCISER_SampleNum";

/// Job status codes as they appear in job ads.
const STATUS_IDLE: u8 = 1;
const STATUS_RUNNING: u8 = 2;
const STATUS_HELD: u8 = 5;

/// Targets the per-item resource, conjoined with any existing requirement.
pub fn requirements(resource_attribute: &str, existing: Option<&str>) -> String {
    let targeting = format!("TARGET.{resource_attribute} == \"$(ResourceName)\"");
    match existing.map(str::trim).filter(|e| !e.is_empty()) {
        Some(existing) => format!("{targeting} && ({existing})"),
        None => targeting,
    }
}

/// Removes jobs idle or running too long, ever held, or restarted too often,
/// disjoined with any existing removal expression.
pub fn periodic_remove(policy: &RemovalPolicy, existing: Option<&str>) -> String {
    let seconds = policy.max_status_seconds();
    let removal = format!(
        "(JobStatus == {STATUS_IDLE} && CurrentTime-EnteredCurrentStatus > {seconds}) \
         || (JobStatus == {STATUS_RUNNING} && CurrentTime-EnteredCurrentStatus > {seconds}) \
         || (JobStatus == {STATUS_HELD}) \
         || (NumShadowStarts > {})",
        policy.max_restarts
    );
    match existing.map(str::trim).filter(|e| !e.is_empty()) {
        Some(existing) => format!("{removal} || ({existing})"),
        None => removal,
    }
}

/// Quotes `value` as a ClassAd string literal.
pub fn classad_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Builds the job template submitted for `test_name` in `run`.
///
/// The shared log path is made absolute so that jobs submitted from the
/// staged test directory all append to the same file.
pub fn build_job_template(
    template: &JobTemplate,
    test_name: &str,
    run: &RunHandle,
    resource_attribute: &str,
    removal: &RemovalPolicy,
) -> std::io::Result<JobTemplate> {
    let mut job = template.clone();

    let requirements = requirements(resource_attribute, template.get(REQUIREMENTS_KEY));
    job.set(REQUIREMENTS_KEY, requirements);

    let removal = periodic_remove(removal, template.get(PERIODIC_REMOVE_KEY));
    job.set(PERIODIC_REMOVE_KEY, removal);

    let shared_log = std::path::absolute(run.shared_log_path())?;
    job.set(SHARED_LOG_KEY, shared_log.display().to_string());
    job.set(NOTES_KEY, CorrelationNote::template(test_name));
    job.set(EXECUTE_ATTRS_KEY, resource_attribute);

    job.set(MARKER_JOB_KEY, "true");
    job.set(MARKER_TEST_KEY, classad_string(test_name));
    job.set(MARKER_SAMPLE_KEY, "$(SampleNumber)");

    debug!(test = %test_name, commands = job.len(), "Built job template");
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::Path;
    use tempfile::TempDir;

    fn run_in(working: &Path) -> RunHandle {
        let at = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        RunHandle::create(working, at).unwrap()
    }

    #[test]
    fn test_requirements_without_existing() {
        assert_eq!(
            requirements("GLIDEIN_ResourceName", None),
            "TARGET.GLIDEIN_ResourceName == \"$(ResourceName)\""
        );
        assert_eq!(
            requirements("Machine", Some("   ")),
            "TARGET.Machine == \"$(ResourceName)\""
        );
    }

    #[test]
    fn test_requirements_conjoins_existing() {
        assert_eq!(
            requirements("Machine", Some("Memory > 1024 || HasDocker")),
            "TARGET.Machine == \"$(ResourceName)\" && (Memory > 1024 || HasDocker)"
        );
    }

    #[test]
    fn test_periodic_remove_defaults() {
        assert_eq!(
            periodic_remove(&RemovalPolicy::default(), None),
            "(JobStatus == 1 && CurrentTime-EnteredCurrentStatus > 14400) \
             || (JobStatus == 2 && CurrentTime-EnteredCurrentStatus > 14400) \
             || (JobStatus == 5) || (NumShadowStarts > 10)"
        );
    }

    #[test]
    fn test_periodic_remove_disjoins_existing() {
        let policy = RemovalPolicy {
            max_status_hours: 1,
            max_restarts: 3,
        };
        let removal = periodic_remove(&policy, Some("NumJobStarts > 2"));
        assert!(removal.starts_with("(JobStatus == 1 && CurrentTime-EnteredCurrentStatus > 3600)"));
        assert!(removal.contains("(NumShadowStarts > 3)"));
        assert!(removal.ends_with(" || (NumJobStarts > 2)"));
    }

    #[test]
    fn test_classad_string_escapes_quotes_and_backslashes() {
        assert_eq!(classad_string("sleep"), "\"sleep\"");
        assert_eq!(classad_string(r#"say "hi"\now"#), r#""say \"hi\"\\now""#);
    }

    #[test]
    fn test_marker_test_name_is_escaped() {
        let working = TempDir::new().unwrap();
        let run = run_in(working.path());
        let template = JobTemplate::parse("executable = run.sh\n").unwrap();

        let job = build_job_template(&template, r#"odd"name"#, &run, "Machine", &RemovalPolicy::default())
            .unwrap();
        assert_eq!(job.get(MARKER_TEST_KEY), Some(r#""odd\"name""#));
    }

    #[test]
    fn test_build_sets_exerciser_commands() {
        let working = TempDir::new().unwrap();
        let run = run_in(working.path());
        let template = JobTemplate::parse(
            "executable = sleep.sh\nrequirements = (OpSys == \"LINUX\")\nperiodic_remove = false\n",
        )
        .unwrap();

        let job = build_job_template(&template, "sleep", &run, "GLIDEIN_ResourceName", &RemovalPolicy::default())
            .unwrap();

        assert_eq!(job.get("executable"), Some("sleep.sh"));
        assert_eq!(
            job.get("requirements"),
            Some("TARGET.GLIDEIN_ResourceName == \"$(ResourceName)\" && ((OpSys == \"LINUX\"))")
        );
        assert!(job.get("periodic_remove").unwrap().ends_with(" || (false)"));
        assert_eq!(
            job.get(NOTES_KEY),
            Some("exerciser_info:sleep,$(ResourceName),$(SampleNumber)")
        );
        assert_eq!(job.get(EXECUTE_ATTRS_KEY), Some("GLIDEIN_ResourceName"));
        assert_eq!(job.get(MARKER_JOB_KEY), Some("true"));
        assert_eq!(job.get(MARKER_TEST_KEY), Some("\"sleep\""));
        assert_eq!(job.get(MARKER_SAMPLE_KEY), Some("$(SampleNumber)"));

        let log = Path::new(job.get(SHARED_LOG_KEY).unwrap());
        assert!(log.is_absolute());
        assert!(log.ends_with("2024-06-01_08-30/shared_exerciser.log"));

        // The input template is untouched.
        assert_eq!(template.len(), 3);
    }
}
