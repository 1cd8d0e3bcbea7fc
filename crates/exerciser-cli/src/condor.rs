//! HTCondor implementations of the pool collaborators.
//!
//! Both shell out to the HTCondor command-line tools, which must be on
//! `PATH`: `condor_status` to list resources and `condor_submit` to queue
//! jobs.

use async_trait::async_trait;
use exerciser_proto::{
    BatchHandle, GatewayError, ITEM_VARIABLES, JobTemplate, ResourceDirectory, SubmissionGateway,
    SubmissionItem,
};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::{debug, info};

const CONDOR_STATUS: &str = "condor_status";
const CONDOR_SUBMIT: &str = "condor_submit";

/// Submit description written into the staged test directory.
pub const SUBMIT_FILE: &str = "exerciser_job.sub";

static SUBMITTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) job\(s\) submitted to cluster (\d+)\.").expect("submit output regex is valid")
});

/// Runs `program` to completion and returns its stdout.
async fn run_tool(program: &str, args: &[String], cwd: Option<&Path>) -> Result<String, GatewayError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    debug!(program, args = ?args, cwd = ?cwd, "Running HTCondor tool");
    let output = command.output().await.map_err(|source| GatewayError::Spawn {
        program: program.to_string(),
        source,
    })?;

    if !output.status.success() {
        return Err(GatewayError::CommandFailed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Lists resources by querying the pool's collector for startd ads.
#[derive(Debug, Clone)]
pub struct CondorStatusDirectory {
    central_manager: String,
    attribute: String,
}

impl CondorStatusDirectory {
    pub fn new(central_manager: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            central_manager: central_manager.into(),
            attribute: attribute.into(),
        }
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-pool".to_string(),
            self.central_manager.clone(),
            "-startd".to_string(),
            "-constraint".to_string(),
            format!("!isUndefined({})", self.attribute),
            "-af".to_string(),
            self.attribute.clone(),
        ]
    }
}

/// Counts one instance per output line, keyed by the line.
pub fn count_resources(output: &str) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for name in output.lines().map(str::trim) {
        if name.is_empty() || name == "undefined" {
            continue;
        }
        *counts.entry(name.to_string()).or_insert(0) += 1;
    }
    counts
}

#[async_trait]
impl ResourceDirectory for CondorStatusDirectory {
    async fn query(&self) -> Result<BTreeMap<String, u32>, GatewayError> {
        let output = run_tool(CONDOR_STATUS, &self.args(), None).await?;
        let counts = count_resources(&output);
        debug!(
            central_manager = %self.central_manager,
            attribute = %self.attribute,
            resources = counts.len(),
            "Queried collector"
        );
        Ok(counts)
    }
}

/// Queues jobs with `condor_submit` from the staged test directory.
#[derive(Debug, Clone, Default)]
pub struct CondorSubmitGateway;

impl CondorSubmitGateway {
    pub fn new() -> Self {
        Self
    }
}

/// Renders `template` followed by a queue statement over `items`.
pub fn render_submit_description(template: &JobTemplate, items: &[SubmissionItem]) -> String {
    let mut text = template.to_string();
    text.push_str("\nqueue ");
    text.push_str(&ITEM_VARIABLES.join(","));
    text.push_str(" from (\n");
    for item in items {
        text.push_str(&format!("    {}\n", item.variables().join(",")));
    }
    text.push_str(")\n");
    text
}

/// Extracts the job count and cluster id from `condor_submit` output.
pub fn parse_submit_output(output: &str) -> Option<BatchHandle> {
    let captures = SUBMITTED.captures(output)?;
    Some(BatchHandle {
        jobs: captures[1].parse().ok()?,
        cluster: captures[2].parse().ok()?,
    })
}

#[async_trait]
impl SubmissionGateway for CondorSubmitGateway {
    async fn issue_credentials(&self, template: &JobTemplate) -> Result<(), GatewayError> {
        // condor_submit runs the configured credential producers itself.
        debug!(
            oauth = template.get("use_oauth_services").unwrap_or("none"),
            "Credentials are issued at submit time"
        );
        Ok(())
    }

    async fn submit(
        &self,
        submit_dir: &Path,
        template: &JobTemplate,
        items: &[SubmissionItem],
    ) -> Result<BatchHandle, GatewayError> {
        for item in items {
            tokio::fs::create_dir_all(submit_dir.join(item.sample_dir())).await?;
        }

        let submit_file = submit_dir.join(SUBMIT_FILE);
        tokio::fs::write(&submit_file, render_submit_description(template, items)).await?;

        let output = run_tool(CONDOR_SUBMIT, &[SUBMIT_FILE.to_string()], Some(submit_dir)).await?;
        let batch = parse_submit_output(&output).ok_or_else(|| GatewayError::UnexpectedOutput {
            program: CONDOR_SUBMIT.to_string(),
            output: output.trim().to_string(),
        })?;

        if batch.jobs != items.len() {
            return Err(GatewayError::Rejected(format!(
                "queued {} jobs in cluster {} but {} were requested",
                batch.jobs,
                batch.cluster,
                items.len()
            )));
        }
        info!(cluster = batch.cluster, jobs = batch.jobs, dir = %submit_dir.display(), "condor_submit accepted batch");
        Ok(batch)
    }
}
