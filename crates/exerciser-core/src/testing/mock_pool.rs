//! Mock resource directory and submission gateway.

use super::log_builder::UserLogBuilder;
use crate::job_template::{NOTES_KEY, SHARED_LOG_KEY};
use async_trait::async_trait;
use exerciser_proto::{BatchHandle, GatewayError, JobTemplate, ResourceDirectory, SubmissionGateway, SubmissionItem};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A resource directory that returns a fixed answer.
#[derive(Debug, Default)]
pub struct MockDirectory {
    resources: BTreeMap<String, u32>,
    failure: Option<String>,
    queries: AtomicUsize,
}

impl MockDirectory {
    pub fn new<'a>(resources: impl IntoIterator<Item = (&'a str, u32)>) -> Self {
        Self {
            resources: resources
                .into_iter()
                .map(|(name, count)| (name.to_string(), count))
                .collect(),
            ..Self::default()
        }
    }

    /// A directory whose every query fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceDirectory for MockDirectory {
    async fn query(&self) -> Result<BTreeMap<String, u32>, GatewayError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(GatewayError::UnexpectedOutput {
                program: "mock directory".to_string(),
                output: message.clone(),
            }),
            None => Ok(self.resources.clone()),
        }
    }
}

/// One call to [`MockGateway::submit`].
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    pub submit_dir: PathBuf,
    pub template: JobTemplate,
    pub items: Vec<SubmissionItem>,
    pub cluster: u64,
}

#[derive(Debug, Default)]
struct GatewayState {
    next_cluster: u64,
    submissions: Vec<SubmissionRecord>,
    credential_requests: usize,
}

/// A gateway that records submissions and hands out increasing cluster ids.
///
/// With [`MockGateway::writing_log`] it also appends a submitted event for
/// every item to the template's shared log, as the pool would.
#[derive(Debug, Clone)]
pub struct MockGateway {
    state: Arc<Mutex<GatewayState>>,
    write_log: bool,
    failure: Option<String>,
}

impl MockGateway {
    pub fn new(first_cluster: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(GatewayState {
                next_cluster: first_cluster,
                ..GatewayState::default()
            })),
            write_log: false,
            failure: None,
        }
    }

    pub fn writing_log(mut self) -> Self {
        self.write_log = true;
        self
    }

    /// Rejects every submission with `message`.
    pub fn rejecting(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .submissions
            .clone()
    }

    pub fn credential_requests(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .credential_requests
    }

    fn append_submit_events(template: &JobTemplate, cluster: u64, items: &[SubmissionItem]) -> Result<(), GatewayError> {
        let Some(log_path) = template.get(SHARED_LOG_KEY) else {
            return Err(GatewayError::Rejected(format!("template has no {SHARED_LOG_KEY}")));
        };
        let notes = template.get(NOTES_KEY).unwrap_or_default();

        let mut builder = UserLogBuilder::new();
        for (proc, item) in (0u64..).zip(items) {
            let expanded = notes
                .replace("$(ResourceName)", &item.resource_name)
                .replace("$(SampleNumber)", &item.sample.to_string());
            builder = builder.submitted(cluster, proc, &expanded);
        }

        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(Path::new(log_path))?;
        log.write_all(builder.build().as_bytes())?;
        Ok(())
    }
}

#[async_trait]
impl SubmissionGateway for MockGateway {
    async fn issue_credentials(&self, _template: &JobTemplate) -> Result<(), GatewayError> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .credential_requests += 1;
        Ok(())
    }

    async fn submit(
        &self,
        submit_dir: &Path,
        template: &JobTemplate,
        items: &[SubmissionItem],
    ) -> Result<BatchHandle, GatewayError> {
        if let Some(message) = &self.failure {
            return Err(GatewayError::Rejected(message.clone()));
        }

        let cluster = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let cluster = state.next_cluster;
            state.next_cluster += 1;
            state.submissions.push(SubmissionRecord {
                submit_dir: submit_dir.to_path_buf(),
                template: template.clone(),
                items: items.to_vec(),
                cluster,
            });
            cluster
        };

        if self.write_log {
            Self::append_submit_events(template, cluster, items)?;
        }

        Ok(BatchHandle {
            cluster,
            jobs: items.len(),
        })
    }
}
