//! Seams to the external pool: where resources come from and where jobs go.

use crate::{GatewayError, JobTemplate, SubmissionItem};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// What the gateway hands back after queueing one template's items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchHandle {
    /// Cluster id assigned to the batch; items get process ids `0..jobs`.
    pub cluster: u64,
    /// Number of jobs queued.
    pub jobs: usize,
}

/// Source of the resources currently visible in the pool.
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    /// Returns resource name → number of instances currently advertised.
    ///
    /// Only entries that define the resource-identity attribute are counted.
    async fn query(&self) -> Result<BTreeMap<String, u32>, GatewayError>;
}

/// The external job-queueing substrate.
#[async_trait]
pub trait SubmissionGateway: Send + Sync {
    /// Makes sure the credentials the template needs are in place.
    async fn issue_credentials(&self, template: &JobTemplate) -> Result<(), GatewayError>;

    /// Queues `template` once per item. Relative paths in the template
    /// resolve against `submit_dir`.
    async fn submit(
        &self,
        submit_dir: &Path,
        template: &JobTemplate,
        items: &[SubmissionItem],
    ) -> Result<BatchHandle, GatewayError>;
}
