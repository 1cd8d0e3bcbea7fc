//! Point-in-time snapshot of the resources visible in the pool.

use exerciser_proto::{GatewayError, ResourceDirectory};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Resource name → observed instance count (always at least one).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceSnapshot {
    resources: BTreeMap<String, u32>,
}

impl ResourceSnapshot {
    /// Builds a snapshot, dropping entries with no instances.
    pub fn from_counts(counts: BTreeMap<String, u32>) -> Self {
        let resources = counts
            .into_iter()
            .filter(|(name, count)| {
                if *count == 0 {
                    debug!(resource = %name, "Dropping resource with no instances");
                }
                *count > 0 && !name.is_empty()
            })
            .collect();
        Self { resources }
    }

    /// Queries `directory` for the resources currently in the pool.
    pub async fn capture(directory: &dyn ResourceDirectory) -> Result<Self, GatewayError> {
        let snapshot = Self::from_counts(directory.query().await?);
        info!(
            resources = snapshot.len(),
            instances = snapshot.total_instances(),
            "Captured resource snapshot"
        );
        Ok(snapshot)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.resources
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn instances(&self, name: &str) -> Option<u32> {
        self.resources.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn total_instances(&self) -> u64 {
        self.resources.values().map(|count| u64::from(*count)).sum()
    }

    /// Writes the resource names, one per line.
    pub fn write_list(&self, path: &Path) -> std::io::Result<()> {
        let mut file = fs::File::create(path)?;
        for name in self.names() {
            writeln!(file, "{name}")?;
        }
        file.sync_all()
    }
}
