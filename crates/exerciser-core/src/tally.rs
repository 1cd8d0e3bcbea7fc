//! Per-test outcome tallies accumulated while replaying a run's log.

use serde::Serialize;
use std::collections::BTreeMap;

/// One of the five outcome collections kept per test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TallyBucket {
    Submitted,
    Executing,
    Succeeded,
    Failed,
    Aborted,
}

/// Resource names per outcome for one test.
///
/// Each collection is a multiset: a resource appears once per sampled job
/// that reached that outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestTally {
    pub submitted: Vec<String>,
    pub executing: Vec<String>,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub aborted: Vec<String>,
}

impl TestTally {
    pub fn record(&mut self, bucket: TallyBucket, resource: impl Into<String>) {
        self.bucket_mut(bucket).push(resource.into());
    }

    pub fn bucket(&self, bucket: TallyBucket) -> &[String] {
        match bucket {
            TallyBucket::Submitted => &self.submitted,
            TallyBucket::Executing => &self.executing,
            TallyBucket::Succeeded => &self.succeeded,
            TallyBucket::Failed => &self.failed,
            TallyBucket::Aborted => &self.aborted,
        }
    }

    fn bucket_mut(&mut self, bucket: TallyBucket) -> &mut Vec<String> {
        match bucket {
            TallyBucket::Submitted => &mut self.submitted,
            TallyBucket::Executing => &mut self.executing,
            TallyBucket::Succeeded => &mut self.succeeded,
            TallyBucket::Failed => &mut self.failed,
            TallyBucket::Aborted => &mut self.aborted,
        }
    }
}

/// Whether a test belongs to the run being monitored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestGroup {
    /// Staged into the run directory.
    Expected,
    /// Only seen in the log: leftovers from another run or a stray note.
    Unknown,
}

impl TestGroup {
    pub fn label(self) -> &'static str {
        match self {
            TestGroup::Expected => "expected",
            TestGroup::Unknown => "unknown",
        }
    }
}

/// Tallies for every test seen in one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    pub expected: BTreeMap<String, TestTally>,
    pub unknown: BTreeMap<String, TestTally>,
}

impl RunStatus {
    /// Seeds an empty tally for every expected test.
    pub fn with_expected<I, S>(tests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            expected: tests
                .into_iter()
                .map(|name| (name.into(), TestTally::default()))
                .collect(),
            unknown: BTreeMap::new(),
        }
    }

    pub fn is_expected(&self, test_name: &str) -> bool {
        self.expected.contains_key(test_name)
    }

    /// The tally for `test_name` in `group`, created on first use.
    pub fn tally_mut(&mut self, group: TestGroup, test_name: &str) -> &mut TestTally {
        let tallies = match group {
            TestGroup::Expected => &mut self.expected,
            TestGroup::Unknown => &mut self.unknown,
        };
        tallies.entry(test_name.to_string()).or_default()
    }

    pub fn group(&self, group: TestGroup) -> &BTreeMap<String, TestTally> {
        match group {
            TestGroup::Expected => &self.expected,
            TestGroup::Unknown => &self.unknown,
        }
    }
}
