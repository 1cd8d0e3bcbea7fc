//! Expansion of a sampling policy into concrete submission items.

use crate::resources::ResourceSnapshot;
use exerciser_proto::SubmissionItem;
use serde::Serialize;

/// Fraction of a resource's instances that receive a job, in `(0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct SampleFraction(f64);

impl SampleFraction {
    /// Every instance of every resource.
    pub const ALL: Self = Self(1.0);

    /// Returns `None` unless `value` is in `(0.0, 1.0]`.
    pub fn new(value: f64) -> Option<Self> {
        (value > 0.0 && value <= 1.0).then_some(Self(value))
    }

    pub fn get(self) -> f64 {
        self.0
    }

    /// Number of jobs a resource with `instances` instances receives:
    /// `ceil(instances × fraction)`.
    pub fn sample_size(self, instances: u32) -> u32 {
        (f64::from(instances) * self.0).ceil() as u32
    }
}

/// Expands `snapshot` into one item per sampled instance of every resource.
///
/// Items come out grouped by resource in snapshot order, with sample indices
/// running `0..sample_size` for each resource.
pub fn expand_submission_items(
    test_name: &str,
    snapshot: &ResourceSnapshot,
    fraction: SampleFraction,
) -> Vec<SubmissionItem> {
    snapshot
        .iter()
        .flat_map(|(resource, instances)| {
            (0..fraction.sample_size(instances))
                .map(move |sample| SubmissionItem::new(test_name, resource, sample))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn snapshot(entries: &[(&str, u32)]) -> ResourceSnapshot {
        ResourceSnapshot::from_counts(
            entries
                .iter()
                .map(|(name, count)| ((*name).to_string(), *count))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    #[test]
    fn test_fraction_bounds() {
        assert!(SampleFraction::new(0.0).is_none());
        assert!(SampleFraction::new(-1.0).is_none());
        assert!(SampleFraction::new(1.000_001).is_none());
        assert!(SampleFraction::new(f64::NAN).is_none());
        assert_eq!(SampleFraction::new(1.0), Some(SampleFraction::ALL));
        assert!((SampleFraction::new(0.05).unwrap().get() - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sample_size_rounds_up() {
        let fraction = SampleFraction::new(0.05).unwrap();
        assert_eq!(fraction.sample_size(1), 1);
        assert_eq!(fraction.sample_size(20), 1);
        assert_eq!(fraction.sample_size(21), 2);
        assert_eq!(SampleFraction::ALL.sample_size(13), 13);
    }

    #[test]
    fn test_expansion_counts_and_indices() {
        let snapshot = snapshot(&[("alpha", 1), ("beta", 7), ("gamma", 40), ("delta", 999)]);

        for value in [0.01, 0.05, 0.1, 0.25, 1.0 / 3.0, 0.5, 0.99, 1.0] {
            let fraction = SampleFraction::new(value).unwrap();
            let items = expand_submission_items("t", &snapshot, fraction);

            for (resource, instances) in snapshot.iter() {
                let samples: Vec<u32> = items
                    .iter()
                    .filter(|item| item.resource_name == resource)
                    .map(|item| item.sample)
                    .collect();
                let expected = (f64::from(instances) * value).ceil() as u32;
                assert_eq!(
                    samples,
                    (0..expected).collect::<Vec<_>>(),
                    "resource {resource} with fraction {value}"
                );
            }
        }
    }

    #[test]
    fn test_expansion_groups_by_resource() {
        let snapshot = snapshot(&[("b", 2), ("a", 3)]);
        let items = expand_submission_items("sleep", &snapshot, SampleFraction::ALL);

        let order: Vec<(&str, u32)> = items
            .iter()
            .map(|item| (item.resource_name.as_str(), item.sample))
            .collect();
        assert_eq!(order, vec![("a", 0), ("a", 1), ("a", 2), ("b", 0), ("b", 1)]);
        assert!(items.iter().all(|item| item.test_name == "sleep"));
    }

    #[test]
    fn test_empty_snapshot_yields_nothing() {
        let items = expand_submission_items("t", &ResourceSnapshot::default(), SampleFraction::ALL);
        assert!(items.is_empty());
    }
}
