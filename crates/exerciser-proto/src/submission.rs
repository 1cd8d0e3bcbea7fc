//! Job templates and the per-resource items they are expanded over.

use crate::note::CorrelationNote;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Names of the per-item variables, in the order a gateway should declare
/// them when expanding a template.
pub const ITEM_VARIABLES: [&str; 4] = ["ResourceName", "resource_dir", "sample_dir", "SampleNumber"];

/// One (test, resource, sample) parameterization of a job template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionItem {
    pub test_name: String,
    pub resource_name: String,
    pub sample: u32,
}

impl SubmissionItem {
    pub fn new(test_name: impl Into<String>, resource_name: impl Into<String>, sample: u32) -> Self {
        Self {
            test_name: test_name.into(),
            resource_name: resource_name.into(),
            sample,
        }
    }

    /// Directory the job's results for this resource land in, relative to the
    /// staged test directory.
    pub fn resource_dir(&self) -> String {
        format!("results/{}", self.resource_name)
    }

    /// Directory for this particular sample.
    pub fn sample_dir(&self) -> String {
        format!("results/{}/sample_{:03}", self.resource_name, self.sample)
    }

    /// Item variable values, aligned with [`ITEM_VARIABLES`].
    pub fn variables(&self) -> [String; 4] {
        [
            self.resource_name.clone(),
            self.resource_dir(),
            self.sample_dir(),
            self.sample.to_string(),
        ]
    }

    /// The note the pool will echo back once this item is queued.
    pub fn note(&self) -> CorrelationNote {
        CorrelationNote::new(&self.test_name, &self.resource_name, self.sample)
    }
}

/// Errors raised while reading a submit description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("line {line}: expected 'key = value', found '{content}'")]
    InvalidLine { line: usize, content: String },

    #[error("line {line}: empty key")]
    EmptyKey { line: usize },
}

/// A submit description: an ordered list of `key = value` commands.
///
/// Keys compare case-insensitively, matching how the scheduler treats them.
/// Queue statements are not part of the template; items are supplied
/// separately at submission time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTemplate {
    entries: Vec<(String, String)>,
}

impl JobTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses submit-description text.
    ///
    /// Blank lines and `#` comments are skipped, a trailing backslash joins a
    /// line with the next one, and `queue` statements are dropped.
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let mut template = Self::new();
        let mut pending = String::new();
        let mut pending_line = 0;

        for (index, raw) in text.lines().enumerate() {
            let line_number = index + 1;
            if pending.is_empty() {
                pending_line = line_number;
            }

            if let Some(continued) = raw.strip_suffix('\\') {
                pending.push_str(continued);
                continue;
            }
            pending.push_str(raw);

            let line = std::mem::take(&mut pending);
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || is_queue_statement(line) {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(TemplateError::InvalidLine {
                    line: pending_line,
                    content: line.to_string(),
                });
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(TemplateError::EmptyKey { line: pending_line });
            }
            template.set(key, value.trim());
        }

        Ok(template)
    }

    /// Returns the value for `key`, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// Sets `key`, replacing an existing value in place or appending.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&key))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for JobTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            writeln!(f, "{key} = {value}")?;
        }
        Ok(())
    }
}

fn is_queue_statement(line: &str) -> bool {
    let mut words = line.split_whitespace();
    words.next().is_some_and(|word| word.eq_ignore_ascii_case("queue"))
        && !words.next().is_some_and(|word| word.starts_with('='))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_directories() {
        let item = SubmissionItem::new("sleep", "UW-Madison", 7);
        assert_eq!(item.resource_dir(), "results/UW-Madison");
        assert_eq!(item.sample_dir(), "results/UW-Madison/sample_007");
        assert_eq!(
            item.variables(),
            [
                "UW-Madison".to_string(),
                "results/UW-Madison".to_string(),
                "results/UW-Madison/sample_007".to_string(),
                "7".to_string(),
            ]
        );
        assert_eq!(item.note().encode(), "exerciser_info:sleep,UW-Madison,7");
    }

    #[test]
    fn test_parse_submit_description() {
        let text = r#"
# sleep test
executable = sleep.sh
arguments  = 30
Requirements = (Memory > 1024)
transfer_input_files = a.txt, \
    b.txt

queue
"#;
        let template = JobTemplate::parse(text).unwrap();
        assert_eq!(template.len(), 4);
        assert_eq!(template.get("executable"), Some("sleep.sh"));
        assert_eq!(template.get("requirements"), Some("(Memory > 1024)"));
        assert_eq!(template.get("transfer_input_files"), Some("a.txt,     b.txt"));
    }

    #[test]
    fn test_parse_drops_queue_with_arguments() {
        let template = JobTemplate::parse("executable = x\nqueue 10\nQueue name from list.txt\n").unwrap();
        assert_eq!(template.len(), 1);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = JobTemplate::parse("executable = x\nthis is not a command\n").unwrap_err();
        assert_eq!(
            err,
            TemplateError::InvalidLine {
                line: 2,
                content: "this is not a command".to_string(),
            }
        );
        assert_eq!(
            JobTemplate::parse(" = value").unwrap_err(),
            TemplateError::EmptyKey { line: 1 }
        );
    }

    #[test]
    fn test_set_replaces_case_insensitively() {
        let mut template = JobTemplate::new();
        template.set("Requirements", "a");
        template.set("requirements", "b");
        assert_eq!(template.len(), 1);
        assert_eq!(template.get("REQUIREMENTS"), Some("b"));
        assert_eq!(template.iter().next(), Some(("Requirements", "b")));
    }

    #[test]
    fn test_display_renders_commands() {
        let mut template = JobTemplate::new();
        template.set("executable", "run.sh");
        template.set("My.EXERCISER_Job", "true");
        assert_eq!(template.to_string(), "executable = run.sh\nMy.EXERCISER_Job = true\n");
    }
}
