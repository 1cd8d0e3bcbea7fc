//! Correlation notes embedded in submit events.
//!
//! Every exerciser job is submitted with a note that names the test, the
//! targeted resource, and the sample index. The pool echoes the note back in
//! the job's submitted event, which is the only place the log ties a
//! (cluster, process) pair to the exerciser's own identifiers.
//!
//! Grammar:
//!
//! ```text
//! note   := (prefix SEP)? test ',' resource (',' sample)?
//! SEP    := ':'
//! sample := decimal digits
//! ```
//!
//! The prefix is anything up to the first separator and is ignored on
//! decode, so test and resource names may themselves contain `:`.
//! Notes written by older exerciser versions carry no sample field; those
//! decode with `sample: None`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Prefix written in front of every note this exerciser emits.
pub const NOTE_PREFIX: &str = "exerciser_info";

/// Separates the prefix from the note body.
pub const NOTE_SEPARATOR: char = ':';

/// Errors raised when a note cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoteError {
    #[error("correlation note '{note}' is not of the form [prefix:]test,resource[,sample]")]
    Malformed { note: String },

    #[error("correlation note '{note}' has a non-numeric sample number '{sample}'")]
    BadSample { note: String, sample: String },
}

/// The decoded (test, resource, sample) triple of one job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationNote {
    pub test_name: String,
    pub resource_name: String,
    pub sample: Option<u32>,
}

impl CorrelationNote {
    pub fn new(test_name: impl Into<String>, resource_name: impl Into<String>, sample: u32) -> Self {
        Self {
            test_name: test_name.into(),
            resource_name: resource_name.into(),
            sample: Some(sample),
        }
    }

    /// Encodes the note with the exerciser prefix.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Builds the note as a submit-description value, leaving the resource
    /// and sample to the scheduler's per-item macro expansion.
    pub fn template(test_name: &str) -> String {
        format!("{NOTE_PREFIX}{NOTE_SEPARATOR}{test_name},$(ResourceName),$(SampleNumber)")
    }

    /// Decodes a note, ignoring any prefix before the first separator.
    pub fn decode(raw: &str) -> Result<Self, NoteError> {
        let malformed = || NoteError::Malformed {
            note: raw.to_string(),
        };

        let trimmed = raw.trim();
        let body = trimmed
            .split_once(NOTE_SEPARATOR)
            .map_or(trimmed, |(_, body)| body);

        let fields: Vec<&str> = body.split(',').map(str::trim).collect();
        let (test_name, resource_name, sample) = match fields.as_slice() {
            [test, resource] => (*test, *resource, None),
            [test, resource, sample] => (*test, *resource, Some(*sample)),
            _ => return Err(malformed()),
        };

        if test_name.is_empty() || resource_name.is_empty() {
            return Err(malformed());
        }

        let sample = match sample {
            Some(text) => Some(text.parse::<u32>().map_err(|_| NoteError::BadSample {
                note: raw.to_string(),
                sample: text.to_string(),
            })?),
            None => None,
        };

        Ok(Self {
            test_name: test_name.to_string(),
            resource_name: resource_name.to_string(),
            sample,
        })
    }
}

impl fmt::Display for CorrelationNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{NOTE_PREFIX}{NOTE_SEPARATOR}{},{}",
            self.test_name, self.resource_name
        )?;
        if let Some(sample) = self.sample {
            write!(f, ",{sample}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_prefixed_note() {
        let note = CorrelationNote::decode("exerciser_info:sleep,SU-ITS-CE2,3").unwrap();
        assert_eq!(note.test_name, "sleep");
        assert_eq!(note.resource_name, "SU-ITS-CE2");
        assert_eq!(note.sample, Some(3));
    }

    #[test]
    fn test_decode_bare_note() {
        let note = CorrelationNote::decode("t1,r1,0").unwrap();
        assert_eq!(note, CorrelationNote::new("t1", "r1", 0));
    }

    #[test]
    fn test_decode_legacy_note_without_sample() {
        let note = CorrelationNote::decode("exerciser_info:checksum,UCSD").unwrap();
        assert_eq!(note.test_name, "checksum");
        assert_eq!(note.resource_name, "UCSD");
        assert_eq!(note.sample, None);
    }

    #[test]
    fn test_decode_ignores_arbitrary_prefix() {
        let note = CorrelationNote::decode("  some_odd_prefix:t1,r1,12\n").unwrap();
        assert_eq!(note, CorrelationNote::new("t1", "r1", 12));
    }

    #[test]
    fn test_names_containing_separator_survive() {
        let note = CorrelationNote::new("net:ipv6", "CHTC:gpu", 2);
        assert_eq!(note.encode(), "exerciser_info:net:ipv6,CHTC:gpu,2");
        assert_eq!(CorrelationNote::decode(&note.encode()).unwrap(), note);
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        for raw in ["", "exerciser_info:", "no separator here", "exerciser_info:t1", "a,b,c,d"] {
            assert!(
                matches!(CorrelationNote::decode(raw), Err(NoteError::Malformed { .. })),
                "expected '{raw}' to be rejected"
            );
        }
    }

    #[test]
    fn test_decode_rejects_empty_names() {
        assert!(CorrelationNote::decode("exerciser_info:,r1,0").is_err());
        assert!(CorrelationNote::decode("exerciser_info:t1, ,0").is_err());
    }

    #[test]
    fn test_decode_rejects_non_numeric_sample() {
        let err = CorrelationNote::decode("exerciser_info:t1,r1,$(SampleNumber)").unwrap_err();
        assert_eq!(
            err,
            NoteError::BadSample {
                note: "exerciser_info:t1,r1,$(SampleNumber)".to_string(),
                sample: "$(SampleNumber)".to_string(),
            }
        );
    }

    #[test]
    fn test_encode_then_decode() {
        let note = CorrelationNote::new("checksum", "Purdue-Anvil", 41);
        assert_eq!(note.encode(), "exerciser_info:checksum,Purdue-Anvil,41");
        assert_eq!(CorrelationNote::decode(&note.encode()).unwrap(), note);
    }

    #[test]
    fn test_template_expands_to_decodable_note() {
        let template = CorrelationNote::template("sleep");
        assert_eq!(template, "exerciser_info:sleep,$(ResourceName),$(SampleNumber)");

        let expanded = template
            .replace("$(ResourceName)", "UChicago")
            .replace("$(SampleNumber)", "5");
        assert_eq!(
            CorrelationNote::decode(&expanded).unwrap(),
            CorrelationNote::new("sleep", "UChicago", 5)
        );
    }
}
