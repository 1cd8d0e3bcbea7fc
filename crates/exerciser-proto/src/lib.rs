//! # exerciser-proto
//!
//! Shared types, error definitions, and traits for the pool exerciser.
//!
//! This crate provides the foundational abstractions used across the
//! exerciser crates, including:
//! - Job lifecycle events as read back from a run's shared log
//! - The correlation note that ties a scheduler job to a test and resource
//! - Job templates and per-resource submission items
//! - The resource directory and submission gateway seams

mod error;
mod event;
mod gateway;
mod note;
mod submission;

pub use error::GatewayError;
pub use event::{EventKind, JobEvent, JobId, Termination};
pub use gateway::{BatchHandle, ResourceDirectory, SubmissionGateway};
pub use note::{CorrelationNote, NOTE_PREFIX, NOTE_SEPARATOR, NoteError};
pub use submission::{ITEM_VARIABLES, JobTemplate, SubmissionItem, TemplateError};
