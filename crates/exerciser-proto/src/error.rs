//! Errors surfaced by external collaborators.

use thiserror::Error;

/// A resource directory or submission gateway call failed.
///
/// Collaborator failures are never retried; they propagate to the caller.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected output from {program}: {output}")]
    UnexpectedOutput { program: String, output: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("submission rejected: {0}")]
    Rejected(String),
}
