//! Repository error types

use thiserror::Error;

/// Errors raised by repository sources
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The bulk index was already fetched for this run
    #[error("Repository '{0}' is already initialized; the artifact index is fetched exactly once per run")]
    AlreadyInitialized(String),

    /// A search result record does not describe a usable artifact
    #[error("Invalid artifact record '{path}/{name}': {reason}")]
    InvalidRecord {
        path: String,
        name: String,
        reason: String,
    },

    /// The repository answered the bulk search with an error status
    #[error("Artifact search failed with HTTP {status}: {body}")]
    SearchFailed { status: u16, body: String },
}
