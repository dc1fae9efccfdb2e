use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Typed outcome of a failed registry call.
///
/// None of these abort an aggregation run on their own; callers decide how
/// each one is counted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("not found upstream: {0}")]
    NotFound(String),

    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("malformed registry payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Error, Diagnostic)]
pub enum PulseError {
    #[error("invalid subject id: {0}")]
    InvalidSubjectId(String),

    #[error("invalid DOI: {0}")]
    InvalidDoi(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("ORCID client setup failed: {0}")]
    OrcidHttp(String),

    #[error("Crossref client setup failed: {0}")]
    CrossrefHttp(String),

    #[error(transparent)]
    Fetch(#[from] FetchFailure),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("no stored series for {0}")]
    SeriesNotFound(String),

    #[error("unknown refresh job: {0}")]
    JobNotFound(u64),

    #[error("refresh queue is shut down")]
    QueueClosed,
}
