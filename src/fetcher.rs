use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::Serialize;

use crate::crossref::MetadataRegistryClient;
use crate::domain::{Doi, SubjectId};
use crate::error::{FetchFailure, PulseError};
use crate::orcid::{EmploymentsRecord, IdentityRegistryClient, ProfileRecord, WorksRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Profile,
    Works,
    Employments,
    CitationCount,
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKind::Profile => write!(f, "profile"),
            EndpointKind::Works => write!(f, "works"),
            EndpointKind::Employments => write!(f, "employments"),
            EndpointKind::CitationCount => write!(f, "citations"),
        }
    }
}

impl FromStr for EndpointKind {
    type Err = PulseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "profile" | "person" => Ok(EndpointKind::Profile),
            "works" => Ok(EndpointKind::Works),
            "employments" => Ok(EndpointKind::Employments),
            "citations" | "citation-count" => Ok(EndpointKind::CitationCount),
            other => Err(PulseError::InvalidParameter(format!(
                "unknown record kind: {other}"
            ))),
        }
    }
}

/// A raw registry record, untouched by normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum Record {
    Profile(ProfileRecord),
    Works(WorksRecord),
    Employments(EmploymentsRecord),
    CitationCount(Option<u64>),
}

/// Single entry point to the external registries.
///
/// Each call is one outbound request. The per-call timeout lives in the HTTP
/// clients; retry decisions belong to callers.
pub struct RecordFetcher<I, M> {
    identity: I,
    metadata: M,
}

impl<I: IdentityRegistryClient, M: MetadataRegistryClient> RecordFetcher<I, M> {
    pub fn new(identity: I, metadata: M) -> Self {
        Self { identity, metadata }
    }

    /// Dispatches on `kind`. `id` is a subject id for the ORCID kinds and a
    /// DOI for [`EndpointKind::CitationCount`].
    pub fn fetch(&self, kind: EndpointKind, id: &str) -> Result<Record, PulseError> {
        match kind {
            EndpointKind::CitationCount => {
                let doi: Doi = id.parse()?;
                Ok(Record::CitationCount(self.citation_count(&doi)?))
            }
            EndpointKind::Profile => Ok(Record::Profile(self.profile(&id.parse()?)?)),
            EndpointKind::Works => Ok(Record::Works(self.works(&id.parse()?)?)),
            EndpointKind::Employments => Ok(Record::Employments(self.employments(&id.parse()?)?)),
        }
    }

    pub fn profile(&self, subject: &SubjectId) -> Result<ProfileRecord, FetchFailure> {
        timed(EndpointKind::Profile, subject.as_str(), || {
            self.identity.get_profile(subject)
        })
    }

    pub fn works(&self, subject: &SubjectId) -> Result<WorksRecord, FetchFailure> {
        timed(EndpointKind::Works, subject.as_str(), || {
            self.identity.get_works(subject)
        })
    }

    pub fn employments(&self, subject: &SubjectId) -> Result<EmploymentsRecord, FetchFailure> {
        timed(EndpointKind::Employments, subject.as_str(), || {
            self.identity.get_employments(subject)
        })
    }

    pub fn citation_count(&self, work_id: &Doi) -> Result<Option<u64>, FetchFailure> {
        timed(EndpointKind::CitationCount, work_id.as_str(), || {
            self.metadata.get_citation_count(work_id)
        })
    }
}

fn timed<T>(
    kind: EndpointKind,
    id: &str,
    call: impl FnOnce() -> Result<T, FetchFailure>,
) -> Result<T, FetchFailure> {
    let start = Instant::now();
    let result = call();
    let latency_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => tracing::debug!(%kind, id, latency_ms, "registry call ok"),
        Err(err) => tracing::debug!(%kind, id, latency_ms, error = %err, "registry call failed"),
    }
    result
}
