use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PulseError;

static SUBJECT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{4}-\d{4}-\d{3}[\dX]$").expect("subject id pattern"));

static DOI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^10\.\d{4,}/\S+$").expect("doi pattern"));

const SUBJECT_URI_PREFIXES: [&str; 2] = ["https://orcid.org/", "http://orcid.org/"];

const DOI_PREFIXES: [&str; 5] = [
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
];

/// Stable identifier of the researcher being analyzed (an ORCID iD).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn profile_url(&self) -> String {
        format!("https://orcid.org/{}", self.0)
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubjectId {
    type Err = PulseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut trimmed = value.trim();
        for prefix in SUBJECT_URI_PREFIXES {
            if let Some(rest) = trimmed.strip_prefix(prefix) {
                trimmed = rest;
                break;
            }
        }
        let normalized = trimmed.to_uppercase();
        if !SUBJECT_ID_RE.is_match(&normalized) {
            return Err(PulseError::InvalidSubjectId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// A DOI in canonical lower-case form, without any resolver prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Doi(String);

impl Doi {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Doi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Doi {
    type Err = PulseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut trimmed = value.trim();
        for prefix in DOI_PREFIXES {
            let matches = trimmed
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
            if matches {
                trimmed = trimmed[prefix.len()..].trim_start();
                break;
            }
        }
        let normalized = trimmed.to_lowercase();
        if !DOI_RE.is_match(&normalized) {
            return Err(PulseError::InvalidDoi(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Who the subject is, as assembled from the identity registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub subject_id: SubjectId,
    pub display_name: String,
    pub primary_contact: Option<String>,
    pub current_affiliation: Option<String>,
    pub current_location: Option<String>,
    pub profile_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkRecord {
    pub work_id: Doi,
    pub title: String,
    pub publication_year: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    Resolved,
    Empty,
    Failed,
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionStatus::Resolved => write!(f, "resolved"),
            ResolutionStatus::Empty => write!(f, "empty"),
            ResolutionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one citation lookup.
///
/// `publication_year` travels with the observation so the timeline can bucket
/// it without a second join against the work list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationObservation {
    pub work_id: Doi,
    pub publication_year: Option<i32>,
    pub citation_count: u64,
    pub resolution_status: ResolutionStatus,
}

impl CitationObservation {
    /// Lookups that reached the registry, whether or not they found citations.
    pub fn is_successful(&self) -> bool {
        self.resolution_status != ResolutionStatus::Failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearBucket {
    pub year: i32,
    pub citations: u64,
    pub cumulative_citations: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trend {
    pub percent_change: f64,
    pub is_increase: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_citations: u64,
    pub h_index_approx: u32,
    pub i10_index: u32,
    pub avg_citations_per_active_year: f64,
    pub trend: Option<Trend>,
}

/// One persisted `(year, citations)` row of a canonical series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub year: i32,
    pub citations: u64,
}

impl From<&YearBucket> for SeriesPoint {
    fn from(bucket: &YearBucket) -> Self {
        Self {
            year: bucket.year,
            citations: bucket.citations,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_subject_id_strips_uri() {
        let id: SubjectId = "https://orcid.org/0000-0002-1825-009x".parse().unwrap();
        assert_eq!(id.as_str(), "0000-0002-1825-009X");
    }

    #[test]
    fn parse_subject_id_invalid() {
        let err = "0000-0002-1825".parse::<SubjectId>().unwrap_err();
        assert_matches!(err, PulseError::InvalidSubjectId(_));
    }

    #[test]
    fn parse_doi_strips_resolver_prefix() {
        let doi: Doi = "https://doi.org/10.1038/Nature12373".parse().unwrap();
        assert_eq!(doi.as_str(), "10.1038/nature12373");

        let doi: Doi = "doi:10.1000/xyz123".parse().unwrap();
        assert_eq!(doi.as_str(), "10.1000/xyz123");
    }

    #[test]
    fn parse_doi_invalid() {
        let err = "978-3-16-148410-0".parse::<Doi>().unwrap_err();
        assert_matches!(err, PulseError::InvalidDoi(_));
    }
}
