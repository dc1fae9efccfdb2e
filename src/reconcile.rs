use std::fmt;

use serde::Serialize;

use crate::store::CanonicalSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesSource {
    Persisted,
    Fresh,
}

impl fmt::Display for SeriesSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesSource::Persisted => write!(f, "persisted"),
            SeriesSource::Fresh => write!(f, "fresh"),
        }
    }
}

#[derive(Debug)]
pub enum Selection<T> {
    Persisted(CanonicalSeries),
    Fresh(T),
}

/// Serves a non-empty stored series unless a refresh is forced.
///
/// `fresh` runs only when the stored series is missing, empty, or bypassed.
pub fn select<T>(
    persisted: Option<CanonicalSeries>,
    force_refresh: bool,
    fresh: impl FnOnce() -> T,
) -> Selection<T> {
    match persisted {
        Some(series) if !force_refresh && !series.is_empty() => {
            tracing::info!(subject = %series.subject_id, "serving persisted series");
            Selection::Persisted(series)
        }
        _ => Selection::Fresh(fresh()),
    }
}
