use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::config::ResolvedConfig;
use crate::domain::{SeriesPoint, SubjectId};
use crate::error::PulseError;

pub const SERIES_SCHEMA_VERSION: u32 = 1;

/// The authoritative per-year history of one subject.
///
/// Always written and read as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSeries {
    pub schema_version: u32,
    pub subject_id: SubjectId,
    pub points: Vec<SeriesPoint>,
    /// Per-work counts of the run that produced `points`.
    #[serde(default)]
    pub work_citations: Vec<u64>,
    /// Work groups on the profile in that run, with or without a DOI.
    #[serde(default)]
    pub total_works: usize,
    pub updated_at: String,
}

impl CanonicalSeries {
    pub fn new(
        subject_id: SubjectId,
        points: Vec<SeriesPoint>,
        work_citations: Vec<u64>,
        total_works: usize,
    ) -> Self {
        Self {
            schema_version: SERIES_SCHEMA_VERSION,
            subject_id,
            points,
            work_citations,
            total_works,
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

pub trait SeriesStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored for `subject`.
    fn read(&self, subject: &SubjectId) -> Result<Option<CanonicalSeries>, PulseError>;
    /// Replaces the whole stored series in one step.
    fn replace_all(&self, series: &CanonicalSeries) -> Result<(), PulseError>;
    fn list(&self) -> Result<Vec<SubjectId>, PulseError>;
    /// Returns whether a series existed.
    fn remove(&self, subject: &SubjectId) -> Result<bool, PulseError>;
}

/// One JSON file per subject under `<root>/series/`.
#[derive(Debug, Clone)]
pub struct FileSeriesStore {
    root: Utf8PathBuf,
}

impl FileSeriesStore {
    pub fn new(config: &ResolvedConfig) -> Result<Self, PulseError> {
        if let Some(root) = &config.store_root {
            return Ok(Self::with_root(root.clone()));
        }
        let root = BaseDirs::new()
            .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().join("citation-pulse")).ok())
            .ok_or_else(|| PulseError::Filesystem("unable to resolve data directory".to_string()))?;
        Ok(Self::with_root(root))
    }

    pub fn with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn series_dir(&self) -> Utf8PathBuf {
        self.root.join("series")
    }

    pub fn series_path(&self, subject: &SubjectId) -> Utf8PathBuf {
        self.series_dir().join(format!("{subject}.json"))
    }
}

impl SeriesStore for FileSeriesStore {
    fn read(&self, subject: &SubjectId) -> Result<Option<CanonicalSeries>, PulseError> {
        let path = self.series_path(subject);
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content =
            fs::read_to_string(path.as_std_path()).map_err(|err| fs_error(&path, err))?;
        let series: CanonicalSeries = serde_json::from_str(&content)
            .map_err(|err| PulseError::Filesystem(format!("{path}: {err}")))?;
        Ok(Some(series))
    }

    fn replace_all(&self, series: &CanonicalSeries) -> Result<(), PulseError> {
        let dir = self.series_dir();
        fs::create_dir_all(dir.as_std_path()).map_err(|err| fs_error(&dir, err))?;
        let content = serde_json::to_vec_pretty(series)
            .map_err(|err| PulseError::Filesystem(err.to_string()))?;

        // Same directory as the target so the final rename never crosses filesystems.
        let mut temp = Builder::new()
            .prefix(".series")
            .suffix(".tmp")
            .tempfile_in(dir.as_std_path())
            .map_err(|err| fs_error(&dir, err))?;
        temp.write_all(&content).map_err(|err| fs_error(&dir, err))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| fs_error(&dir, err))?;

        let dest = self.series_path(&series.subject_id);
        temp.persist(dest.as_std_path())
            .map_err(|err| PulseError::Filesystem(format!("{dest}: {}", err.error)))?;
        tracing::info!(subject = %series.subject_id, points = series.points.len(), "stored series");
        Ok(())
    }

    fn list(&self) -> Result<Vec<SubjectId>, PulseError> {
        let dir = self.series_dir();
        if !dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut subjects = Vec::new();
        for entry in fs::read_dir(dir.as_std_path()).map_err(|err| fs_error(&dir, err))? {
            let entry = entry.map_err(|err| fs_error(&dir, err))?;
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            if let Some(subject) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<SubjectId>().ok())
            {
                subjects.push(subject);
            }
        }
        subjects.sort();
        Ok(subjects)
    }

    fn remove(&self, subject: &SubjectId) -> Result<bool, PulseError> {
        let path = self.series_path(subject);
        if !path.as_std_path().exists() {
            return Ok(false);
        }
        fs::remove_file(path.as_std_path()).map_err(|err| fs_error(&path, err))?;
        Ok(true)
    }
}

fn fs_error(path: &Utf8Path, err: std::io::Error) -> PulseError {
    PulseError::Filesystem(format!("{path}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = FileSeriesStore::with_root(Utf8PathBuf::from("/tmp/pulse"));
        let subject: SubjectId = "0000-0002-1825-0097".parse().unwrap();
        assert!(
            store
                .series_path(&subject)
                .ends_with("series/0000-0002-1825-0097.json")
        );
    }

    #[test]
    fn configured_root_wins() {
        let config = ResolvedConfig {
            store_root: Some(Utf8PathBuf::from("/srv/pulse")),
            ..ResolvedConfig::default()
        };
        let store = FileSeriesStore::new(&config).unwrap();
        assert_eq!(store.root(), Utf8Path::new("/srv/pulse"));
    }
}
