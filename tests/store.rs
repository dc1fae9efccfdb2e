use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use citation_pulse::domain::{SeriesPoint, SubjectId};
use citation_pulse::error::PulseError;
use citation_pulse::store::{CanonicalSeries, FileSeriesStore, SERIES_SCHEMA_VERSION, SeriesStore};

fn temp_store() -> (tempfile::TempDir, FileSeriesStore) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, FileSeriesStore::with_root(root))
}

fn subject(raw: &str) -> SubjectId {
    raw.parse().unwrap()
}

fn points(rows: &[(i32, u64)]) -> Vec<SeriesPoint> {
    rows.iter()
        .map(|(year, citations)| SeriesPoint {
            year: *year,
            citations: *citations,
        })
        .collect()
}

#[test]
fn read_missing_is_none() {
    let (_temp, store) = temp_store();
    assert_eq!(store.read(&subject("0000-0002-1825-0097")).unwrap(), None);
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn replace_all_overwrites_whole_series() {
    let (_temp, store) = temp_store();
    let id = subject("0000-0002-1825-0097");

    let first = CanonicalSeries::new(id.clone(), points(&[(2020, 1), (2021, 2), (2022, 3)]), vec![6], 2);
    store.replace_all(&first).unwrap();
    let second = CanonicalSeries::new(id.clone(), points(&[(2022, 9)]), vec![9], 3);
    store.replace_all(&second).unwrap();

    let stored = store.read(&id).unwrap().unwrap();
    assert_eq!(stored.points, points(&[(2022, 9)]));
    assert_eq!(stored.work_citations, vec![9]);
    assert_eq!(stored.total_works, 3);
    assert_eq!(stored.schema_version, SERIES_SCHEMA_VERSION);

    // Only the series file remains; no temp files left next to it.
    let entries = std::fs::read_dir(store.series_dir().as_std_path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(entries, vec!["0000-0002-1825-0097.json".to_string()]);
}

#[test]
fn list_and_remove() {
    let (_temp, store) = temp_store();
    let a = subject("0000-0002-1825-0097");
    let b = subject("0000-0001-5109-3700");
    for id in [&a, &b] {
        store
            .replace_all(&CanonicalSeries::new(id.clone(), points(&[(2023, 1)]), vec![1], 1))
            .unwrap();
    }

    assert_eq!(store.list().unwrap(), vec![b.clone(), a.clone()]);
    assert!(store.remove(&a).unwrap());
    assert!(!store.remove(&a).unwrap());
    assert_eq!(store.list().unwrap(), vec![b]);
}

#[test]
fn corrupt_file_is_a_filesystem_error() {
    let (_temp, store) = temp_store();
    let id = subject("0000-0002-1825-0097");
    std::fs::create_dir_all(store.series_dir().as_std_path()).unwrap();
    std::fs::write(store.series_path(&id).as_std_path(), b"{\"points\": [").unwrap();

    assert_matches!(store.read(&id), Err(PulseError::Filesystem(_)));
}
