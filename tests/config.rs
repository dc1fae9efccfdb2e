use std::time::Duration;

use assert_matches::assert_matches;

use citation_pulse::config::{Config, ConfigLoader};
use citation_pulse::error::PulseError;

#[test]
fn resolve_partial_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("citation-pulse.json");
    std::fs::write(
        &path,
        r#"{
            "years_back": 5,
            "time_budget_seconds": 12.5,
            "contact_email": "bibliometrics@example.org",
            "store_root": "/var/lib/pulse"
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.years_back, 5);
    assert_eq!(resolved.max_publications, 20);
    assert_eq!(resolved.time_budget, Duration::from_millis(12_500));
    assert_eq!(resolved.request_timeout, Duration::from_secs(10));
    assert_eq!(
        resolved.contact_email.as_deref(),
        Some("bibliometrics@example.org")
    );
    assert_eq!(resolved.store_root.unwrap().as_str(), "/var/lib/pulse");
    assert_eq!(resolved.orcid_api_base, "https://pub.orcid.org/v3.0");
}

#[test]
fn explicit_missing_path_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, PulseError::ConfigRead(_));
}

#[test]
fn malformed_file_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("citation-pulse.json");
    std::fs::write(&path, "{ years_back: 3 ").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, PulseError::ConfigParse(_));
}

#[test]
fn validation_rejects_zero_values() {
    let err = ConfigLoader::resolve_config(Config {
        years_back: Some(0),
        ..Config::default()
    })
    .unwrap_err();
    assert_matches!(err, PulseError::InvalidParameter(_));

    let err = ConfigLoader::resolve_config(Config {
        identity_concurrency: Some(0),
        ..Config::default()
    })
    .unwrap_err();
    assert_matches!(err, PulseError::InvalidParameter(_));
}
