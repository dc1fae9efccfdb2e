use std::collections::HashSet;

use crate::domain::{Doi, WorkRecord};
use crate::orcid::WorksRecord;

const DOI_TYPE: &str = "doi";
const UNKNOWN_TITLE: &str = "Unknown Title";

/// Normalized view of a works record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedWorks {
    /// One entry per distinct DOI, in encounter order.
    pub works: Vec<WorkRecord>,
    /// Every work group, including those with no usable identifier.
    pub total_works: usize,
}

/// Flattens work groups into citable [`WorkRecord`]s.
///
/// Each distinct DOI on a work summary becomes its own record. A DOI seen
/// again later in the record is skipped; the first occurrence keeps its title
/// and year.
pub fn extract(record: &WorksRecord) -> ExtractedWorks {
    let mut seen = HashSet::new();
    let mut works = Vec::new();

    for summary in record.group.iter().flat_map(|group| group.work_summary.iter()) {
        let title = summary.title_text().unwrap_or(UNKNOWN_TITLE);
        let year = summary.publication_year();

        for external in summary.external_ids() {
            let is_doi = external
                .id_type
                .as_deref()
                .is_some_and(|kind| kind.trim().eq_ignore_ascii_case(DOI_TYPE));
            if !is_doi {
                continue;
            }
            let Some(doi) = external
                .value
                .as_deref()
                .and_then(|value| value.parse::<Doi>().ok())
            else {
                tracing::debug!(value = ?external.value, "skipping unparseable DOI");
                continue;
            };
            if !seen.insert(doi.clone()) {
                continue;
            }
            works.push(WorkRecord {
                work_id: doi,
                title: title.to_string(),
                publication_year: year,
            });
        }
    }

    ExtractedWorks {
        works,
        total_works: record.group.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn works(value: serde_json::Value) -> WorksRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn emits_one_record_per_distinct_doi() {
        let record = works(serde_json::json!({"group": [{"work-summary": [{
            "title": {"title": {"value": "Two handles"}},
            "publication-date": {"year": {"value": "2020"}},
            "external-ids": {"external-id": [
                {"external-id-type": "doi", "external-id-value": "10.1000/A"},
                {"external-id-type": "isbn", "external-id-value": "978-3-16-148410-0"},
                {"external-id-type": "DOI", "external-id-value": "https://doi.org/10.1000/b"},
                {"external-id-type": "doi", "external-id-value": "10.1000/a"}
            ]}
        }]}]}));

        let extracted = extract(&record);
        let ids = extracted
            .works
            .iter()
            .map(|work| work.work_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["10.1000/a", "10.1000/b"]);
        assert!(extracted.works.iter().all(|w| w.publication_year == Some(2020)));
        assert_eq!(extracted.total_works, 1);
    }

    #[test]
    fn groups_without_doi_still_count() {
        let record = works(serde_json::json!({"group": [
            {"work-summary": [{"title": null, "publication-date": null, "external-ids": null}]},
            {"work-summary": [{
                "external-ids": {"external-id": [
                    {"external-id-type": "doi", "external-id-value": "not-a-doi"}
                ]}
            }]},
            {"work-summary": [{
                "publication-date": {"year": {"value": "n.d."}},
                "external-ids": {"external-id": [
                    {"external-id-type": "doi", "external-id-value": "10.5555/xyz"}
                ]}
            }]}
        ]}));

        let extracted = extract(&record);
        assert_eq!(extracted.total_works, 3);
        assert_eq!(extracted.works.len(), 1);
        assert_eq!(extracted.works[0].title, "Unknown Title");
        assert_eq!(extracted.works[0].publication_year, None);
    }

    #[test]
    fn empty_record_yields_nothing() {
        let extracted = extract(&WorksRecord::default());
        assert_eq!(extracted, ExtractedWorks::default());
    }
}
