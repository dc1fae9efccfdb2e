use std::collections::BTreeMap;

use crate::domain::{CitationObservation, ResolutionStatus, SeriesPoint, YearBucket};

/// Buckets resolved citation counts by publication year over `[start, end]`.
///
/// Every year in the range gets a bucket, zero-filled when nothing landed in
/// it. Observations that are unresolved, undated or out of range add nothing.
/// An inverted range yields no buckets.
pub fn aggregate(observations: &[CitationObservation], start_year: i32, end_year: i32) -> Vec<YearBucket> {
    let mut per_year = BTreeMap::new();
    for obs in observations {
        if obs.resolution_status != ResolutionStatus::Resolved {
            continue;
        }
        let Some(year) = obs.publication_year else {
            continue;
        };
        if (start_year..=end_year).contains(&year) {
            *per_year.entry(year).or_insert(0u64) += obs.citation_count;
        }
    }
    accumulate(start_year, end_year, |year| {
        per_year.get(&year).copied().unwrap_or(0)
    })
}

/// Rebuilds the full bucket range from stored `(year, citations)` rows.
pub fn buckets_from_series(points: &[SeriesPoint], start_year: i32, end_year: i32) -> Vec<YearBucket> {
    let per_year = points
        .iter()
        .map(|point| (point.year, point.citations))
        .collect::<BTreeMap<_, _>>();
    accumulate(start_year, end_year, |year| {
        per_year.get(&year).copied().unwrap_or(0)
    })
}

/// Zero-filled buckets for the range, used when a run has nothing to count.
pub fn empty(start_year: i32, end_year: i32) -> Vec<YearBucket> {
    accumulate(start_year, end_year, |_| 0)
}

// Single ascending pass keeps cumulative totals monotonic.
fn accumulate(start_year: i32, end_year: i32, citations_for: impl Fn(i32) -> u64) -> Vec<YearBucket> {
    let mut running = 0u64;
    (start_year..=end_year)
        .map(|year| {
            let citations = citations_for(year);
            running += citations;
            YearBucket {
                year,
                citations,
                cumulative_citations: running,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(year: Option<i32>, count: u64, status: ResolutionStatus) -> CitationObservation {
        CitationObservation {
            work_id: format!("10.1000/{count}-{year:?}").parse().unwrap(),
            publication_year: year,
            citation_count: count,
            resolution_status: status,
        }
    }

    #[test]
    fn produces_every_year_with_prefix_sums() {
        let observations = vec![
            obs(Some(2019), 4, ResolutionStatus::Resolved),
            obs(Some(2021), 6, ResolutionStatus::Resolved),
            obs(Some(2021), 1, ResolutionStatus::Resolved),
            obs(Some(2015), 100, ResolutionStatus::Resolved),
            obs(None, 50, ResolutionStatus::Resolved),
            obs(Some(2020), 9, ResolutionStatus::Failed),
        ];
        let buckets = aggregate(&observations, 2018, 2022);

        assert_eq!(buckets.len(), 5);
        let rows = buckets
            .iter()
            .map(|b| (b.year, b.citations, b.cumulative_citations))
            .collect::<Vec<_>>();
        assert_eq!(
            rows,
            vec![
                (2018, 0, 0),
                (2019, 4, 4),
                (2020, 0, 4),
                (2021, 7, 11),
                (2022, 0, 11),
            ]
        );
    }

    #[test]
    fn nothing_resolved_is_all_zero_not_empty() {
        let observations = vec![obs(Some(2020), 3, ResolutionStatus::Failed)];
        let buckets = aggregate(&observations, 2010, 2024);
        assert_eq!(buckets.len(), 15);
        assert!(buckets.iter().all(|b| b.citations == 0 && b.cumulative_citations == 0));
    }

    #[test]
    fn cumulative_is_monotonic() {
        let observations = (0..30)
            .map(|i| obs(Some(2000 + (i * 7) % 20), (i * 13 % 11) as u64, ResolutionStatus::Resolved))
            .collect::<Vec<_>>();
        let buckets = aggregate(&observations, 2000, 2019);
        let mut sum = 0;
        for pair in buckets.windows(2) {
            assert!(pair[0].cumulative_citations <= pair[1].cumulative_citations);
        }
        for bucket in &buckets {
            sum += bucket.citations;
            assert_eq!(bucket.cumulative_citations, sum);
        }
    }

    #[test]
    fn series_rows_fill_gaps() {
        let points = vec![
            SeriesPoint { year: 2021, citations: 5 },
            SeriesPoint { year: 2023, citations: 2 },
        ];
        let buckets = buckets_from_series(&points, 2021, 2023);
        assert_eq!(buckets[1].citations, 0);
        assert_eq!(buckets[2].cumulative_citations, 7);
    }
}
