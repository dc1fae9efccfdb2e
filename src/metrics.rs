use crate::domain::{MetricsSnapshot, Trend, YearBucket};

/// Derives the indicator snapshot. Pure: no I/O, no hidden state.
///
/// `per_work_counts` drives the h and i10 indices; bucket totals drive
/// everything else. `current_year` selects the buckets compared for the trend.
pub fn compute(buckets: &[YearBucket], per_work_counts: &[u64], current_year: i32) -> MetricsSnapshot {
    let total_citations = buckets.iter().map(|bucket| bucket.citations).sum::<u64>();
    let active_years = buckets.iter().filter(|bucket| bucket.citations > 0).count();
    let avg_citations_per_active_year = if active_years == 0 {
        0.0
    } else {
        total_citations as f64 / active_years as f64
    };

    MetricsSnapshot {
        total_citations,
        h_index_approx: h_index(per_work_counts),
        i10_index: i10_index(per_work_counts),
        avg_citations_per_active_year,
        trend: trend(buckets, current_year),
    }
}

/// Largest 1-based rank `i` whose count, sorted descending, is at least `i`.
pub fn h_index(per_work_counts: &[u64]) -> u32 {
    let mut counts = per_work_counts.to_vec();
    counts.sort_unstable_by(|a, b| b.cmp(a));
    counts
        .iter()
        .enumerate()
        .take_while(|(index, count)| **count >= (*index as u64 + 1))
        .count() as u32
}

pub fn i10_index(per_work_counts: &[u64]) -> u32 {
    per_work_counts.iter().filter(|count| **count >= 10).count() as u32
}

/// Year-over-year change between `current_year` and the year before.
///
/// `None` when the previous year had no citations or no bucket.
pub fn trend(buckets: &[YearBucket], current_year: i32) -> Option<Trend> {
    let citations_in = |year: i32| {
        buckets
            .iter()
            .find(|bucket| bucket.year == year)
            .map(|bucket| bucket.citations)
            .unwrap_or(0)
    };
    let previous = citations_in(current_year - 1);
    if previous == 0 {
        return None;
    }
    let current = citations_in(current_year);
    let percent_change = round1((current as f64 - previous as f64) / previous as f64 * 100.0);
    Some(Trend {
        percent_change,
        is_increase: percent_change >= 0.0,
    })
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buckets(rows: &[(i32, u64)]) -> Vec<YearBucket> {
        let mut running = 0;
        rows.iter()
            .map(|(year, citations)| {
                running += citations;
                YearBucket {
                    year: *year,
                    citations: *citations,
                    cumulative_citations: running,
                }
            })
            .collect()
    }

    #[test]
    fn h_index_examples() {
        assert_eq!(h_index(&[10, 8, 5, 4, 3]), 4);
        assert_eq!(h_index(&[]), 0);
        assert_eq!(h_index(&[1, 1, 1]), 1);
        assert_eq!(h_index(&[0, 0]), 0);
        assert_eq!(h_index(&[3, 0, 5]), 2);
    }

    #[test]
    fn i10_counts_ten_and_above() {
        assert_eq!(i10_index(&[12, 10, 9, 5]), 2);
        assert_eq!(i10_index(&[]), 0);
    }

    #[test]
    fn trend_omitted_on_zero_baseline() {
        let series = buckets(&[(2022, 0), (2023, 12)]);
        assert_eq!(trend(&series, 2023), None);
        assert_eq!(trend(&series, 2030), None);
    }

    #[test]
    fn trend_rounds_and_signs() {
        let series = buckets(&[(2022, 3), (2023, 2)]);
        let t = trend(&series, 2023).unwrap();
        assert_eq!(t.percent_change, -33.3);
        assert!(!t.is_increase);

        let series = buckets(&[(2022, 4), (2023, 4)]);
        let t = trend(&series, 2023).unwrap();
        assert_eq!(t.percent_change, 0.0);
        assert!(t.is_increase);
    }

    #[test]
    fn average_over_active_years_only() {
        let series = buckets(&[(2020, 5), (2021, 0), (2022, 2), (2023, 0)]);
        let snapshot = compute(&series, &[5, 2], 2023);
        assert_eq!(snapshot.total_citations, 7);
        assert_eq!(snapshot.avg_citations_per_active_year, 3.5);

        let zero = compute(&buckets(&[(2023, 0)]), &[], 2023);
        assert_eq!(zero.avg_citations_per_active_year, 0.0);
    }

    #[test]
    fn average_is_not_rounded() {
        let series = buckets(&[(2021, 4), (2022, 3), (2023, 3)]);
        let snapshot = compute(&series, &[4, 3, 3], 2023);
        assert_eq!(snapshot.avg_citations_per_active_year, 10.0 / 3.0);
    }

    #[test]
    fn compute_is_idempotent() {
        let series = buckets(&[(2021, 8), (2022, 10), (2023, 15)]);
        let counts = [11, 9, 7, 4, 2];
        let first = compute(&series, &counts, 2023);
        let second = compute(&series, &counts, 2023);
        assert_eq!(first, second);
        assert_eq!(first.trend.unwrap().percent_change, 50.0);
    }
}
