use std::cmp::Reverse;
use std::time::Duration;

use crate::clock::Clock;
use crate::domain::{CitationObservation, Doi, ResolutionStatus, WorkRecord};
use crate::error::FetchFailure;

/// Observations in attempt order plus bookkeeping about what was skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub observations: Vec<CitationObservation>,
    /// More works carried identifiers than `max_items` allowed.
    pub limited: bool,
    /// The time budget ran out before every selected work was attempted.
    pub budget_exhausted: bool,
}

impl Resolution {
    pub fn successful_lookups(&self) -> usize {
        self.observations
            .iter()
            .filter(|obs| obs.is_successful())
            .count()
    }

    pub fn failed_lookups(&self) -> usize {
        self.observations.len() - self.successful_lookups()
    }
}

/// Resolves citation counts for the most recent `max_items` works.
///
/// Works are ordered newest first (undated last, ties keep input order) and
/// truncated before any lookup. Before each attempt the elapsed time is
/// checked; once it is past `time_budget` the remaining works are left out of
/// the result entirely. A failed lookup never stops the batch.
pub fn resolve<C, F>(
    mut works: Vec<WorkRecord>,
    max_items: usize,
    time_budget: Duration,
    clock: &C,
    mut lookup: F,
) -> Resolution
where
    C: Clock + ?Sized,
    F: FnMut(&Doi) -> Result<Option<u64>, FetchFailure>,
{
    works.sort_by_key(|work| Reverse(work.publication_year.unwrap_or(0)));
    let limited = works.len() > max_items;
    works.truncate(max_items);

    let started = clock.now();
    let mut observations = Vec::with_capacity(works.len());
    let mut budget_exhausted = false;

    for work in works {
        let elapsed = clock.now().saturating_duration_since(started);
        if elapsed > time_budget {
            tracing::warn!(
                attempted = observations.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "citation lookup budget exhausted"
            );
            budget_exhausted = true;
            break;
        }

        let (citation_count, resolution_status) = match lookup(&work.work_id) {
            Ok(Some(count)) if count > 0 => (count, ResolutionStatus::Resolved),
            Ok(_) => (0, ResolutionStatus::Empty),
            Err(FetchFailure::NotFound(_)) => (0, ResolutionStatus::Empty),
            Err(err) => {
                tracing::warn!(work = %work.work_id, error = %err, "citation lookup failed");
                (0, ResolutionStatus::Failed)
            }
        };

        observations.push(CitationObservation {
            work_id: work.work_id,
            publication_year: work.publication_year,
            citation_count,
            resolution_status,
        });
    }

    Resolution {
        observations,
        limited,
        budget_exhausted,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Instant;

    use super::*;

    struct StepClock {
        origin: Instant,
        offset: Mutex<Duration>,
    }

    impl StepClock {
        fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            }
        }

        fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    impl Clock for StepClock {
        fn now(&self) -> Instant {
            self.origin + *self.offset.lock().unwrap()
        }

        fn current_year(&self) -> i32 {
            2023
        }
    }

    fn work(doi: &str, year: Option<i32>) -> WorkRecord {
        WorkRecord {
            work_id: doi.parse().unwrap(),
            title: doi.to_string(),
            publication_year: year,
        }
    }

    #[test]
    fn orders_newest_first_and_truncates() {
        let works = vec![
            work("10.1000/old", Some(2001)),
            work("10.1000/undated", None),
            work("10.1000/new", Some(2022)),
            work("10.1000/mid", Some(2015)),
        ];
        let clock = StepClock::new();
        let result = resolve(works, 3, Duration::from_secs(45), &clock, |_| Ok(Some(1)));

        let order = result
            .observations
            .iter()
            .map(|obs| obs.work_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["10.1000/new", "10.1000/mid", "10.1000/old"]);
        assert!(result.limited);
        assert!(!result.budget_exhausted);
    }

    #[test]
    fn classifies_outcomes() {
        let works = vec![
            work("10.1000/a", Some(2023)),
            work("10.1000/b", Some(2022)),
            work("10.1000/c", Some(2021)),
            work("10.1000/d", Some(2020)),
            work("10.1000/e", Some(2019)),
        ];
        let clock = StepClock::new();
        let result = resolve(works, 10, Duration::from_secs(45), &clock, |doi| {
            match doi.as_str() {
                "10.1000/a" => Ok(Some(7)),
                "10.1000/b" => Ok(Some(0)),
                "10.1000/c" => Ok(None),
                "10.1000/d" => Err(FetchFailure::NotFound(doi.to_string())),
                _ => Err(FetchFailure::Malformed("bad json".to_string())),
            }
        });

        let statuses = result
            .observations
            .iter()
            .map(|obs| obs.resolution_status)
            .collect::<Vec<_>>();
        assert_eq!(
            statuses,
            vec![
                ResolutionStatus::Resolved,
                ResolutionStatus::Empty,
                ResolutionStatus::Empty,
                ResolutionStatus::Empty,
                ResolutionStatus::Failed,
            ]
        );
        assert_eq!(result.successful_lookups(), 4);
        assert_eq!(result.failed_lookups(), 1);
        assert_eq!(result.observations[0].citation_count, 7);
    }

    #[test]
    fn slow_lookups_stop_at_budget() {
        let budget = Duration::from_secs(10);
        let works = (0..10)
            .map(|i| work(&format!("10.1000/w{i}"), Some(2000 + i)))
            .collect::<Vec<_>>();
        let clock = StepClock::new();
        let mut calls = 0usize;
        let result = resolve(works, 10, budget, &clock, |_| {
            calls += 1;
            clock.advance(budget / 5 + Duration::from_millis(1));
            Err(FetchFailure::Unavailable("slow".to_string()))
        });

        assert!(calls <= 5);
        assert_eq!(result.observations.len(), calls);
        assert!(result.budget_exhausted);
        assert_eq!(result.failed_lookups(), calls);
    }
}
