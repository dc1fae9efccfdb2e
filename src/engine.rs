use std::time::Duration;

use serde::Serialize;

use crate::clock::Clock;
use crate::config::{self, ResolvedConfig};
use crate::crossref::MetadataRegistryClient;
use crate::domain::{CitationObservation, MetricsSnapshot, SeriesPoint, SubjectId, YearBucket};
use crate::error::{FetchFailure, PulseError};
use crate::extract;
use crate::fetcher::RecordFetcher;
use crate::metrics;
use crate::orcid::{IdentityRegistryClient, WorksRecord};
use crate::reconcile::{self, SeriesSource, Selection};
use crate::resolver;
use crate::store::{CanonicalSeries, SeriesStore};
use crate::timeline;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Discards progress; used by background jobs.
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Debug, Clone)]
pub struct MetricsRequest {
    pub years_back: u32,
    pub max_publications: usize,
    pub time_budget: Duration,
    pub force_refresh: bool,
    /// Write a fresh series back to the store.
    pub persist: bool,
}

impl MetricsRequest {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            years_back: config.years_back,
            max_publications: config.max_publications,
            time_budget: config.time_budget,
            force_refresh: false,
            persist: true,
        }
    }

    pub fn validate(&self) -> Result<(), PulseError> {
        config::check_years_back(self.years_back)?;
        if self.max_publications == 0 {
            return Err(PulseError::InvalidParameter(
                "max_publications must be at least 1".to_string(),
            ));
        }
        if self.time_budget.is_zero() {
            return Err(PulseError::InvalidParameter(
                "time budget must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything one `compute_citation_metrics` call produced.
#[derive(Debug, Clone, Serialize)]
pub struct CitationReport {
    pub subject_id: SubjectId,
    pub analysis_period: String,
    pub start_year: i32,
    pub end_year: i32,
    pub source: SeriesSource,
    pub metrics: MetricsSnapshot,
    pub buckets: Vec<YearBucket>,
    pub successful_lookups: usize,
    pub failed_lookups: usize,
    pub total_publications_considered: usize,
    pub total_works: usize,
    pub cited_works: usize,
    pub limited_analysis: bool,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub observations: Vec<CitationObservation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the works fetch failed and nothing could be counted.
    #[serde(skip)]
    pub failure: Option<FetchFailure>,
}

struct Period {
    start_year: i32,
    end_year: i32,
}

impl Period {
    /// `years_back` calendar years ending with `end_year`, inclusive.
    fn ending(end_year: i32, years_back: u32) -> Result<Self, PulseError> {
        let start_year = i32::try_from(years_back)
            .ok()
            .and_then(|span| end_year.checked_sub(span))
            .and_then(|year| year.checked_add(1))
            .ok_or_else(|| {
                PulseError::InvalidParameter(format!(
                    "years_back {years_back} reaches before year {}",
                    i32::MIN
                ))
            })?;
        Ok(Self {
            start_year,
            end_year,
        })
    }

    fn label(&self) -> String {
        format!("{}-{}", self.start_year, self.end_year)
    }
}

pub struct Engine<I, M, S, C> {
    fetcher: RecordFetcher<I, M>,
    store: S,
    clock: C,
}

impl<I, M, S, C> Engine<I, M, S, C>
where
    I: IdentityRegistryClient,
    M: MetadataRegistryClient,
    S: SeriesStore,
    C: Clock,
{
    pub fn new(fetcher: RecordFetcher<I, M>, store: S, clock: C) -> Self {
        Self {
            fetcher,
            store,
            clock,
        }
    }

    /// Per-year citation series and indicators for `subject`.
    ///
    /// A non-empty stored series is served as is unless `force_refresh` is
    /// set. Only invalid parameters are returned as errors; a failed works
    /// fetch still yields a report, zero-filled and with `error` set.
    pub fn compute_citation_metrics(
        &self,
        subject: &SubjectId,
        request: &MetricsRequest,
        sink: &dyn ProgressSink,
    ) -> Result<CitationReport, PulseError> {
        request.validate()?;
        let started = self.clock.now();
        let period = Period::ending(self.clock.current_year(), request.years_back)?;

        sink.event(ProgressEvent {
            message: format!("phase=Resolve; subject {subject} period {}", period.label()),
            elapsed: None,
        });

        let persisted = if request.force_refresh {
            None
        } else {
            match self.store.read(subject) {
                Ok(series) => series,
                Err(err) => {
                    tracing::warn!(%subject, error = %err, "stored series unreadable, recomputing");
                    None
                }
            }
        };

        let selection = reconcile::select(persisted, request.force_refresh, || {
            self.fresh_report(subject, request, &period, sink)
        });
        let mut report = match selection {
            Selection::Persisted(series) => self.persisted_report(series, &period),
            Selection::Fresh(report) => report,
        };

        let elapsed = self.clock.now().saturating_duration_since(started);
        report.elapsed_ms = elapsed.as_millis() as u64;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Done; source={} total_citations={}",
                report.source, report.metrics.total_citations
            ),
            elapsed: Some(elapsed),
        });
        Ok(report)
    }

    fn persisted_report(&self, series: CanonicalSeries, period: &Period) -> CitationReport {
        let buckets =
            timeline::buckets_from_series(&series.points, period.start_year, period.end_year);
        let metrics = metrics::compute(&buckets, &series.work_citations, period.end_year);
        CitationReport {
            subject_id: series.subject_id,
            analysis_period: period.label(),
            start_year: period.start_year,
            end_year: period.end_year,
            source: SeriesSource::Persisted,
            metrics,
            buckets,
            successful_lookups: 0,
            failed_lookups: 0,
            total_publications_considered: series.work_citations.len(),
            total_works: series.total_works,
            cited_works: series.work_citations.iter().filter(|c| **c > 0).count(),
            limited_analysis: false,
            elapsed_ms: 0,
            observations: Vec::new(),
            error: None,
            failure: None,
        }
    }

    fn fresh_report(
        &self,
        subject: &SubjectId,
        request: &MetricsRequest,
        period: &Period,
        sink: &dyn ProgressSink,
    ) -> CitationReport {
        sink.event(ProgressEvent {
            message: "orcid.works request".to_string(),
            elapsed: None,
        });
        let works_record = match self.fetcher.works(subject) {
            Ok(record) => record,
            Err(FetchFailure::NotFound(_)) => {
                tracing::info!(%subject, "no works record upstream");
                WorksRecord::default()
            }
            Err(err) => {
                tracing::warn!(%subject, error = %err, "works fetch failed");
                return self.failed_report(subject, period, err);
            }
        };

        let extracted = extract::extract(&works_record);
        tracing::info!(
            %subject,
            total_works = extracted.total_works,
            with_doi = extracted.works.len(),
            "works extracted"
        );
        sink.event(ProgressEvent {
            message: format!(
                "phase=Resolve; {} works, {} with DOI",
                extracted.total_works,
                extracted.works.len()
            ),
            elapsed: None,
        });

        let resolution = resolver::resolve(
            extracted.works,
            request.max_publications,
            request.time_budget,
            &self.clock,
            |work_id| self.fetcher.citation_count(work_id),
        );

        let buckets =
            timeline::aggregate(&resolution.observations, period.start_year, period.end_year);
        let per_work = resolution
            .observations
            .iter()
            .map(|obs| obs.citation_count)
            .collect::<Vec<_>>();
        let metrics = metrics::compute(&buckets, &per_work, period.end_year);
        let successful_lookups = resolution.successful_lookups();

        if request.persist && successful_lookups > 0 {
            let series = CanonicalSeries::new(
                subject.clone(),
                buckets.iter().map(SeriesPoint::from).collect(),
                per_work.clone(),
                extracted.total_works,
            );
            sink.event(ProgressEvent {
                message: "phase=Store; replacing series".to_string(),
                elapsed: None,
            });
            if let Err(err) = self.store.replace_all(&series) {
                tracing::warn!(%subject, error = %err, "failed to store series");
            }
        }

        CitationReport {
            subject_id: subject.clone(),
            analysis_period: period.label(),
            start_year: period.start_year,
            end_year: period.end_year,
            source: SeriesSource::Fresh,
            metrics,
            buckets,
            successful_lookups,
            failed_lookups: resolution.failed_lookups(),
            total_publications_considered: resolution.observations.len(),
            total_works: extracted.total_works,
            cited_works: per_work.iter().filter(|c| **c > 0).count(),
            limited_analysis: resolution.limited,
            elapsed_ms: 0,
            observations: resolution.observations,
            error: None,
            failure: None,
        }
    }

    fn failed_report(&self, subject: &SubjectId, period: &Period, err: FetchFailure) -> CitationReport {
        let buckets = timeline::empty(period.start_year, period.end_year);
        let metrics = metrics::compute(&buckets, &[], period.end_year);
        CitationReport {
            subject_id: subject.clone(),
            analysis_period: period.label(),
            start_year: period.start_year,
            end_year: period.end_year,
            source: SeriesSource::Fresh,
            metrics,
            buckets,
            successful_lookups: 0,
            failed_lookups: 0,
            total_publications_considered: 0,
            total_works: 0,
            cited_works: 0,
            limited_analysis: false,
            elapsed_ms: 0,
            observations: Vec::new(),
            error: Some(err.to_string()),
            failure: Some(err),
        }
    }
}
