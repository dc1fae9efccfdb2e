use std::io::{self, Write};

use serde::Serialize;

use crate::domain::SubjectId;
use crate::engine::{CitationReport, ProgressEvent, ProgressSink};
use crate::fetcher::Record;
use crate::identity::{IdentityLookup, IdentityOutcome};
use crate::jobs::{JobRecord, JobStatus};
use crate::store::CanonicalSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Json,
    Text,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &CitationReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_identities(outcomes: &[IdentityOutcome]) -> io::Result<()> {
        Self::print_json(&outcomes)
    }

    pub fn print_record(record: &Record) -> io::Result<()> {
        Self::print_json(record)
    }

    pub fn print_jobs(jobs: &[JobRecord]) -> io::Result<()> {
        Self::print_json(&jobs)
    }

    pub fn print_series(series: &CanonicalSeries) -> io::Result<()> {
        Self::print_json(series)
    }

    pub fn print_subjects(subjects: &[SubjectId]) -> io::Result<()> {
        Self::print_json(&subjects)
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human-readable rendering; progress goes to stderr.
pub struct TextOutput;

impl TextOutput {
    pub fn print_report(report: &CitationReport) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "Subject {} ({})", report.subject_id, report.source)?;
        writeln!(out, "Period  {}", report.analysis_period)?;
        if let Some(error) = &report.error {
            writeln!(out, "Error   {error}")?;
        }
        writeln!(out)?;
        writeln!(out, "{:>6} {:>10} {:>12}", "year", "citations", "cumulative")?;
        for bucket in &report.buckets {
            writeln!(
                out,
                "{:>6} {:>10} {:>12}",
                bucket.year, bucket.citations, bucket.cumulative_citations
            )?;
        }
        writeln!(out)?;

        let metrics = &report.metrics;
        writeln!(out, "total citations      {}", metrics.total_citations)?;
        writeln!(out, "h-index (approx.)    {}", metrics.h_index_approx)?;
        writeln!(out, "i10-index            {}", metrics.i10_index)?;
        writeln!(
            out,
            "avg per active year  {:.1}",
            metrics.avg_citations_per_active_year
        )?;
        match &metrics.trend {
            Some(trend) => writeln!(out, "trend                {:+.1}%", trend.percent_change)?,
            None => writeln!(out, "trend                n/a")?,
        }
        writeln!(out)?;
        writeln!(
            out,
            "works {} | considered {} | cited {} | lookups ok {} failed {}{}",
            report.total_works,
            report.total_publications_considered,
            report.cited_works,
            report.successful_lookups,
            report.failed_lookups,
            if report.limited_analysis { " | limited" } else { "" }
        )?;
        Ok(())
    }

    pub fn print_identities(outcomes: &[IdentityOutcome]) -> io::Result<()> {
        let mut out = io::stdout().lock();
        for outcome in outcomes {
            match &outcome.lookup {
                IdentityLookup::Found(identity) => {
                    writeln!(out, "{}  {}", identity.subject_id, identity.display_name)?;
                    let details = [
                        identity.current_affiliation.as_deref(),
                        identity.current_location.as_deref(),
                        identity.primary_contact.as_deref(),
                    ];
                    for detail in details.into_iter().flatten() {
                        writeln!(out, "    {detail}")?;
                    }
                }
                IdentityLookup::Failed { error } => {
                    writeln!(out, "{}  failed: {error}", outcome.subject_id)?
                }
                IdentityLookup::TimedOut => writeln!(out, "{}  timed out", outcome.subject_id)?,
            }
        }
        Ok(())
    }

    pub fn print_jobs(jobs: &[JobRecord]) -> io::Result<()> {
        let mut out = io::stdout().lock();
        for job in jobs {
            let status = match &job.status {
                JobStatus::Pending => "pending".to_string(),
                JobStatus::Running => "running".to_string(),
                JobStatus::Done { total_citations } => {
                    format!("done ({total_citations} citations)")
                }
                JobStatus::Failed { error } => format!("failed: {error}"),
            };
            writeln!(out, "#{} {} {status}", job.id, job.subject_id)?;
        }
        Ok(())
    }

    pub fn print_series(series: &CanonicalSeries) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{} (updated {})", series.subject_id, series.updated_at)?;
        for point in &series.points {
            writeln!(out, "{:>6} {:>10}", point.year, point.citations)?;
        }
        Ok(())
    }

    pub fn print_subjects(subjects: &[SubjectId]) -> io::Result<()> {
        let mut out = io::stdout().lock();
        for subject in subjects {
            writeln!(out, "{subject}")?;
        }
        Ok(())
    }
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => eprintln!("{}", event.message),
        }
    }
}
