use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use serde::Serialize;

use crate::domain::SubjectId;
use crate::engine::CitationReport;
use crate::error::PulseError;

pub type JobId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done { total_citations: u64 },
    Failed { error: String },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Done { .. } | JobStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub subject_id: SubjectId,
    pub status: JobStatus,
    pub enqueued_at: String,
    pub finished_at: Option<String>,
}

type JobTable = Arc<Mutex<BTreeMap<JobId, JobRecord>>>;

/// Background refreshes with observable status.
///
/// One worker thread drains the queue in order. Every job ends `Done` or
/// `Failed`; nothing is dropped silently.
pub struct RefreshQueue {
    sender: Option<Sender<JobId>>,
    jobs: JobTable,
    next_id: AtomicU64,
    worker: Option<JoinHandle<()>>,
}

impl RefreshQueue {
    pub fn start<F>(refresh: F) -> Self
    where
        F: Fn(&SubjectId) -> Result<CitationReport, PulseError> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel::<JobId>();
        let jobs: JobTable = Arc::new(Mutex::new(BTreeMap::new()));
        let table = Arc::clone(&jobs);

        let worker = thread::spawn(move || {
            for id in receiver {
                let Some(subject) = transition(&table, id, JobStatus::Running) else {
                    continue;
                };
                tracing::info!(job = id, %subject, "refresh started");

                let status = match panic::catch_unwind(AssertUnwindSafe(|| refresh(&subject))) {
                    Ok(Ok(report)) => match report.error {
                        Some(error) => JobStatus::Failed { error },
                        None => JobStatus::Done {
                            total_citations: report.metrics.total_citations,
                        },
                    },
                    Ok(Err(err)) => JobStatus::Failed {
                        error: err.to_string(),
                    },
                    Err(_) => JobStatus::Failed {
                        error: "refresh panicked".to_string(),
                    },
                };
                match &status {
                    JobStatus::Failed { error } => {
                        tracing::warn!(job = id, %subject, error = %error, "refresh failed")
                    }
                    _ => tracing::info!(job = id, %subject, "refresh done"),
                }
                transition(&table, id, status);
            }
        });

        Self {
            sender: Some(sender),
            jobs,
            next_id: AtomicU64::new(1),
            worker: Some(worker),
        }
    }

    pub fn enqueue(&self, subject: SubjectId) -> Result<JobId, PulseError> {
        let sender = self.sender.as_ref().ok_or(PulseError::QueueClosed)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut jobs = self.jobs.lock().map_err(|_| PulseError::QueueClosed)?;
            jobs.insert(
                id,
                JobRecord {
                    id,
                    subject_id: subject,
                    status: JobStatus::Pending,
                    enqueued_at: chrono::Utc::now().to_rfc3339(),
                    finished_at: None,
                },
            );
        }
        if sender.send(id).is_err() {
            transition(
                &self.jobs,
                id,
                JobStatus::Failed {
                    error: PulseError::QueueClosed.to_string(),
                },
            );
            return Err(PulseError::QueueClosed);
        }
        tracing::debug!(job = id, "refresh queued");
        Ok(id)
    }

    pub fn status(&self, id: JobId) -> Result<JobRecord, PulseError> {
        self.jobs
            .lock()
            .ok()
            .and_then(|jobs| jobs.get(&id).cloned())
            .ok_or(PulseError::JobNotFound(id))
    }

    /// All jobs ever enqueued, by id.
    pub fn jobs(&self) -> Vec<JobRecord> {
        self.jobs
            .lock()
            .map(|jobs| jobs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Stops accepting work, waits for queued jobs, and returns their records.
    pub fn shutdown(mut self) -> Vec<JobRecord> {
        self.close();
        self.jobs()
    }

    fn close(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            worker.join().ok();
        }
    }
}

impl Drop for RefreshQueue {
    fn drop(&mut self) {
        self.close();
    }
}

fn transition(table: &JobTable, id: JobId, status: JobStatus) -> Option<SubjectId> {
    let mut jobs = table.lock().ok()?;
    let record = jobs.get_mut(&id)?;
    if status.is_finished() {
        record.finished_at = Some(chrono::Utc::now().to_rfc3339());
    }
    record.status = status;
    Some(record.subject_id.clone())
}
