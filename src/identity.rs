use std::collections::VecDeque;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::{Identity, SubjectId};
use crate::orcid::{IdentityRegistryClient, extract_identity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IdentityLookup {
    Found(Identity),
    Failed { error: String },
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityOutcome {
    pub subject_id: SubjectId,
    pub lookup: IdentityLookup,
}

/// Resolves many identities at once on a bounded set of workers.
pub struct IdentityEnricher<I> {
    client: Arc<I>,
    concurrency: usize,
    task_timeout: Duration,
}

impl<I: IdentityRegistryClient + 'static> IdentityEnricher<I> {
    pub fn new(client: Arc<I>, concurrency: usize, task_timeout: Duration) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
            task_timeout,
        }
    }

    pub fn from_config(client: Arc<I>, config: &ResolvedConfig) -> Self {
        Self::new(
            client,
            config.identity_concurrency,
            config.identity_task_timeout,
        )
    }

    /// One outcome per input, in input order.
    ///
    /// At most `concurrency` lookups are in flight, counting ones that
    /// already timed out. A lookup that outlives `task_timeout` is reported
    /// as [`IdentityLookup::TimedOut`]; its worker takes the next subject
    /// only once the abandoned call has returned.
    pub fn enrich(&self, subjects: &[SubjectId]) -> Vec<IdentityOutcome> {
        if subjects.is_empty() {
            return Vec::new();
        }

        let queue = Arc::new(Mutex::new(
            subjects.iter().cloned().enumerate().collect::<VecDeque<_>>(),
        ));
        let (tx, rx) = mpsc::channel();
        let workers = self.concurrency.min(subjects.len());

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let client = Arc::clone(&self.client);
            let task_timeout = self.task_timeout;
            handles.push(thread::spawn(move || {
                loop {
                    let next = match queue.lock() {
                        Ok(mut pending) => pending.pop_front(),
                        Err(_) => None,
                    };
                    let Some((index, subject)) = next else {
                        break;
                    };
                    let (lookup, call) = run_with_timeout(&client, &subject, task_timeout);
                    let sent = tx.send((index, IdentityOutcome { subject_id: subject, lookup }));
                    // The slot stays taken until the upstream call is over.
                    call.join().ok();
                    if sent.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        // Completion order; re-sorted below.
        let mut collected = rx.into_iter().collect::<Vec<_>>();
        for handle in handles {
            handle.join().ok();
        }

        collected.sort_by_key(|(index, _)| *index);
        let mut collected = collected.into_iter().peekable();
        let mut outcomes = Vec::with_capacity(subjects.len());
        for (index, subject) in subjects.iter().enumerate() {
            match collected.next_if(|(done, _)| *done == index) {
                Some((_, outcome)) => outcomes.push(outcome),
                // Its worker died before reporting.
                None => outcomes.push(IdentityOutcome {
                    subject_id: subject.clone(),
                    lookup: IdentityLookup::Failed {
                        error: "lookup worker stopped".to_string(),
                    },
                }),
            }
        }
        outcomes
    }
}

fn run_with_timeout<I: IdentityRegistryClient + 'static>(
    client: &Arc<I>,
    subject: &SubjectId,
    task_timeout: Duration,
) -> (IdentityLookup, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let client = Arc::clone(client);
    let task_subject = subject.clone();
    // A stuck call ends on its own once the HTTP timeout fires.
    let call = thread::spawn(move || {
        let _ = tx.send(lookup_identity(client.as_ref(), &task_subject));
    });

    let lookup = match rx.recv_timeout(task_timeout) {
        Ok(lookup) => lookup,
        Err(RecvTimeoutError::Timeout) => {
            tracing::warn!(%subject, timeout_ms = task_timeout.as_millis() as u64, "identity lookup timed out");
            IdentityLookup::TimedOut
        }
        Err(RecvTimeoutError::Disconnected) => IdentityLookup::Failed {
            error: "identity lookup aborted".to_string(),
        },
    };
    (lookup, call)
}

/// Profile plus current employment. Only the profile is required.
pub fn lookup_identity<I: IdentityRegistryClient + ?Sized>(
    client: &I,
    subject: &SubjectId,
) -> IdentityLookup {
    let profile = match client.get_profile(subject) {
        Ok(profile) => profile,
        Err(err) => {
            tracing::warn!(%subject, error = %err, "profile fetch failed");
            return IdentityLookup::Failed {
                error: err.to_string(),
            };
        }
    };
    let employments = match client.get_employments(subject) {
        Ok(record) => Some(record),
        Err(err) => {
            tracing::debug!(%subject, error = %err, "no employment record");
            None
        }
    };
    IdentityLookup::Found(extract_identity(subject, &profile, employments.as_ref()))
}
