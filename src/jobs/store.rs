//! Durable job records, keyed by job id.
//!
//! The compare-and-swap write is the pipeline's entire concurrency contract:
//! a record is replaced only if its stored status still matches what the
//! writer last observed, so duplicate triggers and racing workers resolve
//! themselves without locks. Losing writers simply abandon their attempt.

use std::{collections::HashMap, sync::Mutex};

use super::{Job, JobId, JobStatus};
use crate::prelude::*;

/// Result of a conditional write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CasOutcome {
    /// The stored status matched and the record was replaced.
    Updated,
    /// Another writer got there first; nothing was written.
    Conflict,
}

/// Key-value storage for job records.
///
/// Implementations need exactly three operations; no transactions beyond the
/// single-record conditional write are required.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Persist a brand-new job. Fails if the id already exists, so ids are
    /// never silently reused.
    async fn create(&self, job: &Job) -> Result<()>;

    /// Replace the record for `updated.id` only if the stored status equals
    /// `expected`. Returns [`CasOutcome::Conflict`] with nothing written
    /// otherwise, including when the record does not exist. `expected` may
    /// not be a terminal status: terminal records are write-once.
    async fn compare_and_swap(
        &self,
        expected: JobStatus,
        updated: &Job,
    ) -> Result<CasOutcome>;

    /// Look up a job by id.
    async fn get(&self, id: &JobId) -> Result<Option<Job>>;
}

/// In-memory store backing a single-process deployment, and all the tests.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    /// Held only for the duration of a single map operation.
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.lock().expect("lock poisoned");
        if jobs.contains_key(&job.id) {
            return Err(anyhow!("job {} already exists", job.id));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        expected: JobStatus,
        updated: &Job,
    ) -> Result<CasOutcome> {
        if expected.is_terminal() {
            return Err(anyhow!(
                "cannot replace job {} from terminal status {expected}",
                updated.id
            ));
        }
        let mut jobs = self.jobs.lock().expect("lock poisoned");
        match jobs.get(&updated.id) {
            Some(current) if current.status == expected => {
                jobs.insert(updated.id.clone(), updated.clone());
                Ok(CasOutcome::Updated)
            }
            _ => Ok(CasOutcome::Conflict),
        }
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>> {
        let jobs = self.jobs.lock().expect("lock poisoned");
        Ok(jobs.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::join_all;

    use super::*;
    use crate::jobs::{JobFailure, Stage};

    fn new_job() -> Job {
        let id = JobId::new();
        let source_ref = format!("uploads/{id}");
        Job::new(id, source_ref, "image/png")
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = MemoryJobStore::new();
        let job = new_job();
        store.create(&job).await.unwrap();

        let stored = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.source_ref, job.source_ref);
    }

    #[tokio::test]
    async fn get_unknown_id_is_none() {
        let store = MemoryJobStore::new();
        assert!(store.get(&JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_refuses_duplicate_ids() {
        let store = MemoryJobStore::new();
        let job = new_job();
        store.create(&job).await.unwrap();
        assert!(store.create(&job).await.is_err());
    }

    #[tokio::test]
    async fn compare_and_swap_requires_matching_status() {
        let store = MemoryJobStore::new();
        let job = new_job();
        store.create(&job).await.unwrap();

        // Claiming from the wrong expected status is a conflict.
        let outcome = store
            .compare_and_swap(JobStatus::Processing, &job.processing())
            .await
            .unwrap();
        assert_eq!(outcome, CasOutcome::Conflict);

        // Claiming from the right one succeeds exactly once.
        let outcome = store
            .compare_and_swap(JobStatus::Pending, &job.processing())
            .await
            .unwrap();
        assert_eq!(outcome, CasOutcome::Updated);
        let outcome = store
            .compare_and_swap(JobStatus::Pending, &job.processing())
            .await
            .unwrap();
        assert_eq!(outcome, CasOutcome::Conflict);
    }

    #[tokio::test]
    async fn compare_and_swap_on_missing_record_is_a_conflict() {
        let store = MemoryJobStore::new();
        let job = new_job();
        let outcome = store
            .compare_and_swap(JobStatus::Pending, &job.processing())
            .await
            .unwrap();
        assert_eq!(outcome, CasOutcome::Conflict);
    }

    #[tokio::test]
    async fn terminal_records_are_write_once() {
        let store = MemoryJobStore::new();
        let job = new_job();
        store.create(&job).await.unwrap();
        let claimed = job.processing();
        store
            .compare_and_swap(JobStatus::Pending, &claimed)
            .await
            .unwrap();
        let failed = claimed.failed(JobFailure::new(Stage::Extraction, "no text found"));
        store
            .compare_and_swap(JobStatus::Processing, &failed)
            .await
            .unwrap();

        // Replacing a failed record requires expecting its terminal status,
        // which the store refuses outright.
        assert!(
            store
                .compare_and_swap(JobStatus::Failed, &claimed)
                .await
                .is_err()
        );
        let stored = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn concurrent_claims_admit_exactly_one_winner() {
        let store = Arc::new(MemoryJobStore::new());
        let job = new_job();
        store.create(&job).await.unwrap();

        let claims = (0..16).map(|_| {
            let store = store.clone();
            let claimed = job.processing();
            tokio::spawn(async move {
                store
                    .compare_and_swap(JobStatus::Pending, &claimed)
                    .await
                    .unwrap()
            })
        });
        let outcomes = join_all(claims).await;
        let wins = outcomes
            .into_iter()
            .map(|outcome| outcome.unwrap())
            .filter(|outcome| *outcome == CasOutcome::Updated)
            .count();
        assert_eq!(wins, 1);
    }
}
