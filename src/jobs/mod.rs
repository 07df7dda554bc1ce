//! The job data model.
//!
//! A [`Job`] tracks one document-processing request from intake to its
//! terminal outcome. Status moves strictly forward
//! (`pending → processing → {complete|failed}`), and a record that reaches a
//! terminal state is never modified again. The transitions themselves are
//! enforced by the conditional writes in [`store`]; this module only knows
//! how to build the next version of a record.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::prelude::*;

pub mod store;

/// Unique identifier for a job. Generated at intake, never reused.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The id as a plain string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Where a job is in its lifecycle.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created at intake; waiting for bytes and a trigger.
    Pending,
    /// Claimed by exactly one processing run.
    Processing,
    /// Extraction and summarization both succeeded.
    Complete,
    /// Some stage failed; see the job's [`JobFailure`].
    Failed,
}

impl JobStatus {
    /// Terminal job records are write-once.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Complete => write!(f, "complete"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The processing step that produced a failure.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Loading bytes from blob storage, or the job store itself.
    Storage,
    /// The OCR backend.
    Extraction,
    /// The text-generation backend.
    Summarization,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Storage => write!(f, "storage"),
            Stage::Extraction => write!(f, "extraction"),
            Stage::Summarization => write!(f, "summarization"),
        }
    }
}

/// A recorded failure: which integration failed, and why.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct JobFailure {
    /// The stage that failed.
    pub stage: Stage,
    /// Human-readable diagnostic, straight from the underlying error.
    pub message: String,
}

impl JobFailure {
    /// Create a new failure record.
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Everything a successful processing run produces for a job.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobResults {
    /// Extracted lines, in the order the OCR backend returned them.
    pub extracted_text: Vec<String>,
    /// Best-effort structured fields parsed from the text.
    pub extracted_fields: Option<BTreeMap<String, String>>,
    /// At most three non-empty summary lines.
    pub summary: Vec<String>,
}

/// One document-processing request.
///
/// Result fields are populated together with the status change that makes
/// them valid: `extracted_text`/`summary` only on `complete`, `error` only
/// on `failed`, neither before that.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Job {
    /// Opaque unique identifier.
    pub id: JobId,

    /// Current lifecycle state.
    pub status: JobStatus,

    /// When intake created the record.
    pub created_at: DateTime<Utc>,

    /// Advances on every status transition.
    pub updated_at: DateTime<Utc>,

    /// Blob key where the uploaded bytes live. Not the bytes themselves.
    pub source_ref: String,

    /// MIME type declared at intake.
    pub content_type: String,

    /// Ordered text lines, present once OCR has succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<Vec<String>>,

    /// Best-effort structured data; absence is not an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_fields: Option<BTreeMap<String, String>>,

    /// At most three non-empty lines, present only on `complete`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Vec<String>>,

    /// Present only on `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
}

impl Job {
    /// Create a new job in `pending`, ready to receive uploaded bytes.
    pub fn new(
        id: JobId,
        source_ref: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            source_ref: source_ref.into(),
            content_type: content_type.into(),
            extracted_text: None,
            extracted_fields: None,
            summary: None,
            error: None,
        }
    }

    /// The `processing` version of this record, used for the orchestrator's
    /// claim.
    pub fn processing(&self) -> Job {
        Job {
            status: JobStatus::Processing,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// The terminal `complete` version of this record.
    pub fn completed(&self, results: JobResults) -> Job {
        Job {
            status: JobStatus::Complete,
            updated_at: Utc::now(),
            extracted_text: Some(results.extracted_text),
            extracted_fields: results.extracted_fields,
            summary: Some(results.summary),
            error: None,
            ..self.clone()
        }
    }

    /// The terminal `failed` version of this record.
    pub fn failed(&self, failure: JobFailure) -> Job {
        Job {
            status: JobStatus::Failed,
            updated_at: Utc::now(),
            extracted_text: None,
            extracted_fields: None,
            summary: None,
            error: Some(failure),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job() -> Job {
        let id = JobId::new();
        let source_ref = format!("uploads/{id}");
        Job::new(id, source_ref, "application/pdf")
    }

    #[test]
    fn fresh_jobs_are_pending_and_empty() {
        let job = new_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.extracted_text.is_none());
        assert!(job.summary.is_none());
        assert!(job.error.is_none());
        assert_eq!(job.created_at, job.updated_at);
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn completed_jobs_carry_results_and_no_error() {
        let job = new_job().processing().completed(JobResults {
            extracted_text: vec!["Form 1040".to_owned()],
            extracted_fields: None,
            summary: vec!["A tax form.".to_owned()],
        });
        assert_eq!(job.status, JobStatus::Complete);
        assert!(job.status.is_terminal());
        assert!(job.extracted_text.is_some());
        assert!(job.summary.is_some());
        assert!(job.error.is_none());
        assert!(job.updated_at >= job.created_at);
    }

    #[test]
    fn failed_jobs_carry_an_error_and_no_results() {
        let failure = JobFailure::new(Stage::Extraction, "no text found");
        let job = new_job().processing().failed(failure.clone());
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.status.is_terminal());
        assert!(job.extracted_text.is_none());
        assert!(job.summary.is_none());
        assert_eq!(job.error, Some(failure));
    }

    #[test]
    fn statuses_and_stages_serialize_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(
            serde_json::to_string(&Stage::Summarization).unwrap(),
            "\"summarization\""
        );
    }
}
