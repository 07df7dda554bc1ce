//! The document processing pipeline.
//!
//! [`Pipeline`] owns the capability interfaces and drives the job state
//! machine: claim `pending → processing` with a compare-and-swap, load the
//! bytes, extract, summarize, and land the terminal outcome (or the recorded
//! failure) with a second conditional write. Duplicate triggers are harmless
//! because only one claim can win, and a fault at any stage becomes part of
//! the job record instead of escaping to the trigger.
//!
//! The same extraction/summarization core is exposed inline as
//! [`Pipeline::process_document`] for the synchronous entry point, where no
//! job record is involved and the caller handles the error directly.

use std::{collections::BTreeMap, error, fmt, sync::Arc, time::Duration};

use tokio::time::{self, Instant};

use crate::{
    blob::BlobStore,
    extract::TextExtractor,
    fields,
    jobs::{
        Job, JobFailure, JobId, JobResults, JobStatus, Stage,
        store::{CasOutcome, JobStore},
    },
    prelude::*,
    summarize::Summarizer,
};

/// Content types accepted at intake.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/png"];

/// Message recorded when OCR succeeds but the document has no text.
pub const NO_TEXT_FOUND: &str = "no text found";

/// Tunable limits for the pipeline.
#[derive(Clone, Debug)]
pub struct PipelineOpts {
    /// The largest document we accept, in bytes.
    pub max_document_bytes: usize,

    /// Upper bound on the number of summary lines.
    pub summary_max_lines: usize,

    /// Total deadline for extraction plus summarization of one document.
    pub processing_timeout: Duration,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self {
            max_document_bytes: 10 * 1024 * 1024,
            summary_max_lines: 3,
            processing_timeout: Duration::from_secs(60),
        }
    }
}

/// An error from a single processing attempt.
#[derive(Debug)]
pub enum PipelineError {
    /// The caller's input was rejected before any work happened. No job
    /// record is ever created for these.
    InvalidInput(String),

    /// OCR succeeded but the document contained no text. A business
    /// outcome, not a backend fault, and not worth retrying.
    NoTextFound,

    /// A backend integration failed at the tagged stage.
    Fault {
        stage: Stage,
        source: anyhow::Error,
    },
}

impl PipelineError {
    /// Wrap an underlying error as a fault at `stage`.
    fn fault(stage: Stage, source: anyhow::Error) -> Self {
        Self::Fault { stage, source }
    }

    /// The failure to record on a job for this error.
    pub fn to_job_failure(&self) -> JobFailure {
        match self {
            // Invalid input is normally rejected at intake, before a job
            // exists. If bad bytes slip through to a run anyway, the run
            // failed to extract anything from them.
            PipelineError::InvalidInput(message) => {
                JobFailure::new(Stage::Extraction, message.clone())
            }
            PipelineError::NoTextFound => JobFailure::new(Stage::Extraction, NO_TEXT_FOUND),
            PipelineError::Fault { stage, source } => {
                JobFailure::new(*stage, format!("{source:#}"))
            }
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InvalidInput(message) => write!(f, "invalid input: {message}"),
            PipelineError::NoTextFound => write!(f, "OCR found no text"),
            PipelineError::Fault { stage, source } => {
                write!(f, "{stage} failed: {source:#}")
            }
        }
    }
}

impl error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            PipelineError::Fault { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Everything a successful processing run produced.
#[derive(Clone, Debug)]
pub struct DocumentOutcome {
    /// Extracted lines, in the order the OCR backend returned them.
    pub lines: Vec<String>,

    /// Best-effort structured fields.
    pub fields: Option<BTreeMap<String, String>>,

    /// At most [`PipelineOpts::summary_max_lines`] non-empty lines.
    pub summary: Vec<String>,
}

impl DocumentOutcome {
    /// The extracted lines joined with newlines.
    pub fn full_text(&self) -> String {
        self.lines.join("\n")
    }
}

/// The orchestrator: capability interfaces plus the job state machine.
pub struct Pipeline {
    store: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<dyn TextExtractor>,
    summarizer: Arc<dyn Summarizer>,
    opts: PipelineOpts,
}

impl Pipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        store: Arc<dyn JobStore>,
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<dyn TextExtractor>,
        summarizer: Arc<dyn Summarizer>,
        opts: PipelineOpts,
    ) -> Self {
        Self {
            store,
            blobs,
            extractor,
            summarizer,
            opts,
        }
    }

    /// The limits this pipeline was built with.
    pub fn opts(&self) -> &PipelineOpts {
        &self.opts
    }

    /// The job store, shared with intake and the result query.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// The blob store, shared with the upload handler.
    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Validate an intake declaration. Nothing is created on failure.
    pub fn check_intake(
        &self,
        declared_size: usize,
        content_type: &str,
    ) -> Result<(), PipelineError> {
        if declared_size == 0 {
            return Err(PipelineError::InvalidInput(
                "no file data provided".to_owned(),
            ));
        }
        if declared_size > self.opts.max_document_bytes {
            return Err(PipelineError::InvalidInput(format!(
                "document is {declared_size} bytes, but the limit is {} bytes",
                self.opts.max_document_bytes
            )));
        }
        if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
            return Err(PipelineError::InvalidInput(format!(
                "unsupported content type {content_type:?}; expected one of {ALLOWED_CONTENT_TYPES:?}"
            )));
        }
        Ok(())
    }

    /// Check actual document bytes: size, and that they sniff as a format we
    /// can process. Declared content types are cheap to lie about.
    pub fn check_document_bytes(&self, bytes: &[u8]) -> Result<(), PipelineError> {
        self.check_intake(
            bytes.len(),
            infer::get(bytes)
                .map(|kind| kind.mime_type())
                .unwrap_or("application/octet-stream"),
        )
    }

    /// Run extraction and summarization on raw bytes.
    ///
    /// This is the inline variant used by the synchronous entry point and,
    /// via [`Pipeline::run_job`], by every job run.
    #[instrument(level = "debug", skip_all, fields(bytes = bytes.len()))]
    pub async fn process_document(
        &self,
        bytes: &[u8],
    ) -> Result<DocumentOutcome, PipelineError> {
        let deadline = Instant::now() + self.opts.processing_timeout;

        let lines = run_stage(
            Stage::Extraction,
            deadline,
            self.extractor.extract(bytes),
        )
        .await?;
        let lines: Vec<String> = lines
            .into_iter()
            .filter(|line| !line.trim().is_empty())
            .collect();
        if lines.is_empty() {
            return Err(PipelineError::NoTextFound);
        }
        debug!(line_count = lines.len(), "extraction succeeded");

        let full_text = lines.join("\n");
        let fields = fields::extract_fields(&lines);

        let summary = run_stage(
            Stage::Summarization,
            deadline,
            self.summarizer
                .summarize(&full_text, self.opts.summary_max_lines),
        )
        .await?;

        Ok(DocumentOutcome {
            lines,
            fields,
            summary,
        })
    }

    /// Process one stored job end to end.
    ///
    /// Safe to call any number of times for the same job: the
    /// compare-and-swap claim admits at most one concurrent attempt, and
    /// later triggers find a non-`pending` record and return without side
    /// effects. The returned error is reserved for the job store itself
    /// being unreachable; processing faults land in the job record.
    #[instrument(level = "info", skip(self), fields(job_id = %job_id))]
    pub async fn run_job(&self, job_id: &JobId) -> Result<()> {
        let Some(job) = self.store.get(job_id).await? else {
            warn!("trigger for unknown job");
            return Ok(());
        };
        if job.status != JobStatus::Pending {
            debug!(status = %job.status, "job already claimed; nothing to do");
            return Ok(());
        }

        let claimed = job.processing();
        let outcome = self
            .store
            .compare_and_swap(JobStatus::Pending, &claimed)
            .await?;
        if outcome == CasOutcome::Conflict {
            debug!("lost the claim to another worker");
            return Ok(());
        }

        let terminal = match self.run_claimed(&claimed).await {
            Ok(outcome) => {
                info!(
                    lines = outcome.lines.len(),
                    summary_lines = outcome.summary.len(),
                    "processing complete"
                );
                claimed.completed(JobResults {
                    extracted_text: outcome.lines,
                    extracted_fields: outcome.fields,
                    summary: outcome.summary,
                })
            }
            Err(err) => {
                info!(failure = %err, "processing failed");
                claimed.failed(err.to_job_failure())
            }
        };

        let outcome = self
            .store
            .compare_and_swap(JobStatus::Processing, &terminal)
            .await?;
        if outcome == CasOutcome::Conflict {
            // Another worker already advanced this job; our result is stale.
            debug!("terminal write lost; abandoning");
        }
        Ok(())
    }

    /// Load the claimed job's bytes and process them.
    async fn run_claimed(&self, job: &Job) -> Result<DocumentOutcome, PipelineError> {
        let bytes = self
            .blobs
            .get(&job.source_ref)
            .await
            .map_err(|e| PipelineError::fault(Stage::Storage, e))?
            .ok_or_else(|| {
                PipelineError::fault(
                    Stage::Storage,
                    anyhow!("no bytes found at {:?}", job.source_ref),
                )
            })?;
        self.process_document(&bytes).await
    }
}

/// Run one stage's future against the shared deadline, classifying both
/// faults and timeouts against `stage`, so a job can never sit in
/// `processing` forever.
async fn run_stage<T>(
    stage: Stage,
    deadline: Instant,
    future: impl Future<Output = Result<T>>,
) -> Result<T, PipelineError> {
    match time::timeout_at(deadline, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(PipelineError::fault(stage, err)),
        Err(_) => Err(PipelineError::fault(
            stage,
            anyhow!("timed out during {stage}"),
        )),
    }
}
